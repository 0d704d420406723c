//! Document access-control and workflow engine
//!
//! - `access`: visibility predicate, filters, pagination and mutation rights
//! - `machine`: pure state transitions producing history events
//! - `history`: event construction and the append-only ledger
//! - `sequence`: short reference minting

pub mod access;
pub mod history;
pub mod machine;
pub mod sequence;

pub use access::{DocumentFilter, DocumentQuery, PageRequest, TextMatcher, Visibility};
pub use machine::{NewDocument, Transition, UpdatePatch};
pub use sequence::{SequenceIdGenerator, ShortRef};
