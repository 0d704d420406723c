//! Database layer for Doctrack
//!
//! MongoDB storage for documents, users, audit entries and counters.

pub mod mongo;
pub mod schemas;
pub mod stores;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use schemas::{AuditLogDoc, DocumentDoc, UserDoc};
pub use stores::mongo_stores;
