//! Database schemas for Doctrack
//!
//! Defines MongoDB document structures for documents, users, audit entries
//! and sequence counters.

mod audit_log;
mod counter;
mod document;
mod user;

pub use audit_log::{AuditAction, AuditLogDoc, TargetModel, AUDIT_LOG_COLLECTION};
pub use counter::{CounterDoc, COUNTER_COLLECTION, DOCUMENT_REF_SERIES};
pub use document::{
    AccessGrant, Capability, DocumentDoc, HistoryAction, HistoryEvent, Status, VersionSnapshot,
    DOCUMENT_COLLECTION,
};
pub use user::{UserDoc, USER_COLLECTION};
