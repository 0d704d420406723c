//! Audit log schema
//!
//! System-wide record of administrative create/update/delete actions.
//! Independent of any document's history ledger.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::IntoIndexes;

/// Collection name for audit entries
pub const AUDIT_LOG_COLLECTION: &str = "auditlogs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Create => write!(f, "create"),
            AuditAction::Update => write!(f, "update"),
            AuditAction::Delete => write!(f, "delete"),
        }
    }
}

/// Kind of entity an audit entry targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetModel {
    Document,
    User,
}

/// Audit entry stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub action: AuditAction,
    pub target_model: TargetModel,
    pub target_id: ObjectId,
    pub performed_by: ObjectId,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime,
}

impl AuditLogDoc {
    pub fn new(
        action: AuditAction,
        target_model: TargetModel,
        target_id: ObjectId,
        performed_by: ObjectId,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            action,
            target_model,
            target_id,
            performed_by,
            details,
            created_at: DateTime::now(),
        }
    }
}

impl IntoIndexes for AuditLogDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "createdAt": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_desc".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "targetId": 1 },
                Some(IndexOptions::builder().name("target_id_index".to_string()).build()),
            ),
        ]
    }
}
