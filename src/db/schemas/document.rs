//! Document schema
//!
//! A tracked document with its embedded history ledger. Users are referenced
//! by id only; display names are resolved in a separate batched pass.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::db::mongo::IntoIndexes;

/// Collection name for documents
pub const DOCUMENT_COLLECTION: &str = "documents";

/// Document lifecycle status. Parsed case-insensitively wherever it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String")]
pub enum Status {
    #[default]
    Open,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::Closed => "Closed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            x if x.eq_ignore_ascii_case("open") => Ok(Status::Open),
            x if x.eq_ignore_ascii_case("closed") => Ok(Status::Closed),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

impl TryFrom<String> for Status {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Capability granted by an access-control entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    #[default]
    Viewer,
    Editor,
}

/// One access-control entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    pub user: ObjectId,
    /// Stored as `role` for compatibility with existing records
    #[serde(rename = "role", default)]
    pub capability: Capability,
}

impl AccessGrant {
    pub fn new(user: ObjectId, capability: Capability) -> Self {
        Self { user, capability }
    }
}

/// History ledger event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    Created,
    Edited,
    #[serde(alias = "Status Change")]
    StatusChange,
    Closed,
    Forwarded,
    Assigned,
    #[serde(alias = "Forwarded/Shared")]
    AccessUpdated,
}

/// One entry in a document's append-only history
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// Empty only on legacy records awaiting backfill
    #[serde(default)]
    pub event_id: String,
    pub action: HistoryAction,
    pub performed_by: ObjectId,
    /// Username snapshot at the time of the event
    #[serde(default)]
    pub performed_by_name: String,
    pub timestamp: DateTime,
    #[serde(default)]
    pub details: String,
}

/// Snapshot of content taken before an edit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub content: String,
    pub edited_by: ObjectId,
    pub edited_at: DateTime,
}

/// Document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub title: String,

    pub content: String,

    /// Opaque unique token, immutable once set
    #[serde(default)]
    pub doc_ref: String,

    /// Human-readable reference (DOC-000012), immutable once set
    #[serde(default)]
    pub doc_ref_short: String,

    pub owner: ObjectId,

    /// Current head of the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<ObjectId>,

    /// Username of `assigned_to` at assignment time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub status: Status,

    #[serde(rename = "accessControl", default)]
    pub access_control: Vec<AccessGrant>,

    #[serde(default)]
    pub history: Vec<HistoryEvent>,

    #[serde(default)]
    pub version_history: Vec<VersionSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<ObjectId>,

    /// Write version for compare-and-swap updates
    #[serde(default = "initial_version")]
    pub version: i64,

    pub created_at: DateTime,

    pub updated_at: DateTime,
}

fn initial_version() -> i64 {
    1
}

impl DocumentDoc {
    /// Create an open document owned by `owner`
    pub fn new(id: ObjectId, owner: ObjectId, title: String, content: String, now: DateTime) -> Self {
        Self {
            id,
            title,
            content,
            doc_ref: String::new(),
            doc_ref_short: String::new(),
            owner,
            assigned_to: None,
            assigned_to_name: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            status: Status::Open,
            access_control: Vec::new(),
            history: Vec::new(),
            version_history: Vec::new(),
            closed_message: None,
            closed_at: None,
            closed_by: None,
            version: initial_version(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Access-control entry for `user`, if any
    pub fn grant_for(&self, user: &ObjectId) -> Option<&AccessGrant> {
        self.access_control.iter().find(|g| &g.user == user)
    }

    pub fn is_owner(&self, user: &ObjectId) -> bool {
        &self.owner == user
    }

    pub fn is_assignee(&self, user: &ObjectId) -> bool {
        self.assigned_to.as_ref() == Some(user)
    }

    /// Every user id this document refers to
    pub fn referenced_users(&self) -> Vec<ObjectId> {
        let mut ids = vec![self.owner];
        ids.extend(self.assigned_to);
        ids.extend(self.closed_by);
        ids.extend(self.access_control.iter().map(|g| g.user));
        ids.extend(self.history.iter().map(|e| e.performed_by));
        ids.sort();
        ids.dedup();
        ids
    }

    /// Legacy record missing a reference or an event field
    pub fn needs_backfill(&self) -> bool {
        self.doc_ref.is_empty()
            || self.doc_ref_short.is_empty()
            || self
                .history
                .iter()
                .any(|e| e.event_id.is_empty() || e.performed_by_name.is_empty())
    }
}

impl IntoIndexes for DocumentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "docRef": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("doc_ref_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "docRefShort": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("doc_ref_short_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "owner": 1 },
                Some(IndexOptions::builder().name("owner_index".to_string()).build()),
            ),
            (
                doc! { "assignedTo": 1 },
                Some(
                    IndexOptions::builder()
                        .name("assigned_to_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "accessControl.user": 1 },
                Some(
                    IndexOptions::builder()
                        .name("access_control_user_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "tags": 1 },
                Some(IndexOptions::builder().name("tags_index".to_string()).build()),
            ),
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_case_insensitively() {
        let from_json: Vec<Status> = serde_json::from_str(r#"["closed", "OPEN", "Closed"]"#).unwrap();
        assert_eq!(from_json, vec![Status::Closed, Status::Open, Status::Closed]);
        assert_eq!("closed".parse::<Status>(), Ok(Status::Closed));
        assert!(serde_json::from_str::<Status>(r#""Pending""#).is_err());

        let stored: Document = doc! { "status": "Open" };
        #[derive(Deserialize)]
        struct Row {
            status: Status,
        }
        assert_eq!(bson::from_document::<Row>(stored).unwrap().status, Status::Open);
        assert_eq!(serde_json::to_value(Status::Closed).unwrap(), "Closed");
    }

    #[test]
    fn test_legacy_history_actions_deserialize() {
        let raw = doc! {
            "action": "Status Change",
            "performedBy": ObjectId::new(),
            "timestamp": DateTime::now(),
        };
        let event: HistoryEvent = bson::from_document(raw).unwrap();
        assert_eq!(event.action, HistoryAction::StatusChange);
        assert!(event.event_id.is_empty());

        let raw = doc! {
            "action": "Forwarded/Shared",
            "performedBy": ObjectId::new(),
            "timestamp": DateTime::now(),
        };
        let event: HistoryEvent = bson::from_document(raw).unwrap();
        assert_eq!(event.action, HistoryAction::AccessUpdated);
    }

    #[test]
    fn test_access_grant_wire_format() {
        let user = ObjectId::new();
        let grant = AccessGrant::new(user, Capability::Editor);
        let raw = bson::to_document(&grant).unwrap();
        assert_eq!(raw.get_str("role").unwrap(), "editor");
        assert_eq!(raw.get_object_id("user").unwrap(), user);
    }

    #[test]
    fn test_referenced_users_deduplicated() {
        let owner = ObjectId::new();
        let other = ObjectId::new();
        let mut d = DocumentDoc::new(ObjectId::new(), owner, "t".into(), "c".into(), DateTime::now());
        d.assigned_to = Some(other);
        d.access_control.push(AccessGrant::new(other, Capability::Viewer));
        d.access_control.push(AccessGrant::new(owner, Capability::Editor));
        let ids = d.referenced_users();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("closed".parse::<Status>().unwrap(), Status::Closed);
        assert_eq!(" Open ".parse::<Status>().unwrap(), Status::Open);
        assert!("Pending Approval".parse::<Status>().is_err());
    }
}
