//! Response shapes
//!
//! Stored records reference users by id. Before a record leaves the service it
//! is rendered into a view with those ids resolved, using one batched user
//! lookup per response.

use bson::{oid::ObjectId, DateTime};
use chrono::SecondsFormat;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::auth::Role;
use crate::db::schemas::{
    AccessGrant, AuditAction, AuditLogDoc, Capability, DocumentDoc, HistoryAction, HistoryEvent,
    Status, TargetModel, UserDoc,
};
use crate::store::UserStore;
use crate::types::Result;

pub fn rfc3339(dt: DateTime) -> String {
    dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A resolved user reference. Only `id` is present for users that no longer exist.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Users loaded for one response
#[derive(Debug, Default)]
pub struct UserIndex {
    users: HashMap<ObjectId, UserDoc>,
}

impl UserIndex {
    /// Resolve every user referenced by `docs` in one lookup
    pub async fn load(store: &dyn UserStore, docs: &[DocumentDoc]) -> Result<Self> {
        Self::load_ids(store, docs.iter().flat_map(|d| d.referenced_users())).await
    }

    pub async fn load_ids(store: &dyn UserStore, ids: impl IntoIterator<Item = ObjectId>) -> Result<Self> {
        let mut ids: Vec<ObjectId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        let users = store.get_many(&ids).await?;
        Ok(Self::from_users(users))
    }

    pub fn from_users(users: impl IntoIterator<Item = UserDoc>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&UserDoc> {
        self.users.get(id)
    }

    pub fn user_ref(&self, id: &ObjectId) -> UserRef {
        match self.users.get(id) {
            Some(u) => UserRef {
                id: id.to_hex(),
                username: Some(u.username.clone()),
                full_name: u.full_name.clone(),
                role: Some(u.role),
            },
            None => UserRef {
                id: id.to_hex(),
                username: None,
                full_name: None,
                role: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrantView {
    pub user: UserRef,
    pub role: Capability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEventView {
    pub event_id: String,
    pub action: HistoryAction,
    pub performed_by: UserRef,
    pub performed_by_name: String,
    pub timestamp: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshotView {
    pub content: String,
    pub edited_by: String,
    pub edited_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_ref: String,
    pub doc_ref_short: String,
    pub owner: UserRef,
    pub assigned_to: Option<UserRef>,
    pub assigned_to_name: Option<String>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub status: Status,
    pub access_control: Vec<AccessGrantView>,
    pub history: Vec<HistoryEventView>,
    pub version_history: Vec<VersionSnapshotView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<UserRef>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn event_view(event: &HistoryEvent, users: &UserIndex) -> HistoryEventView {
    HistoryEventView {
        event_id: event.event_id.clone(),
        action: event.action,
        performed_by: users.user_ref(&event.performed_by),
        performed_by_name: event.performed_by_name.clone(),
        timestamp: rfc3339(event.timestamp),
        details: event.details.clone(),
    }
}

fn grant_view(grant: &AccessGrant, users: &UserIndex) -> AccessGrantView {
    AccessGrantView {
        user: users.user_ref(&grant.user),
        role: grant.capability,
    }
}

impl DocumentView {
    pub fn render(doc: &DocumentDoc, users: &UserIndex) -> Self {
        Self {
            id: doc.id.to_hex(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            doc_ref: doc.doc_ref.clone(),
            doc_ref_short: doc.doc_ref_short.clone(),
            owner: users.user_ref(&doc.owner),
            assigned_to: doc.assigned_to.as_ref().map(|id| users.user_ref(id)),
            assigned_to_name: doc.assigned_to_name.clone(),
            tags: doc.tags.clone(),
            metadata: doc.metadata.clone(),
            status: doc.status,
            access_control: doc
                .access_control
                .iter()
                .map(|g| grant_view(g, users))
                .collect(),
            history: doc.history.iter().map(|e| event_view(e, users)).collect(),
            version_history: doc
                .version_history
                .iter()
                .map(|v| VersionSnapshotView {
                    content: v.content.clone(),
                    edited_by: v.edited_by.to_hex(),
                    edited_at: rfc3339(v.edited_at),
                })
                .collect(),
            closed_message: doc.closed_message.clone(),
            closed_at: doc.closed_at.map(rfc3339),
            closed_by: doc.closed_by.as_ref().map(|id| users.user_ref(id)),
            version: doc.version,
            created_at: rfc3339(doc.created_at),
            updated_at: rfc3339(doc.updated_at),
        }
    }

    /// Render several documents against one user lookup
    pub async fn render_all(store: &dyn UserStore, docs: &[DocumentDoc]) -> Result<Vec<Self>> {
        let users = UserIndex::load(store, docs).await?;
        Ok(docs.iter().map(|d| Self::render(d, &users)).collect())
    }

    pub async fn render_one(store: &dyn UserStore, doc: &DocumentDoc) -> Result<Self> {
        let users = UserIndex::load(store, std::slice::from_ref(doc)).await?;
        Ok(Self::render(doc, &users))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<DocumentView>,
    pub total: u64,
    pub page: u64,
    pub total_pages: u64,
}

/// Directory entry; credential and lockout fields never leave the service
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.to_hex(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            created_at: user.created_at.map(rfc3339),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<UserView>,
    pub total: u64,
    pub page: u64,
    pub total_pages: u64,
}

/// Audit entry with the acting user resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub id: String,
    pub action: AuditAction,
    pub target_model: TargetModel,
    pub target_id: String,
    pub performed_by: UserRef,
    pub details: serde_json::Value,
    pub created_at: String,
}

impl AuditLogView {
    pub fn render(entry: &AuditLogDoc, users: &UserIndex) -> Self {
        Self {
            id: entry.id.to_hex(),
            action: entry.action,
            target_model: entry.target_model,
            target_id: entry.target_id.to_hex(),
            performed_by: users.user_ref(&entry.performed_by),
            details: entry.details.clone(),
            created_at: rfc3339(entry.created_at),
        }
    }

    pub async fn render_all(store: &dyn UserStore, entries: &[AuditLogDoc]) -> Result<Vec<Self>> {
        let users = UserIndex::load_ids(store, entries.iter().map(|e| e.performed_by)).await?;
        Ok(entries.iter().map(|e| Self::render(e, &users)).collect())
    }
}
