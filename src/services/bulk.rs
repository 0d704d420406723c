//! Bulk operations
//!
//! One action applied to many documents. Each id is loaded, authorized and
//! written on its own; a failure becomes that item's result and the loop
//! carries on. There is no cross-item transaction.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::{info, warn};

use crate::auth::Actor;
use crate::db::schemas::{AuditAction, TargetModel, UserDoc};
use crate::services::documents::DocumentService;
use crate::types::{DoctrackError, Result};
use crate::workflow::access::can_act_in_bulk;
use crate::workflow::machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    Close,
    Assign,
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(BulkAction::Delete),
            "close" => Ok(BulkAction::Close),
            "assign" => Ok(BulkAction::Assign),
            other => Err(format!("Unknown action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPayload {
    pub closing_message: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkRequest {
    pub action: String,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub payload: BulkPayload,
}

/// Outcome for one id
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkItemResult {
    pub id: String,
    pub success: bool,
    pub msg: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub results: Vec<BulkItemResult>,
}

/// Assignee resolved once for the whole batch
enum Assignee {
    Missing,
    Unknown,
    Found(UserDoc),
}

impl DocumentService {
    pub async fn bulk(&self, actor: &Actor, request: BulkRequest) -> Result<BulkResponse> {
        if request.ids.is_empty() {
            return Err(DoctrackError::Validation("No document ids provided".into()));
        }

        let action = request.action.parse::<BulkAction>().ok();
        let assignee = match (action, request.payload.assigned_to.as_deref().map(str::trim)) {
            (Some(BulkAction::Assign), Some(raw)) if !raw.is_empty() => {
                match ObjectId::parse_str(raw) {
                    Ok(id) => match self.stores.users.get(&id).await? {
                        Some(user) => Assignee::Found(user),
                        None => Assignee::Unknown,
                    },
                    Err(_) => Assignee::Unknown,
                }
            }
            _ => Assignee::Missing,
        };

        let mut results = Vec::with_capacity(request.ids.len());
        for raw_id in &request.ids {
            let outcome = match action {
                Some(action) => {
                    self.bulk_one(actor, action, raw_id, &request.payload, &assignee)
                        .await
                }
                None => Err(DoctrackError::Validation("Unknown action".into())),
            };

            results.push(match outcome {
                Ok(msg) => BulkItemResult {
                    id: raw_id.clone(),
                    success: true,
                    msg: msg.to_string(),
                },
                Err(e) => BulkItemResult {
                    id: raw_id.clone(),
                    success: false,
                    msg: item_message(raw_id, e),
                },
            });
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            action = %request.action,
            total = results.len(),
            succeeded,
            by = %actor.username,
            "Bulk operation finished"
        );
        Ok(BulkResponse { results })
    }

    async fn bulk_one(
        &self,
        actor: &Actor,
        action: BulkAction,
        raw_id: &str,
        payload: &BulkPayload,
        assignee: &Assignee,
    ) -> Result<&'static str> {
        let id = ObjectId::parse_str(raw_id.trim())
            .map_err(|_| DoctrackError::NotFound("Not found".into()))?;
        let doc = self.load(&id).await?;

        if !can_act_in_bulk(actor, &doc) {
            return Err(DoctrackError::AuthorizationDenied("Not authorized".into()));
        }

        let now = DateTime::now();
        match action {
            BulkAction::Delete => {
                // Deletion stays owner/admin even when the item passed the bulk check
                machine::authorize_delete(&doc, actor)?;
                if !self.stores.documents.delete(&id).await? {
                    return Err(DoctrackError::NotFound("Not found".into()));
                }
                self.audit.record(
                    AuditAction::Delete,
                    TargetModel::Document,
                    id,
                    actor,
                    json!({ "title": doc.title, "docRefShort": doc.doc_ref_short, "bulk": true }),
                );
                Ok("Deleted")
            }
            BulkAction::Close => {
                let transition =
                    machine::close(&doc, actor, payload.closing_message.as_deref(), now)?;
                self.persist(&doc, &transition).await?;
                self.audit.record(
                    AuditAction::Update,
                    TargetModel::Document,
                    id,
                    actor,
                    json!({ "actions": ["StatusChange", "Closed"], "bulk": true }),
                );
                Ok("Closed")
            }
            BulkAction::Assign => {
                let to = match assignee {
                    Assignee::Found(user) => user,
                    Assignee::Missing => {
                        return Err(DoctrackError::Validation("No assignedTo specified".into()))
                    }
                    Assignee::Unknown => {
                        return Err(DoctrackError::Validation("Assignee not found".into()))
                    }
                };
                let transition = machine::assign(&doc, actor, to, now);
                self.persist(&doc, &transition).await?;
                self.audit.record(
                    AuditAction::Update,
                    TargetModel::Document,
                    id,
                    actor,
                    json!({ "assignedTo": to.id.to_hex(), "bulk": true }),
                );
                Ok("Assigned")
            }
        }
    }
}

/// Per-item message for a failed item. Storage faults are logged, not echoed.
fn item_message(raw_id: &str, err: DoctrackError) -> String {
    match err {
        DoctrackError::NotFound(_) => "Not found".into(),
        DoctrackError::AuthorizationDenied(_) => "Not authorized".into(),
        DoctrackError::Conflict(_) => "Conflict".into(),
        DoctrackError::Validation(msg) | DoctrackError::BadRequest(msg) => msg,
        other => {
            warn!(id = raw_id, error = %other, "Bulk item failed");
            "Server error".into()
        }
    }
}
