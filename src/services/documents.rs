//! Document service
//!
//! Orchestrates one request: load, authorize, run the state machine, persist
//! with compare-and-swap, notify the audit trail, render.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::audit::AuditTrail;
use crate::auth::Actor;
use crate::db::schemas::{AccessGrant, AuditAction, Capability, DocumentDoc, Status, TargetModel, UserDoc};
use crate::services::views::{DocumentPage, DocumentView, UserIndex};
use crate::store::Stores;
use crate::types::{DoctrackError, Result};
use crate::workflow::access::{can_edit, can_forward, can_view, parse_metadata_filter, parse_tags};
use crate::workflow::history::mint_event_id;
use crate::workflow::machine::{self, NewDocument, Transition, UpdatePatch};
use crate::workflow::sequence::{mint_doc_ref, SequenceIdGenerator};
use crate::workflow::{DocumentFilter, DocumentQuery, PageRequest, Visibility};

/// Attempts at inserting a new document before giving up on reference collisions
const MINT_ATTEMPTS: usize = 3;

/// Filter fields as they arrive in a query string or export body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub text: Option<String>,
    /// Comma separated
    pub tags: Option<String>,
    pub status: Option<String>,
    pub owner: Option<String>,
    pub assigned_to: Option<String>,
    pub doc_ref_short: Option<String>,
    /// `k:v,k:v`
    pub metadata: Option<String>,
}

fn parse_user_id(raw: &str, field: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| DoctrackError::Validation(format!("Invalid {field} id")))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FilterParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let get = |key: &str| query.get(key).cloned();
        Self {
            text: get("text"),
            tags: get("tags"),
            status: get("status"),
            owner: get("owner"),
            assigned_to: get("assignedTo"),
            doc_ref_short: get("docRefShort"),
            metadata: get("metadata"),
        }
    }

    pub fn into_filter(self) -> Result<DocumentFilter> {
        let status = match present(&self.status) {
            Some(raw) => Some(raw.parse::<Status>().map_err(DoctrackError::Validation)?),
            None => None,
        };
        Ok(DocumentFilter {
            text: present(&self.text).map(str::to_string),
            tags: present(&self.tags).map(parse_tags).unwrap_or_default(),
            status,
            owner: present(&self.owner).map(|o| parse_user_id(o, "owner")).transpose()?,
            assigned_to: present(&self.assigned_to)
                .map(|a| parse_user_id(a, "assignedTo"))
                .transpose()?,
            doc_ref_short: present(&self.doc_ref_short).map(str::to_string),
            metadata: present(&self.metadata)
                .map(parse_metadata_filter)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

/// Parse an optional user id; blank means absent
fn parse_optional_user(raw: Option<String>, field: &str) -> Result<Option<ObjectId>> {
    present(&raw).map(|id| parse_user_id(id, field)).transpose()
}

/// ACL entry as sent by clients
#[derive(Debug, Clone, Deserialize)]
pub struct GrantRequest {
    pub user: String,
    #[serde(default, alias = "capability")]
    pub role: Capability,
}

fn parse_grants(grants: Vec<GrantRequest>) -> Result<Vec<AccessGrant>> {
    grants
        .into_iter()
        .map(|g| Ok(AccessGrant::new(parse_user_id(&g.user, "user")?, g.role)))
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, alias = "accessControlList")]
    pub access_control: Vec<GrantRequest>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl CreateDocumentRequest {
    pub fn into_draft(self) -> Result<NewDocument> {
        Ok(NewDocument {
            title: self.title,
            content: self.content,
            tags: self.tags,
            metadata: self.metadata,
            access_control: parse_grants(self.access_control)?,
            assigned_to: parse_optional_user(self.assigned_to, "assignedTo")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(alias = "accessControlList")]
    pub access_control: Option<Vec<GrantRequest>>,
    pub status: Option<Status>,
    pub assigned_to: Option<String>,
    pub closing_message: Option<String>,
    pub version: Option<i64>,
}

impl UpdateDocumentRequest {
    pub fn into_patch(self) -> Result<UpdatePatch> {
        Ok(UpdatePatch {
            title: self.title,
            content: self.content,
            tags: self.tags,
            metadata: self.metadata,
            access_control: self.access_control.map(parse_grants).transpose()?,
            status: self.status,
            assigned_to: parse_optional_user(self.assigned_to, "assignedTo")?,
            closing_message: self.closing_message,
            version: self.version,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    pub to_user_id: String,
    /// Defaults to viewer
    #[serde(default, alias = "role")]
    pub capability: Option<Capability>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub updated_count: u64,
}

#[derive(Clone)]
pub struct DocumentService {
    pub(crate) stores: Stores,
    pub(crate) sequence: SequenceIdGenerator,
    pub(crate) audit: AuditTrail,
    ref_prefix: String,
}

impl DocumentService {
    pub fn new(stores: Stores, audit: AuditTrail, ref_prefix: impl Into<String>) -> Self {
        let ref_prefix = ref_prefix.into();
        Self {
            sequence: SequenceIdGenerator::new(stores.counters.clone(), ref_prefix.clone()),
            stores,
            audit,
            ref_prefix,
        }
    }

    pub(crate) async fn load(&self, id: &ObjectId) -> Result<DocumentDoc> {
        self.stores
            .documents
            .get(id)
            .await?
            .ok_or_else(|| DoctrackError::NotFound("Document not found".into()))
    }

    async fn resolve_assignee(&self, id: Option<ObjectId>) -> Result<Option<UserDoc>> {
        match id {
            Some(id) => Ok(self.stores.users.get(&id).await?),
            None => Ok(None),
        }
    }

    /// Every ACL entry must name an existing user
    async fn check_grants(&self, grants: &[AccessGrant]) -> Result<()> {
        if grants.is_empty() {
            return Ok(());
        }
        let mut ids: Vec<ObjectId> = grants.iter().map(|g| g.user).collect();
        ids.sort();
        ids.dedup();
        let found = self.stores.users.get_many(&ids).await?;
        if found.len() != ids.len() {
            return Err(DoctrackError::Validation(
                "Access control list references an unknown user".into(),
            ));
        }
        Ok(())
    }

    /// Persist a state machine result over the version it was computed from
    pub(crate) async fn persist(&self, before: &DocumentDoc, transition: &Transition) -> Result<()> {
        self.stores
            .documents
            .replace(&transition.document, before.version)
            .await
    }

    pub async fn list(
        &self,
        actor: &Actor,
        filter: DocumentFilter,
        page: PageRequest,
    ) -> Result<DocumentPage> {
        let visibility = Visibility::resolve(actor, self.stores.users.as_ref()).await?;
        let query = DocumentQuery::new(visibility, filter);

        let total = self.stores.documents.count(&query).await?;
        let docs = self.stores.documents.find(&query, Some(page)).await?;
        let documents = DocumentView::render_all(self.stores.users.as_ref(), &docs).await?;

        Ok(DocumentPage {
            documents,
            total,
            page: page.page,
            total_pages: page.total_pages(total),
        })
    }

    pub async fn create(&self, actor: &Actor, draft: NewDocument) -> Result<DocumentView> {
        let assignee = self.resolve_assignee(draft.assigned_to).await?;
        self.check_grants(&draft.access_control).await?;

        let now = DateTime::now();
        let id = ObjectId::new();
        // Validate before minting so rejected requests do not consume sequence numbers
        let mut doc = machine::create(id, actor, &draft, assignee.as_ref(), String::new(), String::new(), now)?
            .document;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let short = self.sequence.mint_short_ref().await;
            doc.doc_ref = mint_doc_ref(&self.ref_prefix);
            doc.doc_ref_short = short.value;

            match self.stores.documents.insert(&doc).await {
                Ok(()) => break,
                Err(DoctrackError::Conflict(reason)) if attempt < MINT_ATTEMPTS => {
                    warn!(reference = %doc.doc_ref_short, %reason, "Reference collision, minting again");
                }
                Err(e) => return Err(e),
            }
        }

        info!(id = %doc.id, reference = %doc.doc_ref_short, owner = %actor.username, "Document created");
        self.audit.record(
            AuditAction::Create,
            TargetModel::Document,
            doc.id,
            actor,
            json!({ "title": doc.title, "docRefShort": doc.doc_ref_short }),
        );

        DocumentView::render_one(self.stores.users.as_ref(), &doc).await
    }

    pub async fn get(&self, actor: &Actor, id: &ObjectId) -> Result<DocumentView> {
        let doc = self.load(id).await?;
        let owner = self.stores.users.get(&doc.owner).await?;
        if !can_view(actor, &doc, owner.map(|o| o.role)) {
            return Err(DoctrackError::AuthorizationDenied(
                "Not authorized to view this document".into(),
            ));
        }
        DocumentView::render_one(self.stores.users.as_ref(), &doc).await
    }

    pub async fn update(&self, actor: &Actor, id: &ObjectId, patch: UpdatePatch) -> Result<DocumentView> {
        let doc = self.load(id).await?;
        // Authorization precedes any user lookup
        if !can_edit(actor, &doc) {
            return Err(DoctrackError::AuthorizationDenied(
                "Not authorized to edit this document".into(),
            ));
        }
        let assignee = self
            .resolve_assignee(patch.assigned_to.filter(|a| doc.assigned_to != Some(*a)))
            .await?;
        if let Some(grants) = &patch.access_control {
            self.check_grants(grants).await?;
        }

        let transition = machine::apply_update(&doc, actor, &patch, assignee.as_ref(), DateTime::now())?;
        if transition.is_noop() {
            return DocumentView::render_one(self.stores.users.as_ref(), &doc).await;
        }
        self.persist(&doc, &transition).await?;

        let actions: Vec<_> = transition.events.iter().map(|e| e.action).collect();
        info!(id = %doc.id, version = transition.document.version, ?actions, "Document updated");
        self.audit.record(
            AuditAction::Update,
            TargetModel::Document,
            doc.id,
            actor,
            json!({ "actions": actions, "version": transition.document.version }),
        );

        DocumentView::render_one(self.stores.users.as_ref(), &transition.document).await
    }

    pub async fn delete(&self, actor: &Actor, id: &ObjectId) -> Result<()> {
        let doc = self.load(id).await?;
        machine::authorize_delete(&doc, actor)?;

        if !self.stores.documents.delete(id).await? {
            return Err(DoctrackError::NotFound("Document not found".into()));
        }

        info!(id = %doc.id, reference = %doc.doc_ref_short, by = %actor.username, "Document deleted");
        self.audit.record(
            AuditAction::Delete,
            TargetModel::Document,
            doc.id,
            actor,
            json!({ "title": doc.title, "docRefShort": doc.doc_ref_short }),
        );
        Ok(())
    }

    pub async fn forward(&self, actor: &Actor, id: &ObjectId, request: ForwardRequest) -> Result<DocumentView> {
        let doc = self.load(id).await?;
        if !can_forward(actor, &doc) {
            return Err(DoctrackError::AuthorizationDenied(
                "Not authorized to forward this document".into(),
            ));
        }
        let to_id = parse_user_id(&request.to_user_id, "user")?;
        let to = self
            .stores
            .users
            .get(&to_id)
            .await?
            .ok_or_else(|| DoctrackError::NotFound("User not found".into()))?;

        let capability = request.capability.unwrap_or_default();
        let transition = machine::forward(&doc, actor, &to, capability, DateTime::now())?;
        self.persist(&doc, &transition).await?;

        info!(id = %doc.id, to = %to.username, "Document forwarded");
        self.audit.record(
            AuditAction::Update,
            TargetModel::Document,
            doc.id,
            actor,
            json!({ "forwardedTo": to.id.to_hex(), "capability": capability }),
        );

        DocumentView::render_one(self.stores.users.as_ref(), &transition.document).await
    }

    /// Fill in references and event fields missing from legacy records.
    /// Existing values are never overwritten.
    pub async fn backfill(&self, actor: &Actor) -> Result<BackfillReport> {
        if !actor.is_document_admin() {
            return Err(DoctrackError::AuthorizationDenied(
                "Only administrators may run the backfill".into(),
            ));
        }

        let docs = self.stores.documents.find_incomplete().await?;
        let users = UserIndex::load(self.stores.users.as_ref(), &docs).await?;
        let mut updated_count = 0;

        for doc in docs {
            let mut next = doc.clone();
            if next.doc_ref.is_empty() {
                next.doc_ref = mint_doc_ref(&self.ref_prefix);
            }
            if next.doc_ref_short.is_empty() {
                next.doc_ref_short = self.sequence.mint_short_ref().await.value;
            }
            for event in next.history.iter_mut() {
                if event.event_id.is_empty() {
                    event.event_id = mint_event_id();
                }
                if event.performed_by_name.is_empty() {
                    if let Some(user) = users.get(&event.performed_by) {
                        event.performed_by_name = user.username.clone();
                    }
                }
            }

            if next == doc {
                continue;
            }
            next.version = doc.version + 1;

            match self.stores.documents.replace(&next, doc.version).await {
                Ok(()) => updated_count += 1,
                Err(e) if e.is_server_error() => return Err(e),
                Err(e) => warn!(id = %doc.id, error = %e, "Backfill skipped document"),
            }
        }

        info!(updated_count, by = %actor.username, "Backfill complete");
        Ok(BackfillReport { updated_count })
    }
}
