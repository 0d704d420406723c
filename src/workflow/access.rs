//! Access control resolution
//!
//! Decides which documents an actor may see and which mutations they may
//! perform. Every rule is expressed twice: as an in-process predicate over a
//! loaded `DocumentDoc`, and as a MongoDB filter with the same meaning. The
//! in-memory store and single-document checks use the former, the Mongo store
//! the latter.

use bson::{doc, oid::ObjectId, Bson, Document, Regex as BsonRegex};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

use crate::auth::{peer_roles, Actor, Role};
use crate::db::schemas::{Capability, DocumentDoc, Status};
use crate::store::UserStore;
use crate::types::{DoctrackError, Result};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

// =============================================================================
// Text matching
// =============================================================================

/// Case-insensitive substring matcher over user-supplied text.
///
/// The input is escaped before compilation so it is always matched literally.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    raw: String,
    compiled: Regex,
}

impl TextMatcher {
    /// Substring matcher. Returns None for blank input.
    pub fn contains(text: &str) -> Option<Self> {
        Self::build(text, false)
    }

    /// Whole-value matcher (still case-insensitive)
    pub fn exact(text: &str) -> Option<Self> {
        Self::build(text, true)
    }

    fn build(text: &str, anchored: bool) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let escaped = regex::escape(text);
        let pattern = if anchored {
            format!("^{escaped}$")
        } else {
            escaped
        };
        let compiled = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        Some(Self {
            raw: pattern,
            compiled,
        })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.compiled.is_match(haystack)
    }

    /// The same matcher as a BSON regular expression
    pub fn to_bson(&self) -> Bson {
        Bson::RegularExpression(BsonRegex {
            pattern: self.raw.clone(),
            options: "i".to_string(),
        })
    }
}

// =============================================================================
// Visibility
// =============================================================================

/// Which documents an actor may see
#[derive(Debug, Clone, PartialEq)]
pub enum Visibility {
    /// No restriction
    All,
    /// Owner, ACL member or assignee; peer-group actors additionally see
    /// everything owned by a peer-group user
    Scoped {
        actor: ObjectId,
        peer_owners: Option<HashSet<ObjectId>>,
    },
}

impl Visibility {
    /// Build the visibility predicate for an actor.
    ///
    /// Peer-group actors need the current set of peer-group users; it is
    /// fetched once here rather than joined per document.
    pub async fn resolve(actor: &Actor, users: &dyn UserStore) -> Result<Self> {
        if actor.is_document_admin() {
            return Ok(Visibility::All);
        }

        let peer_owners = if actor.is_peer() {
            let ids = users.ids_with_roles(&peer_roles()).await?;
            Some(ids.into_iter().collect())
        } else {
            None
        };

        Ok(Visibility::Scoped {
            actor: actor.id,
            peer_owners,
        })
    }

    pub fn matches(&self, doc: &DocumentDoc) -> bool {
        match self {
            Visibility::All => true,
            Visibility::Scoped { actor, peer_owners } => {
                doc.is_owner(actor)
                    || doc.grant_for(actor).is_some()
                    || doc.is_assignee(actor)
                    || peer_owners
                        .as_ref()
                        .is_some_and(|owners| owners.contains(&doc.owner))
            }
        }
    }

    /// Mongo filter, or None when unrestricted
    pub fn to_bson(&self) -> Option<Document> {
        match self {
            Visibility::All => None,
            Visibility::Scoped { actor, peer_owners } => {
                let mut any_of = vec![
                    doc! { "owner": actor },
                    doc! { "accessControl.user": actor },
                    doc! { "assignedTo": actor },
                ];
                if let Some(owners) = peer_owners {
                    let owners: Vec<Bson> = owners.iter().map(|o| Bson::ObjectId(*o)).collect();
                    any_of.push(doc! { "owner": { "$in": owners } });
                }
                Some(doc! { "$or": any_of })
            }
        }
    }
}

// =============================================================================
// Single-document authorization
// =============================================================================

/// Whether the actor may read `doc`. `owner_role` is the owner's current role,
/// if the owner still exists.
pub fn can_view(actor: &Actor, doc: &DocumentDoc, owner_role: Option<Role>) -> bool {
    actor.is_document_admin()
        || doc.is_owner(&actor.id)
        || doc.grant_for(&actor.id).is_some()
        || doc.is_assignee(&actor.id)
        || (actor.is_peer() && owner_role.is_some_and(crate::auth::is_peer_group))
}

fn is_editor(actor: &Actor, doc: &DocumentDoc) -> bool {
    doc.grant_for(&actor.id)
        .is_some_and(|g| g.capability == Capability::Editor)
}

/// Owner, admin or ACL editor
pub fn can_edit(actor: &Actor, doc: &DocumentDoc) -> bool {
    doc.is_owner(&actor.id) || actor.is_document_admin() || is_editor(actor, doc)
}

/// Owner, admin or current assignee
pub fn can_forward(actor: &Actor, doc: &DocumentDoc) -> bool {
    doc.is_owner(&actor.id) || actor.is_document_admin() || doc.is_assignee(&actor.id)
}

/// Owner or admin
pub fn can_delete(actor: &Actor, doc: &DocumentDoc) -> bool {
    doc.is_owner(&actor.id) || actor.is_document_admin()
}

/// Owner, admin, ACL editor or current assignee
pub fn can_act_in_bulk(actor: &Actor, doc: &DocumentDoc) -> bool {
    can_edit(actor, doc) || doc.is_assignee(&actor.id)
}

// =============================================================================
// Filters
// =============================================================================

/// Independent filters combined with AND
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Substring over title or content
    pub text: Option<String>,
    /// Document carries any of these tags
    pub tags: Vec<String>,
    pub status: Option<Status>,
    pub owner: Option<ObjectId>,
    pub assigned_to: Option<ObjectId>,
    /// Substring over docRefShort
    pub doc_ref_short: Option<String>,
    /// key → substring of the metadata value
    pub metadata: Vec<(String, String)>,
}

/// Parse `k:v,k:v` metadata filter syntax. A key that could address other
/// fields in a Mongo path is rejected rather than skipped.
pub fn parse_metadata_filter(raw: &str) -> Result<Vec<(String, String)>> {
    let mut clauses = Vec::new();
    for (k, v) in raw.split(',').filter_map(|item| item.split_once(':')) {
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() || v.is_empty() {
            continue;
        }
        if k.contains('.') || k.starts_with('$') {
            return Err(DoctrackError::Validation(format!(
                "Invalid metadata filter key: {k}"
            )));
        }
        clauses.push((k.to_string(), v.to_string()));
    }
    Ok(clauses)
}

/// Split a comma-separated tag list
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

impl DocumentFilter {
    pub fn matches(&self, doc: &DocumentDoc) -> bool {
        if let Some(m) = self.text.as_deref().and_then(TextMatcher::contains) {
            if !m.is_match(&doc.title) && !m.is_match(&doc.content) {
                return false;
            }
        }

        let tag_matchers: Vec<TextMatcher> =
            self.tags.iter().filter_map(|t| TextMatcher::exact(t)).collect();
        if !tag_matchers.is_empty()
            && !doc
                .tags
                .iter()
                .any(|tag| tag_matchers.iter().any(|m| m.is_match(tag)))
        {
            return false;
        }

        if self.status.is_some_and(|s| s != doc.status) {
            return false;
        }
        if self.owner.is_some_and(|o| o != doc.owner) {
            return false;
        }
        if self.assigned_to.is_some() && self.assigned_to != doc.assigned_to {
            return false;
        }

        if let Some(m) = self.doc_ref_short.as_deref().and_then(TextMatcher::contains) {
            if !m.is_match(&doc.doc_ref_short) {
                return false;
            }
        }

        self.metadata.iter().all(|(key, value)| {
            match (doc.metadata.get(key), TextMatcher::contains(value)) {
                (Some(actual), Some(m)) => m.is_match(actual),
                (None, Some(_)) => false,
                (_, None) => true,
            }
        })
    }

    /// Mongo clauses for this filter, to be AND-ed together
    pub fn to_bson_clauses(&self) -> Vec<Document> {
        let mut clauses = Vec::new();

        if let Some(m) = self.text.as_deref().and_then(TextMatcher::contains) {
            clauses.push(doc! { "$or": [ { "title": m.to_bson() }, { "content": m.to_bson() } ] });
        }

        let tags: Vec<Bson> = self
            .tags
            .iter()
            .filter_map(|t| TextMatcher::exact(t))
            .map(|m| m.to_bson())
            .collect();
        if !tags.is_empty() {
            clauses.push(doc! { "tags": { "$in": tags } });
        }

        if let Some(status) = self.status {
            clauses.push(doc! { "status": status.as_str() });
        }
        if let Some(owner) = self.owner {
            clauses.push(doc! { "owner": owner });
        }
        if let Some(assigned_to) = self.assigned_to {
            clauses.push(doc! { "assignedTo": assigned_to });
        }
        if let Some(m) = self.doc_ref_short.as_deref().and_then(TextMatcher::contains) {
            clauses.push(doc! { "docRefShort": m.to_bson() });
        }
        for (key, value) in &self.metadata {
            if let Some(m) = TextMatcher::contains(value) {
                let mut clause = Document::new();
                clause.insert(format!("metadata.{key}"), m.to_bson());
                clauses.push(clause);
            }
        }

        clauses
    }
}

/// A complete document query: visibility, filters and an optional id set
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    pub visibility: Visibility,
    pub filter: DocumentFilter,
    pub ids: Option<Vec<ObjectId>>,
}

impl DocumentQuery {
    pub fn new(visibility: Visibility, filter: DocumentFilter) -> Self {
        Self {
            visibility,
            filter,
            ids: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<ObjectId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn matches(&self, doc: &DocumentDoc) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&doc.id) {
                return false;
            }
        }
        self.visibility.matches(doc) && self.filter.matches(doc)
    }

    pub fn to_bson(&self) -> Document {
        let mut clauses = Vec::new();
        if let Some(ids) = &self.ids {
            clauses.push(doc! { "_id": { "$in": ids.clone() } });
        }
        if let Some(v) = self.visibility.to_bson() {
            clauses.push(v);
        }
        clauses.extend(self.filter.to_bson_clauses());

        match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        }
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Clamped page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// `limit` is clamped to [1, 100] and defaults to 20; `page` starts at 1
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}
