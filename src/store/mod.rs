//! Storage seams
//!
//! The workflow engine reaches persistence only through these traits. Two
//! backends implement them: MongoDB (`db::stores`) and process-local maps
//! (`store::memory`) used by tests and `STORAGE=memory`.

pub mod memory;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use std::sync::Arc;

use crate::auth::Role;
use crate::db::schemas::{AuditLogDoc, DocumentDoc, UserDoc};
use crate::types::Result;
use crate::workflow::access::{DocumentQuery, PageRequest, TextMatcher};

pub use memory::{MemoryAuditStore, MemoryCounterStore, MemoryDocumentStore, MemoryUserStore};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Conflict if its id, docRef or docRefShort is taken.
    async fn insert(&self, doc: &DocumentDoc) -> Result<()>;

    async fn get(&self, id: &ObjectId) -> Result<Option<DocumentDoc>>;

    /// Compare-and-swap on `version`.
    ///
    /// `doc.version` must already be the new version. Fails with Conflict if
    /// the stored version is not `expected_version`, NotFound if the document
    /// is gone.
    async fn replace(&self, doc: &DocumentDoc, expected_version: i64) -> Result<()>;

    /// Hard delete. Returns false if nothing was deleted.
    async fn delete(&self, id: &ObjectId) -> Result<bool>;

    async fn count(&self, query: &DocumentQuery) -> Result<u64>;

    /// Matching documents, newest first
    async fn find(&self, query: &DocumentQuery, page: Option<PageRequest>)
        -> Result<Vec<DocumentDoc>>;

    /// Documents still missing a reference or history field
    async fn find_incomplete(&self) -> Result<Vec<DocumentDoc>>;
}

/// Filter for user listings
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// None means every role
    pub roles: Option<Vec<Role>>,
    /// Substring over username or full name
    pub search: Option<String>,
}

impl UserQuery {
    pub fn matches(&self, user: &UserDoc) -> bool {
        if let Some(roles) = &self.roles {
            if !roles.contains(&user.role) {
                return false;
            }
        }
        match self.search.as_deref().and_then(TextMatcher::contains) {
            Some(m) => {
                m.is_match(&user.username)
                    || user.full_name.as_deref().is_some_and(|n| m.is_match(n))
            }
            None => true,
        }
    }

    pub fn to_bson(&self) -> Document {
        let mut clauses = Vec::new();
        if let Some(roles) = &self.roles {
            let roles: Vec<Bson> = roles.iter().map(|r| Bson::String(r.as_str().into())).collect();
            clauses.push(doc! { "role": { "$in": roles } });
        }
        if let Some(m) = self.search.as_deref().and_then(TextMatcher::contains) {
            clauses.push(doc! { "$or": [ { "username": m.to_bson() }, { "fullName": m.to_bson() } ] });
        }
        match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => doc! { "$and": clauses },
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Validation error if the username is taken.
    async fn insert(&self, user: &UserDoc) -> Result<()>;

    async fn get(&self, id: &ObjectId) -> Result<Option<UserDoc>>;

    /// Batched lookup; unknown ids are skipped
    async fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDoc>>;

    async fn ids_with_roles(&self, roles: &[Role]) -> Result<Vec<ObjectId>>;

    async fn count(&self, query: &UserQuery) -> Result<u64>;

    /// Matching users ordered by username
    async fn find(&self, query: &UserQuery, page: Option<PageRequest>) -> Result<Vec<UserDoc>>;

    async fn replace(&self, user: &UserDoc) -> Result<()>;

    async fn delete(&self, id: &ObjectId) -> Result<bool>;
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the named series and return the new value.
    /// A series that does not exist yet starts at 1.
    async fn increment(&self, series: &str) -> Result<i64>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLogDoc) -> Result<()>;

    /// Newest first
    async fn list(&self, target_id: Option<ObjectId>, skip: u64, limit: u64)
        -> Result<Vec<AuditLogDoc>>;
}

/// The set of stores a running service uses
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn DocumentStore>,
    pub users: Arc<dyn UserStore>,
    pub counters: Arc<dyn CounterStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    /// Fresh process-local stores
    pub fn memory() -> Self {
        Self {
            documents: Arc::new(MemoryDocumentStore::new()),
            users: Arc::new(MemoryUserStore::new()),
            counters: Arc::new(MemoryCounterStore::new()),
            audit: Arc::new(MemoryAuditStore::new()),
        }
    }
}
