//! In-memory storage
//!
//! DashMap-backed implementations of the storage traits. Single-key writes
//! hold the shard lock for the duration of the check, so compare-and-swap and
//! counter increments are atomic without a global lock.

use async_trait::async_trait;
use bson::oid::ObjectId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Reverse;
use std::sync::Mutex;

use super::{AuditStore, CounterStore, DocumentStore, UserQuery, UserStore};
use crate::auth::Role;
use crate::db::schemas::{AuditLogDoc, DocumentDoc, UserDoc};
use crate::types::{DoctrackError, Result};
use crate::workflow::access::{DocumentQuery, PageRequest};

fn window<T>(items: Vec<T>, page: Option<PageRequest>) -> Vec<T> {
    match page {
        Some(p) => {
            let skip = usize::try_from(p.skip()).unwrap_or(usize::MAX);
            let limit = usize::try_from(p.limit).unwrap_or(usize::MAX);
            items.into_iter().skip(skip).take(limit).collect()
        }
        None => items,
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Documents keyed by id, with a reference index enforcing uniqueness
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<ObjectId, DocumentDoc>,
    /// docRef / docRefShort → owning document
    refs: DashMap<String, ObjectId>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Insert without reference bookkeeping, for seeding legacy records
    pub fn insert_raw(&self, doc: DocumentDoc) {
        self.docs.insert(doc.id, doc);
    }

    fn claim_ref(&self, reference: &str, id: ObjectId) -> Result<()> {
        if reference.is_empty() {
            return Ok(());
        }
        match self.refs.entry(reference.to_string()) {
            Entry::Occupied(existing) if *existing.get() != id => Err(DoctrackError::Conflict(
                format!("Reference {reference} is already in use"),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn release_refs(&self, doc: &DocumentDoc) {
        for reference in [&doc.doc_ref, &doc.doc_ref_short] {
            self.refs.remove_if(reference.as_str(), |_, owner| *owner == doc.id);
        }
    }

    fn sorted_matches(&self, query: &DocumentQuery) -> Vec<DocumentDoc> {
        let mut found: Vec<DocumentDoc> = self
            .docs
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|d| Reverse((d.created_at, d.id)));
        found
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, doc: &DocumentDoc) -> Result<()> {
        if self.docs.contains_key(&doc.id) {
            return Err(DoctrackError::Conflict("Document already exists".into()));
        }
        self.claim_ref(&doc.doc_ref, doc.id)?;
        if let Err(e) = self.claim_ref(&doc.doc_ref_short, doc.id) {
            self.refs.remove_if(doc.doc_ref.as_str(), |_, owner| *owner == doc.id);
            return Err(e);
        }
        self.docs.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<DocumentDoc>> {
        Ok(self.docs.get(id).map(|d| d.value().clone()))
    }

    async fn replace(&self, doc: &DocumentDoc, expected_version: i64) -> Result<()> {
        let mut slot = self
            .docs
            .get_mut(&doc.id)
            .ok_or_else(|| DoctrackError::NotFound("Document not found".into()))?;

        if slot.version != expected_version {
            return Err(DoctrackError::Conflict(
                "Document was modified by someone else; reload and retry".into(),
            ));
        }

        // References are immutable once set, but backfill may set them
        self.claim_ref(&doc.doc_ref, doc.id)?;
        self.claim_ref(&doc.doc_ref_short, doc.id)?;

        *slot = doc.clone();
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool> {
        match self.docs.remove(id) {
            Some((_, doc)) => {
                self.release_refs(&doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64> {
        Ok(self.docs.iter().filter(|e| query.matches(e.value())).count() as u64)
    }

    async fn find(
        &self,
        query: &DocumentQuery,
        page: Option<PageRequest>,
    ) -> Result<Vec<DocumentDoc>> {
        Ok(window(self.sorted_matches(query), page))
    }

    async fn find_incomplete(&self) -> Result<Vec<DocumentDoc>> {
        Ok(self
            .docs
            .iter()
            .filter(|e| e.value().needs_backfill())
            .map(|e| e.value().clone())
            .collect())
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<ObjectId, UserDoc>,
    /// Lowercased username → id
    usernames: DashMap<String, ObjectId>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, query: &UserQuery) -> Vec<UserDoc> {
        let mut found: Vec<UserDoc> = self
            .users
            .iter()
            .filter(|e| query.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserDoc) -> Result<()> {
        match self.usernames.entry(user.username.to_lowercase()) {
            Entry::Occupied(_) => Err(DoctrackError::Validation("User already exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.value().clone()))
            .collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDoc>> {
        let id = match self.usernames.get(&username.to_lowercase()) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn ids_with_roles(&self, roles: &[Role]) -> Result<Vec<ObjectId>> {
        Ok(self
            .users
            .iter()
            .filter(|e| roles.contains(&e.value().role))
            .map(|e| *e.key())
            .collect())
    }

    async fn count(&self, query: &UserQuery) -> Result<u64> {
        Ok(self.users.iter().filter(|e| query.matches(e.value())).count() as u64)
    }

    async fn find(&self, query: &UserQuery, page: Option<PageRequest>) -> Result<Vec<UserDoc>> {
        Ok(window(self.matching(query), page))
    }

    async fn replace(&self, user: &UserDoc) -> Result<()> {
        let mut slot = self
            .users
            .get_mut(&user.id)
            .ok_or_else(|| DoctrackError::NotFound("User not found".into()))?;
        *slot = user.clone();
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool> {
        match self.users.remove(id) {
            Some((_, user)) => {
                self.usernames.remove(&user.username.to_lowercase());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, i64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, series: &str) -> Result<i64> {
        let mut seq = self.counters.entry(series.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}

// =============================================================================
// Audit log
// =============================================================================

#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditLogDoc>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditLogDoc) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| DoctrackError::Internal("Audit store lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    async fn list(
        &self,
        target_id: Option<ObjectId>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<AuditLogDoc>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DoctrackError::Internal("Audit store lock poisoned".into()))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| target_id.map_or(true, |t| e.target_id == t))
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{AuditAction, TargetModel};
    use crate::workflow::access::{DocumentFilter, Visibility};
    use bson::DateTime;
    use std::sync::Arc;

    fn doc(owner: ObjectId, short: &str) -> DocumentDoc {
        let mut d = DocumentDoc::new(
            ObjectId::new(),
            owner,
            "title".into(),
            "content".into(),
            DateTime::now(),
        );
        d.doc_ref = format!("DOC-{}", uuid::Uuid::new_v4().simple());
        d.doc_ref_short = short.into();
        d
    }

    #[tokio::test]
    async fn test_duplicate_short_ref_rejected() {
        let store = MemoryDocumentStore::new();
        let owner = ObjectId::new();
        store.insert(&doc(owner, "DOC-000001")).await.unwrap();
        let err = store.insert(&doc(owner, "DOC-000001")).await.unwrap_err();
        assert!(matches!(err, DoctrackError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_is_compare_and_swap() {
        let store = MemoryDocumentStore::new();
        let mut d = doc(ObjectId::new(), "DOC-000001");
        store.insert(&d).await.unwrap();

        d.title = "second".into();
        d.version = 2;
        store.replace(&d, 1).await.unwrap();

        d.title = "stale".into();
        d.version = 2;
        let err = store.replace(&d, 1).await.unwrap_err();
        assert!(matches!(err, DoctrackError::Conflict(_)));
        assert_eq!(store.get(&d.id).await.unwrap().unwrap().title, "second");
    }

    #[tokio::test]
    async fn test_delete_releases_references() {
        let store = MemoryDocumentStore::new();
        let d = doc(ObjectId::new(), "DOC-000007");
        store.insert(&d).await.unwrap();
        assert!(store.delete(&d.id).await.unwrap());
        assert!(!store.delete(&d.id).await.unwrap());
        store.insert(&doc(ObjectId::new(), "DOC-000007")).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_pages_newest_first() {
        let store = MemoryDocumentStore::new();
        let owner = ObjectId::new();
        for i in 0..5 {
            let mut d = doc(owner, &format!("DOC-00000{i}"));
            d.created_at = DateTime::from_millis(1_000 * i);
            store.insert(&d).await.unwrap();
        }
        let q = DocumentQuery::new(Visibility::All, DocumentFilter::default());
        let page = store
            .find(&q, Some(PageRequest::new(Some(1), Some(2))))
            .await
            .unwrap();
        let refs: Vec<_> = page.iter().map(|d| d.doc_ref_short.as_str()).collect();
        assert_eq!(refs, vec!["DOC-000004", "DOC-000003"]);
        assert_eq!(store.count(&q).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.increment("documentRef").await }));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap().unwrap());
        }
        seen.sort();
        assert_eq!(seen, (1..=32).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_usernames_unique_case_insensitive() {
        let store = MemoryUserStore::new();
        let alice = UserDoc::new("alice".into(), "h".into(), Role::Employee, None);
        store.insert(&alice).await.unwrap();
        let dup = UserDoc::new("Alice".into(), "h".into(), Role::User, None);
        assert!(matches!(
            store.insert(&dup).await,
            Err(DoctrackError::Validation(_))
        ));
        assert_eq!(
            store.find_by_username("ALICE").await.unwrap().map(|u| u.id),
            Some(alice.id)
        );
    }

    #[tokio::test]
    async fn test_audit_list_newest_first() {
        let store = MemoryAuditStore::new();
        let target = ObjectId::new();
        for n in 0..3 {
            let entry = AuditLogDoc::new(
                AuditAction::Update,
                TargetModel::Document,
                target,
                ObjectId::new(),
                serde_json::json!({ "n": n }),
            );
            store.append(&entry).await.unwrap();
        }
        let listed = store.list(Some(target), 0, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].details["n"], 2);
        assert!(store.list(Some(ObjectId::new()), 0, 10).await.unwrap().is_empty());
    }
}
