//! MongoDB-backed stores
//!
//! Each store owns one typed collection. Query predicates come from the
//! workflow layer already rendered as BSON filters.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::FindOptions;
use tracing::debug;

use crate::auth::Role;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    AuditLogDoc, CounterDoc, DocumentDoc, UserDoc, AUDIT_LOG_COLLECTION, COUNTER_COLLECTION,
    DOCUMENT_COLLECTION, USER_COLLECTION,
};
use crate::store::{AuditStore, CounterStore, DocumentStore, Stores, UserQuery, UserStore};
use crate::types::{DoctrackError, Result};
use crate::workflow::access::{DocumentQuery, PageRequest};
use std::sync::Arc;

fn paged(sort: Document, page: Option<PageRequest>) -> FindOptions {
    let mut options = FindOptions::builder().sort(sort).build();
    if let Some(p) = page {
        options.skip = Some(p.skip());
        options.limit = Some(p.limit as i64);
    }
    options
}

/// Open every collection (applying indexes) and bundle the stores
pub async fn mongo_stores(client: &MongoClient) -> Result<Stores> {
    Ok(Stores {
        documents: Arc::new(MongoDocumentStore::new(client).await?),
        users: Arc::new(MongoUserStore::new(client).await?),
        counters: Arc::new(MongoCounterStore::new(client).await?),
        audit: Arc::new(MongoAuditStore::new(client).await?),
    })
}

// =============================================================================
// Documents
// =============================================================================

pub struct MongoDocumentStore {
    collection: MongoCollection<DocumentDoc>,
}

impl MongoDocumentStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<DocumentDoc>(DOCUMENT_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn insert(&self, doc: &DocumentDoc) -> Result<()> {
        self.collection.insert_one(doc).await
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<DocumentDoc>> {
        self.collection.find_one(doc! { "_id": id }).await
    }

    async fn replace(&self, doc: &DocumentDoc, expected_version: i64) -> Result<()> {
        // Records written before versioning have no field; they read as version 1
        let filter = if expected_version == 1 {
            doc! {
                "_id": doc.id,
                "$or": [ { "version": 1_i64 }, { "version": { "$exists": false } } ],
            }
        } else {
            doc! { "_id": doc.id, "version": expected_version }
        };
        let result = self.collection.replace_one(filter, doc).await?;

        if result.matched_count > 0 {
            return Ok(());
        }

        // Nothing matched: either the document is gone or someone else wrote first
        match self.collection.find_one(doc! { "_id": doc.id }).await? {
            Some(_) => Err(DoctrackError::Conflict(
                "Document was modified by someone else; reload and retry".into(),
            )),
            None => Err(DoctrackError::NotFound("Document not found".into())),
        }
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count(&self, query: &DocumentQuery) -> Result<u64> {
        self.collection.count(query.to_bson()).await
    }

    async fn find(
        &self,
        query: &DocumentQuery,
        page: Option<PageRequest>,
    ) -> Result<Vec<DocumentDoc>> {
        let filter = query.to_bson();
        debug!(%filter, "document query");
        self.collection
            .find_many(filter, Some(paged(doc! { "createdAt": -1, "_id": -1 }, page)))
            .await
    }

    async fn find_incomplete(&self) -> Result<Vec<DocumentDoc>> {
        let missing = |field: &str| -> Vec<Document> {
            let mut absent = Document::new();
            absent.insert(field, doc! { "$exists": false });
            let mut empty = Document::new();
            empty.insert(field, "");
            vec![absent, empty]
        };

        let mut any_of = Vec::new();
        any_of.extend(missing("docRef"));
        any_of.extend(missing("docRefShort"));
        for field in ["eventId", "performedByName"] {
            for clause in missing(field) {
                any_of.push(doc! { "history": { "$elemMatch": clause } });
            }
        }

        self.collection
            .find_many(doc! { "$or": any_of }, None)
            .await
    }
}

// =============================================================================
// Users
// =============================================================================

pub struct MongoUserStore {
    collection: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<UserDoc>(USER_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: &UserDoc) -> Result<()> {
        match self.collection.insert_one(user).await {
            Err(DoctrackError::Conflict(_)) => {
                Err(DoctrackError::Validation("User already exists".into()))
            }
            other => other,
        }
    }

    async fn get(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.collection.find_one(doc! { "_id": id }).await
    }

    async fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<UserDoc>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Bson> = ids.iter().map(|id| Bson::ObjectId(*id)).collect();
        self.collection
            .find_many(doc! { "_id": { "$in": ids } }, None)
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserDoc>> {
        self.collection.find_one(doc! { "username": username }).await
    }

    async fn ids_with_roles(&self, roles: &[Role]) -> Result<Vec<ObjectId>> {
        let query = UserQuery {
            roles: Some(roles.to_vec()),
            search: None,
        };
        let users = self.collection.find_many(query.to_bson(), None).await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    async fn count(&self, query: &UserQuery) -> Result<u64> {
        self.collection.count(query.to_bson()).await
    }

    async fn find(&self, query: &UserQuery, page: Option<PageRequest>) -> Result<Vec<UserDoc>> {
        self.collection
            .find_many(query.to_bson(), Some(paged(doc! { "username": 1 }, page)))
            .await
    }

    async fn replace(&self, user: &UserDoc) -> Result<()> {
        let result = self
            .collection
            .replace_one(doc! { "_id": user.id }, user)
            .await?;
        if result.matched_count == 0 {
            return Err(DoctrackError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

// =============================================================================
// Counters
// =============================================================================

pub struct MongoCounterStore {
    collection: MongoCollection<CounterDoc>,
}

impl MongoCounterStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<CounterDoc>(COUNTER_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl CounterStore for MongoCounterStore {
    async fn increment(&self, series: &str) -> Result<i64> {
        let counter = self
            .collection
            .upsert_and_fetch(doc! { "_id": series }, doc! { "$inc": { "seq": 1_i64 } })
            .await?
            .ok_or_else(|| {
                DoctrackError::Database(format!("Counter {series} missing after upsert"))
            })?;
        Ok(counter.seq)
    }
}

// =============================================================================
// Audit log
// =============================================================================

pub struct MongoAuditStore {
    collection: MongoCollection<AuditLogDoc>,
}

impl MongoAuditStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection::<AuditLogDoc>(AUDIT_LOG_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait]
impl AuditStore for MongoAuditStore {
    async fn append(&self, entry: &AuditLogDoc) -> Result<()> {
        self.collection.insert_one(entry).await
    }

    async fn list(
        &self,
        target_id: Option<ObjectId>,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<AuditLogDoc>> {
        let filter = match target_id {
            Some(id) => doc! { "targetId": id },
            None => Document::new(),
        };
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .skip(skip)
            .limit(limit as i64)
            .build();
        self.collection.find_many(filter, Some(options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_options() {
        let options = paged(doc! { "createdAt": -1 }, Some(PageRequest::new(Some(3), Some(10))));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.limit, Some(10));

        let options = paged(doc! { "createdAt": -1 }, None);
        assert!(options.skip.is_none());
    }
}
