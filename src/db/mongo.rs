//! MongoDB client and collection wrapper

use bson::{doc, Document};
use futures_util::StreamExt;
use mongodb::{
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::types::DoctrackError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Server error code 11000, or its message form from older servers
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    err.to_string().contains("E11000")
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, DoctrackError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| DoctrackError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DoctrackError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, DoctrackError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, DoctrackError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), DoctrackError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| DoctrackError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert; a unique-index violation is reported as Conflict
    pub async fn insert_one(&self, item: &T) -> Result<(), DoctrackError> {
        self.inner.insert_one(item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                DoctrackError::Conflict(format!("Duplicate key: {}", e))
            } else {
                DoctrackError::Database(format!("Insert failed: {}", e))
            }
        })?;
        Ok(())
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, DoctrackError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| DoctrackError::Database(format!("Find failed: {}", e)))
    }

    /// Find documents matching a filter, optionally sorted and paged
    pub async fn find_many(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<T>, DoctrackError> {
        let cursor = self
            .inner
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| DoctrackError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    pub async fn count(&self, filter: Document) -> Result<u64, DoctrackError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| DoctrackError::Database(format!("Count failed: {}", e)))
    }

    /// Replace the single document matching `filter`
    pub async fn replace_one(&self, filter: Document, item: &T) -> Result<UpdateResult, DoctrackError> {
        self.inner.replace_one(filter, item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                DoctrackError::Conflict(format!("Duplicate key: {}", e))
            } else {
                DoctrackError::Database(format!("Replace failed: {}", e))
            }
        })
    }

    /// Apply `update` atomically and return the post-update document,
    /// creating it when absent
    pub async fn upsert_and_fetch(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<T>, DoctrackError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        self.inner
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(|e| DoctrackError::Database(format!("Find-and-update failed: {}", e)))
    }

    /// Hard delete
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, DoctrackError> {
        self.inner
            .delete_one(filter)
            .await
            .map_err(|e| DoctrackError::Database(format!("Delete failed: {}", e)))
    }
}
