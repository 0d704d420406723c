//! Named sequence counters
//!
//! One record per series. Only ever touched through an atomic `$inc`.

use bson::Document;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for counters
pub const COUNTER_COLLECTION: &str = "counters";

/// Counter series used for short document references
pub const DOCUMENT_REF_SERIES: &str = "documentRef";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CounterDoc {
    /// Series name
    #[serde(rename = "_id")]
    pub name: String,
    #[serde(default)]
    pub seq: i64,
}

impl IntoIndexes for CounterDoc {
    // `_id` is the only key
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
