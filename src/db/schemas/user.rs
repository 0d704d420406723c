//! User document schema
//!
//! Credential material and lockout counters are owned by the login
//! collaborator; this crate only reads them back unchanged.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Unique login name
    pub username: String,

    /// Argon2 PHC string
    #[serde(rename = "password")]
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default)]
    pub failed_login_attempts: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_until: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl UserDoc {
    /// Create a new user document
    pub fn new(username: String, password_hash: String, role: Role, full_name: Option<String>) -> Self {
        Self {
            id: ObjectId::new(),
            username,
            password_hash,
            role,
            full_name,
            failed_login_attempts: 0,
            lock_until: None,
            created_at: Some(DateTime::now()),
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on username
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            // Role lookups for peer-group visibility
            (
                doc! { "role": 1 },
                Some(IndexOptions::builder().name("role_index".to_string()).build()),
            ),
        ]
    }
}
