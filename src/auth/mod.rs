//! Authentication and authorization for Doctrack
//!
//! Provides:
//! - JWT token verification (identity is issued by the login collaborator)
//! - The role permission graph consulted by every authorization decision
//! - Password hashing with Argon2 for accounts created through the directory
//! - `Actor`, the authenticated identity passed into every operation

pub mod jwt;
pub mod password;
pub mod roles;

use bson::oid::ObjectId;
use serde::Serialize;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use roles::{
    can_create, can_view_user, creatable_roles, is_document_admin, is_peer_group,
    manages_users, peer_roles, visible_user_roles, Role, RoleGrant, UserVisibility,
};

/// The authenticated identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: ObjectId,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ObjectId, username: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            username: username.into(),
            role,
        }
    }

    /// Unrestricted document access
    pub fn is_document_admin(&self) -> bool {
        is_document_admin(self.role)
    }

    pub fn is_peer(&self) -> bool {
        is_peer_group(self.role)
    }
}
