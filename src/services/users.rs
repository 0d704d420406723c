//! User directory
//!
//! Account creation and lookup scoped by the role permission graph. Login,
//! lockout and password reset belong to the identity collaborator.

use bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::audit::AuditTrail;
use crate::auth::{
    can_create, can_view_user, hash_password, manages_users, peer_roles, visible_user_roles,
};
use crate::auth::{Actor, Role, UserVisibility};
use crate::db::schemas::{AuditAction, TargetModel, UserDoc};
use crate::services::views::{UserPage, UserView};
use crate::store::{UserQuery, UserStore};
use crate::types::{DoctrackError, Result};
use crate::workflow::PageRequest;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Role,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub full_name: Option<String>,
    pub password: Option<String>,
}

/// Listing parameters
#[derive(Debug, Clone, Default)]
pub struct ListUsersParams {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub page: PageRequest,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserStore>,
    audit: AuditTrail,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserStore>, audit: AuditTrail) -> Self {
        Self { users, audit }
    }

    async fn load(&self, id: &ObjectId) -> Result<UserDoc> {
        self.users
            .get(id)
            .await?
            .ok_or_else(|| DoctrackError::NotFound("User not found".into()))
    }

    pub async fn create_user(&self, actor: &Actor, request: CreateUserRequest) -> Result<UserView> {
        if !can_create(actor.role, request.role) {
            return Err(DoctrackError::AuthorizationDenied(format!(
                "A {} may not create {} accounts",
                actor.role, request.role
            )));
        }

        let username = request.username.trim();
        if username.is_empty() {
            return Err(DoctrackError::Validation("Username is required".into()));
        }
        let password_hash = hash_password(&request.password)?;

        let user = UserDoc::new(
            username.to_string(),
            password_hash,
            request.role,
            non_blank(request.full_name),
        );
        self.users.insert(&user).await?;

        info!(id = %user.id, username = %user.username, role = %user.role, by = %actor.username, "User created");
        self.audit.record(
            AuditAction::Create,
            TargetModel::User,
            user.id,
            actor,
            json!({ "username": user.username, "role": user.role }),
        );
        Ok(UserView::from(&user))
    }

    pub async fn list_users(&self, actor: &Actor, params: ListUsersParams) -> Result<UserPage> {
        let roles = match visible_user_roles(actor.role) {
            UserVisibility::None => {
                return Err(DoctrackError::AuthorizationDenied(
                    "Not authorized to list users".into(),
                ))
            }
            UserVisibility::All => params.role.map(|r| vec![r]),
            UserVisibility::Roles(visible) => Some(match params.role {
                Some(r) if visible.contains(&r) => vec![r],
                Some(_) => Vec::new(),
                None => visible.to_vec(),
            }),
        };
        let query = UserQuery {
            roles,
            search: non_blank(params.search),
        };

        let total = self.users.count(&query).await?;
        let users = self.users.find(&query, Some(params.page)).await?;
        Ok(UserPage {
            users: users.iter().map(UserView::from).collect(),
            total,
            page: params.page.page,
            total_pages: params.page.total_pages(total),
        })
    }

    /// Peer-group members, the usual candidates for assignment
    pub async fn list_heads(&self) -> Result<Vec<UserView>> {
        let query = UserQuery {
            roles: Some(peer_roles()),
            search: None,
        };
        let users = self.users.find(&query, None).await?;
        Ok(users.iter().map(UserView::from).collect())
    }

    pub async fn get_user(&self, actor: &Actor, id: &ObjectId) -> Result<UserView> {
        let user = self.load(id).await?;
        if user.id != actor.id && !can_view_user(actor.role, user.role) {
            return Err(DoctrackError::AuthorizationDenied(
                "Not authorized to view this user".into(),
            ));
        }
        Ok(UserView::from(&user))
    }

    pub async fn update_user(
        &self,
        actor: &Actor,
        id: &ObjectId,
        request: UpdateUserRequest,
    ) -> Result<UserView> {
        let before = self.load(id).await?;
        let is_self = before.id == actor.id;
        let manager = manages_users(actor.role);
        if !is_self && !manager {
            return Err(DoctrackError::AuthorizationDenied(
                "Not authorized to update this user".into(),
            ));
        }

        let mut after = before.clone();
        if let Some(role) = request.role.filter(|r| *r != before.role) {
            if !manager {
                return Err(DoctrackError::AuthorizationDenied(
                    "Only user administrators may change roles".into(),
                ));
            }
            // Both the old and the new role must be ones the actor could create
            if !can_create(actor.role, role) || !can_create(actor.role, before.role) {
                return Err(DoctrackError::AuthorizationDenied(format!(
                    "Not authorized to assign role {role}"
                )));
            }
            after.role = role;
        }
        if let Some(full_name) = request.full_name {
            after.full_name = non_blank(Some(full_name));
        }
        let password_changed = match request.password.as_deref() {
            Some(password) if !password.is_empty() => {
                after.password_hash = hash_password(password)?;
                true
            }
            _ => false,
        };

        if after == before {
            return Ok(UserView::from(&before));
        }
        self.users.replace(&after).await?;

        info!(id = %after.id, by = %actor.username, "User updated");
        self.audit.record(
            AuditAction::Update,
            TargetModel::User,
            after.id,
            actor,
            json!({
                "before": { "role": before.role, "fullName": before.full_name },
                "after": { "role": after.role, "fullName": after.full_name },
                "passwordChanged": password_changed,
            }),
        );
        Ok(UserView::from(&after))
    }

    pub async fn delete_user(&self, actor: &Actor, id: &ObjectId) -> Result<()> {
        if !manages_users(actor.role) {
            return Err(DoctrackError::AuthorizationDenied(
                "Only user administrators may delete accounts".into(),
            ));
        }
        if *id == actor.id {
            return Err(DoctrackError::Validation(
                "You cannot delete your own account".into(),
            ));
        }

        let user = self.load(id).await?;
        if !self.users.delete(id).await? {
            return Err(DoctrackError::NotFound("User not found".into()));
        }

        info!(id = %user.id, username = %user.username, by = %actor.username, "User deleted");
        self.audit.record(
            AuditAction::Delete,
            TargetModel::User,
            user.id,
            actor,
            json!({ "username": user.username, "role": user.role }),
        );
        Ok(())
    }
}
