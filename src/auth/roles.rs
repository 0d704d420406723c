//! Roles and the role permission graph
//!
//! Every role-dependent decision in the crate is answered from the
//! `ROLE_GRANTS` table below. Control flow elsewhere asks questions
//! (`is_peer_group`, `is_document_admin`, ...) and never matches on role names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum Role {
    #[default]
    User,
    Employee,
    Manager,
    Ceo,
    Hr,
    Admin,
    TechnicalAdmin,
}

impl Role {
    /// All roles, least privileged first
    pub const ALL: [Role; 7] = [
        Role::User,
        Role::Employee,
        Role::Manager,
        Role::Ceo,
        Role::Hr,
        Role::Admin,
        Role::TechnicalAdmin,
    ];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Ceo => "ceo",
            Role::Hr => "hr",
            Role::Admin => "admin",
            Role::TechnicalAdmin => "technical-admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown role: {s}"))
    }
}

/// Which other users' roles a role may look up in the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVisibility {
    None,
    Roles(&'static [Role]),
    All,
}

/// One row of the permission table
#[derive(Debug, Clone, Copy)]
pub struct RoleGrant {
    pub role: Role,
    /// Roles this role may create accounts for
    pub creatable: &'static [Role],
    /// Member of the privileged peer group (cross-visibility of owned documents)
    pub peer_group: bool,
    /// Unrestricted access to every document
    pub document_admin: bool,
    /// May change roles and delete accounts
    pub manages_users: bool,
    pub visible_users: UserVisibility,
}

const STAFF: &[Role] = &[Role::Employee, Role::User];

/// The permission table
pub static ROLE_GRANTS: &[RoleGrant] = &[
    RoleGrant {
        role: Role::TechnicalAdmin,
        creatable: &[
            Role::User,
            Role::Employee,
            Role::Manager,
            Role::Ceo,
            Role::Admin,
            Role::TechnicalAdmin,
            Role::Hr,
        ],
        peer_group: true,
        document_admin: false,
        manages_users: true,
        visible_users: UserVisibility::All,
    },
    RoleGrant {
        role: Role::Admin,
        creatable: &[Role::User, Role::Employee, Role::Manager, Role::Ceo, Role::Hr],
        peer_group: true,
        document_admin: true,
        manages_users: true,
        visible_users: UserVisibility::All,
    },
    RoleGrant {
        role: Role::Manager,
        creatable: STAFF,
        peer_group: true,
        document_admin: false,
        manages_users: false,
        visible_users: UserVisibility::Roles(STAFF),
    },
    RoleGrant {
        role: Role::Ceo,
        creatable: STAFF,
        peer_group: true,
        document_admin: false,
        manages_users: false,
        visible_users: UserVisibility::Roles(STAFF),
    },
    RoleGrant {
        role: Role::Hr,
        creatable: STAFF,
        peer_group: true,
        document_admin: false,
        manages_users: false,
        visible_users: UserVisibility::Roles(STAFF),
    },
    RoleGrant {
        role: Role::Employee,
        creatable: &[Role::User],
        peer_group: false,
        document_admin: false,
        manages_users: false,
        visible_users: UserVisibility::None,
    },
    RoleGrant {
        role: Role::User,
        creatable: &[],
        peer_group: false,
        document_admin: false,
        manages_users: false,
        visible_users: UserVisibility::None,
    },
];

const NO_GRANT: RoleGrant = RoleGrant {
    role: Role::User,
    creatable: &[],
    peer_group: false,
    document_admin: false,
    manages_users: false,
    visible_users: UserVisibility::None,
};

/// Look up the grant row for a role. A role missing from the table gets nothing.
pub fn grant_for(role: Role) -> &'static RoleGrant {
    ROLE_GRANTS
        .iter()
        .find(|g| g.role == role)
        .unwrap_or(&NO_GRANT)
}

/// Roles an actor with `actor_role` may create
pub fn creatable_roles(actor_role: Role) -> &'static [Role] {
    grant_for(actor_role).creatable
}

/// Whether `actor_role` may create an account with `target_role`
pub fn can_create(actor_role: Role, target_role: Role) -> bool {
    creatable_roles(actor_role).contains(&target_role)
}

/// Whether the role belongs to the privileged peer group
pub fn is_peer_group(role: Role) -> bool {
    grant_for(role).peer_group
}

/// All roles in the privileged peer group
pub fn peer_roles() -> Vec<Role> {
    ROLE_GRANTS
        .iter()
        .filter(|g| g.peer_group)
        .map(|g| g.role)
        .collect()
}

/// Whether the role has unrestricted document access
pub fn is_document_admin(role: Role) -> bool {
    grant_for(role).document_admin
}

/// Whether the role may change roles and delete accounts
pub fn manages_users(role: Role) -> bool {
    grant_for(role).manages_users
}

/// Which user roles the actor may look up
pub fn visible_user_roles(role: Role) -> UserVisibility {
    grant_for(role).visible_users
}

/// Whether an actor with `actor_role` may look up a user with `target_role`
pub fn can_view_user(actor_role: Role, target_role: Role) -> bool {
    match visible_user_roles(actor_role) {
        UserVisibility::All => true,
        UserVisibility::Roles(roles) => roles.contains(&target_role),
        UserVisibility::None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_a_row() {
        for role in Role::ALL {
            assert_eq!(grant_for(role).role, role, "missing grant for {role}");
        }
    }

    #[test]
    fn test_creatable_roles() {
        assert!(can_create(Role::TechnicalAdmin, Role::TechnicalAdmin));
        assert!(can_create(Role::Admin, Role::Hr));
        assert!(!can_create(Role::Admin, Role::Admin));
        assert!(!can_create(Role::Admin, Role::TechnicalAdmin));
        assert!(can_create(Role::Manager, Role::Employee));
        assert!(!can_create(Role::Manager, Role::Manager));
        assert!(can_create(Role::Employee, Role::User));
        assert!(!can_create(Role::Employee, Role::Employee));
        assert!(creatable_roles(Role::User).is_empty());
    }

    #[test]
    fn test_peer_group() {
        let peers = peer_roles();
        assert_eq!(peers.len(), 5);
        for role in [Role::Admin, Role::TechnicalAdmin, Role::Manager, Role::Ceo, Role::Hr] {
            assert!(is_peer_group(role));
            assert!(peers.contains(&role));
        }
        assert!(!is_peer_group(Role::Employee));
        assert!(!is_peer_group(Role::User));
    }

    #[test]
    fn test_only_admin_is_document_admin() {
        for role in Role::ALL {
            assert_eq!(is_document_admin(role), role == Role::Admin);
        }
    }

    #[test]
    fn test_user_visibility() {
        assert!(can_view_user(Role::Admin, Role::TechnicalAdmin));
        assert!(can_view_user(Role::Hr, Role::Employee));
        assert!(!can_view_user(Role::Hr, Role::Manager));
        assert!(!can_view_user(Role::Employee, Role::User));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_string(&Role::TechnicalAdmin).unwrap(),
            "\"technical-admin\""
        );
        assert_eq!("CEO".parse::<Role>().unwrap(), Role::Ceo);
        assert!("janitor".parse::<Role>().is_err());
    }
}
