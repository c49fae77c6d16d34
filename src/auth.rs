pub mod backend;
pub mod login;
pub mod pg_session;
pub mod profile;
pub mod register;

use crate::error::CampusError;
use backend::Auth;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{AsRefStr, Display};

#[derive(
    sqlx::Type,
    Clone,
    Copy,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    Debug,
    Display,
    AsRefStr,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Staff,
    Admin,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PermissionsTarget {
    JoinEvents,
    /// Create events, and edit or certify the ones the user created.
    ManageEvents,
    Administrate,
}

impl Role {
    pub fn can(self) -> HashSet<PermissionsTarget> {
        let mut set = HashSet::new();

        match self {
            Self::Student => {
                set.insert(PermissionsTarget::JoinEvents);
            }
            Self::Teacher | Self::Staff => {
                set.insert(PermissionsTarget::ManageEvents);
            }
            Self::Admin => {
                set.insert(PermissionsTarget::ManageEvents);
                set.insert(PermissionsTarget::Administrate);
            }
        }

        set
    }
}

/// Who is making a request, once the session has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(self) -> bool {
        self.role == Role::Admin
    }
}

pub fn current_actor(auth: &Auth) -> Result<Actor, CampusError> {
    auth.user
        .as_ref()
        .map(|user| Actor {
            id: user.id,
            role: user.role,
        })
        .ok_or(CampusError::NotLoggedIn)
}
