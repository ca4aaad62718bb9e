//! Roles and the per-request authorization context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::validate::ValidationError;
use crate::store::UserRecord;

/// Closed set of dashboard roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Leader,
    Delegate,
    /// Polling-station witness; sees the same data a delegate does.
    Witness,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Leader, Role::Delegate, Role::Witness];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Leader => "leader",
            Role::Delegate => "delegate",
            Role::Witness => "witness",
        }
    }

    /// Whether data for this role is scoped by the linked delegate id.
    pub fn scopes_as_delegate(&self) -> bool {
        matches!(self, Role::Delegate | Role::Witness)
    }

    /// Roles a user may pick for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        self.scopes_as_delegate()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "leader" => Ok(Role::Leader),
            "delegate" => Ok(Role::Delegate),
            "witness" => Ok(Role::Witness),
            _ => Err(ValidationError::InvalidRole {
                value: s.to_string(),
            }),
        }
    }
}

/// Which rows a request may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataScope {
    All,
    Leader(String),
    Delegate(String),
    /// A scoped role without its linked id sees nothing.
    Nothing,
}

impl DataScope {
    /// Whether a row owned by `leader_id` (and optionally `delegate_id`) is visible.
    pub fn permits(&self, leader_id: &str, delegate_id: Option<&str>) -> bool {
        match self {
            DataScope::All => true,
            DataScope::Leader(id) => id == leader_id,
            DataScope::Delegate(id) => delegate_id == Some(id.as_str()),
            DataScope::Nothing => false,
        }
    }
}

/// Resolved identity for one request. Recomputed from the session every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationContext {
    pub user_id: i64,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
}

impl AuthorizationContext {
    /// Build the context for a user, keeping only the linked id its role makes meaningful.
    pub fn from_user(user: &UserRecord) -> Self {
        let (delegate_id, leader_id) = match user.role {
            Role::Admin => (None, None),
            Role::Leader => (None, user.leader_id.clone()),
            Role::Delegate | Role::Witness => (user.delegate_id.clone(), None),
        };
        Self {
            user_id: user.id,
            role: user.role,
            delegate_id,
            leader_id,
        }
    }

    pub fn scope(&self) -> DataScope {
        match self.role {
            Role::Admin => DataScope::All,
            Role::Leader => self
                .leader_id
                .clone()
                .map(DataScope::Leader)
                .unwrap_or(DataScope::Nothing),
            Role::Delegate | Role::Witness => self
                .delegate_id
                .clone()
                .map(DataScope::Delegate)
                .unwrap_or(DataScope::Nothing),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
