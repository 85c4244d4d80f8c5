//! User, project and role types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Path of the root organizational unit.
pub const ROOT_ORG_UNIT: &str = "/";

/// Organizational unit of a user name: the parent path of its namespace.
///
/// `"/ou1/bob"` → `"/ou1/"`, `"ou1/bob"` → `"/ou1/"`, `"bob"` → `"/"`.
pub fn org_unit_of(user_name: &str) -> String {
    match user_name.rfind('/') {
        Some(idx) => {
            let parent = &user_name[..=idx];
            if parent.starts_with('/') {
                parent.to_string()
            } else {
                format!("/{parent}")
            }
        }
        None => ROOT_ORG_UNIT.to_string(),
    }
}

fn normalize_org_unit(ou: &str) -> String {
    let mut normalized = String::with_capacity(ou.len() + 2);
    if !ou.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(ou);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Unique identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Roles relevant to the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    RootAdmin,
    Administrator,
    AccountManager,
    ElementAuthor,
    WorkplaceUser,
}

impl Role {
    /// Whether holding `self` also grants `other`.
    pub fn implies(self, other: Role) -> bool {
        if self == other {
            return true;
        }
        match self {
            Role::RootAdmin => true,
            Role::Administrator => matches!(
                other,
                Role::AccountManager | Role::ElementAuthor | Role::WorkplaceUser
            ),
            Role::AccountManager | Role::ElementAuthor => other == Role::WorkplaceUser,
            Role::WorkplaceUser => false,
        }
    }
}

/// A role granted within an organizational unit and its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub org_unit: String,
}

impl RoleGrant {
    pub fn new(role: Role, org_unit: impl AsRef<str>) -> Self {
        Self {
            role,
            org_unit: normalize_org_unit(org_unit.as_ref()),
        }
    }

    /// Whether this grant covers `role` in `org_unit`.
    pub fn covers(&self, role: Role, org_unit: &str) -> bool {
        self.role.implies(role) && normalize_org_unit(org_unit).starts_with(&self.org_unit)
    }
}

/// A user as stored in the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Fully qualified name including the organizational unit prefix.
    pub name: String,
    pub enabled: bool,
    pub roles: Vec<RoleGrant>,
    /// Workplace start project, applied at login for workplace users.
    pub start_project: Option<String>,
    /// Workplace start site, applied at login for workplace users.
    pub start_site: Option<String>,
    /// Landing page after a user switch.
    pub direct_edit_path: Option<String>,
}

impl User {
    /// New enabled user without roles.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            enabled: true,
            roles: Vec::new(),
            start_project: None,
            start_site: None,
            direct_edit_path: None,
        }
    }

    /// Builder-style role grant.
    pub fn with_role(mut self, role: Role, org_unit: &str) -> Self {
        self.roles.push(RoleGrant::new(role, org_unit));
        self
    }

    /// Organizational unit derived from the name.
    pub fn org_unit(&self) -> String {
        org_unit_of(&self.name)
    }

    /// Whether any grant covers `role` in `org_unit`.
    pub fn has_role(&self, role: Role, org_unit: &str) -> bool {
        self.roles.iter().any(|grant| grant.covers(role, org_unit))
    }

    /// Workplace users get their start project/site applied at login.
    pub fn is_workplace_user(&self) -> bool {
        self.has_role(Role::WorkplaceUser, &self.org_unit())
    }
}

/// A project (offline working area or the online project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
        }
    }
}
