//! Identity subsystem: users, projects, roles and the persistent identity store.
//!
//! # Data Flow
//! ```text
//! ContextInfo (names) ──▶ IdentityStore::read_user / read_project ──▶ ExecutionContext
//! Login form / Basic  ──▶ IdentityStore::login_user ──▶ PrivilegedLogin
//! ```
//!
//! # Design Decisions
//! - Store lookups are async; the store is an external collaborator
//! - Roles are granted per organizational unit and cover descendants
//! - Store failures surface as authentication failures, never internal faults

pub mod memory;
pub mod model;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryIdentityStore;
pub use model::{org_unit_of, Project, ProjectId, Role, RoleGrant, User, UserId, ROOT_ORG_UNIT};

/// Errors reported by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("unknown user {0:?}")]
    UserNotFound(String),

    #[error("unknown project {0:?}")]
    ProjectNotFound(String),

    #[error("invalid credentials for user {0:?}")]
    InvalidCredentials(String),

    #[error("user {0:?} is disabled")]
    Disabled(String),

    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent store of users and projects.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Read a user by fully qualified name.
    async fn read_user(&self, name: &str) -> Result<User, IdentityError>;

    /// Read a user by id.
    async fn read_user_by_id(&self, id: UserId) -> Result<User, IdentityError>;

    /// Read a project by name.
    async fn read_project(&self, name: &str) -> Result<Project, IdentityError>;

    /// Read a project by id.
    async fn read_project_by_id(&self, id: ProjectId) -> Result<Project, IdentityError>;

    /// Verify credentials and return the user.
    async fn login_user(
        &self,
        name: &str,
        password: &str,
        remote_addr: &str,
    ) -> Result<User, IdentityError>;
}
