//! In-memory identity store.
//!
//! Backs the standalone server binary and the test suites. Passwords are kept
//! as given; credential hashing belongs to a real store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::IdentityConfig;
use crate::identity::{IdentityError, IdentityStore, Project, ProjectId, Role, User, UserId};

/// Thread-safe identity store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: DashMap<String, User>,
    user_names: DashMap<UserId, String>,
    passwords: DashMap<String, String>,
    projects: DashMap<String, Project>,
    project_names: DashMap<ProjectId, String>,
    unavailable: AtomicBool,
}

impl InMemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the bootstrap identities of `config`.
    ///
    /// The admin user is granted `RootAdmin` on the root organizational unit
    /// and can log in with `admin_password`. Projects `Online` (or the
    /// configured default) and `Offline` exist.
    pub fn bootstrap(config: &IdentityConfig, admin_password: &str) -> Self {
        let store = Self::new();
        store.add_user(User::new(config.guest_user.clone()), None);
        store.add_user(User::new(config.export_user.clone()), None);
        store.add_user(
            User::new(config.admin_user.clone()).with_role(Role::RootAdmin, "/"),
            Some(admin_password),
        );
        store.add_project(Project::new(config.default_project.clone()));
        if config.default_project != "Offline" {
            store.add_project(Project::new("Offline"));
        }
        store
    }

    /// Insert or replace a user; `None` disables password login.
    pub fn add_user(&self, user: User, password: Option<&str>) -> User {
        if let Some(password) = password {
            self.passwords.insert(user.name.clone(), password.to_string());
        }
        self.user_names.insert(user.id, user.name.clone());
        self.users.insert(user.name.clone(), user.clone());
        user
    }

    /// Insert or replace a project.
    pub fn add_project(&self, project: Project) -> Project {
        self.project_names.insert(project.id, project.name.clone());
        self.projects.insert(project.name.clone(), project.clone());
        project
    }

    /// Enable or disable a user.
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        if let Some(mut user) = self.users.get_mut(name) {
            user.enabled = enabled;
        }
    }

    /// Simulate an outage: every lookup fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(IdentityError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn read_user(&self, name: &str) -> Result<User, IdentityError> {
        self.check_available()?;
        self.users
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| IdentityError::UserNotFound(name.to_string()))
    }

    async fn read_user_by_id(&self, id: UserId) -> Result<User, IdentityError> {
        self.check_available()?;
        let name = self
            .user_names
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| IdentityError::UserNotFound(id.to_string()))?;
        self.read_user(&name).await
    }

    async fn read_project(&self, name: &str) -> Result<Project, IdentityError> {
        self.check_available()?;
        self.projects
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| IdentityError::ProjectNotFound(name.to_string()))
    }

    async fn read_project_by_id(&self, id: ProjectId) -> Result<Project, IdentityError> {
        self.check_available()?;
        let name = self
            .project_names
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| IdentityError::ProjectNotFound(id.to_string()))?;
        self.read_project(&name).await
    }

    async fn login_user(
        &self,
        name: &str,
        password: &str,
        remote_addr: &str,
    ) -> Result<User, IdentityError> {
        self.check_available()?;
        let matches = self
            .passwords
            .get(name)
            .map(|stored| stored.value() == password)
            .unwrap_or(false);
        if !matches {
            tracing::debug!(user = %name, remote_addr = %remote_addr, "Rejected credentials");
            return Err(IdentityError::InvalidCredentials(name.to_string()));
        }

        let user = self.read_user(name).await?;
        if !user.enabled {
            return Err(IdentityError::Disabled(name.to_string()));
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_identities() {
        let store = InMemoryIdentityStore::bootstrap(&IdentityConfig::default(), "secret");
        let guest = store.read_user("Guest").await.unwrap();
        assert!(guest.roles.is_empty());

        let admin = store.login_user("Admin", "secret", "127.0.0.1").await.unwrap();
        assert!(admin.has_role(Role::RootAdmin, "/"));

        let online = store.read_project("Online").await.unwrap();
        assert_eq!(store.read_project_by_id(online.id).await.unwrap(), online);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let store = InMemoryIdentityStore::new();
        store.add_user(User::new("bob"), Some("pw"));

        assert_eq!(
            store.login_user("bob", "wrong", "::1").await,
            Err(IdentityError::InvalidCredentials("bob".into()))
        );
        assert_eq!(
            store.login_user("Guest", "", "::1").await,
            Err(IdentityError::InvalidCredentials("Guest".into()))
        );

        store.set_enabled("bob", false);
        assert_eq!(
            store.login_user("bob", "pw", "::1").await,
            Err(IdentityError::Disabled("bob".into()))
        );

        store.set_available(false);
        assert!(matches!(
            store.read_user("bob").await,
            Err(IdentityError::Unavailable(_))
        ));
    }
}
