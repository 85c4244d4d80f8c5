//! Execution context construction.
//!
//! # Responsibilities
//! - Build execution contexts from [`ContextInfo`] values
//! - Refuse impersonation of privileged identities without root admin rights
//! - Resolve user and project references through the identity store
//!
//! # Design Decisions
//! - The input ContextInfo is never mutated
//! - Copies and session rebuilds skip the privilege check; the identity
//!   they carry was established by an earlier, checked build

use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::context::execution::ExecutionParts;
use crate::context::{ContextInfo, ExecutionContext, RequestTime};
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::{IdentityStore, Role, ROOT_ORG_UNIT};
use crate::session::SessionRecord;

/// Builds [`ExecutionContext`]s.
#[derive(Clone)]
pub struct ExecutionContextFactory {
    store: Arc<dyn IdentityStore>,
    identity: IdentityConfig,
}

impl ExecutionContextFactory {
    pub fn new(store: Arc<dyn IdentityStore>, identity: IdentityConfig) -> Self {
        Self { store, identity }
    }

    /// Identity defaults used to seed new contexts.
    pub fn identity_config(&self) -> &IdentityConfig {
        &self.identity
    }

    /// A fresh ContextInfo with the configured defaults.
    pub fn default_info(&self) -> ContextInfo {
        ContextInfo::new(&self.identity)
    }

    /// Whether `name` is one of the unprivileged bootstrap identities.
    pub fn is_unprivileged_identity(&self, name: &str) -> bool {
        name == self.identity.guest_user || name == self.identity.export_user
    }

    /// Build a context for `info`.
    ///
    /// Without an `admin` context holding `RootAdmin`, only the guest and
    /// export identities may be requested.
    pub async fn build(
        &self,
        admin: Option<&ExecutionContext>,
        info: &ContextInfo,
    ) -> RuntimeResult<ExecutionContext> {
        let privileged = admin
            .map(|ctx| ctx.has_role(Role::RootAdmin, ROOT_ORG_UNIT))
            .unwrap_or(false);

        if !privileged && !self.is_unprivileged_identity(info.user_name()) {
            tracing::warn!(
                requested_user = %info.user_name(),
                caller = ?admin.map(|ctx| ctx.user().name.as_str()),
                "Rejected context creation without root admin privileges"
            );
            return Err(RuntimeError::PrivilegeViolation(format!(
                "creating a context for user {:?} requires root administrator privileges",
                info.user_name()
            )));
        }

        self.build_unchecked(info).await
    }

    /// Rebuild `context` with the request time reset to now.
    pub async fn copy(&self, context: &ExecutionContext) -> RuntimeResult<ExecutionContext> {
        let mut info = ContextInfo::from_context(context);
        info.set_request_time(RequestTime::Current)?;
        let mut copy = self.build_unchecked(&info).await?;
        copy.set_update_session_enabled(context.is_update_session_enabled());
        Ok(copy)
    }

    /// Build the context of an authenticated session.
    ///
    /// `request` supplies the per-request parameters (URI, locale, remote
    /// address); user, project, site and organizational unit come from the
    /// session record.
    pub async fn build_for_session(
        &self,
        record: &SessionRecord,
        request: &ContextInfo,
    ) -> RuntimeResult<ExecutionContext> {
        let user = self.store.read_user_by_id(record.user_id).await?;
        let project = self.store.read_project_by_id(record.project_id).await?;

        let mut info = request.copy();
        info.set_user(user)?;
        info.set_project(project)?;
        info.set_site_root(record.site_root.clone())?;
        info.set_org_unit(record.org_unit.clone())?;
        self.build_unchecked(&info).await
    }

    /// Context of the configured admin identity, for internal operations.
    pub async fn admin_context(&self) -> RuntimeResult<ExecutionContext> {
        let info = self.default_info().with_user_name(self.identity.admin_user.clone())?;
        self.build_unchecked(&info).await
    }

    pub(crate) async fn build_unchecked(&self, info: &ContextInfo) -> RuntimeResult<ExecutionContext> {
        let user = match info.user() {
            Some(user) => user.clone(),
            None => self.store.read_user(info.user_name()).await?,
        };
        let project = match info.project() {
            Some(project) => project.clone(),
            None => self.store.read_project(info.project_name()).await?,
        };

        Ok(ExecutionContext::from_parts(ExecutionParts {
            user,
            project,
            site_root: info.site_root().to_string(),
            requested_uri: info.requested_uri().to_string(),
            request_matcher: info.request_matcher().clone(),
            locale: info.locale().clone(),
            encoding: info.encoding().to_string(),
            remote_addr: info.remote_addr().to_string(),
            request_time: info.request_time(),
            org_unit: info.org_unit().to_string(),
            secure: info.is_secure(),
            detail_resource: info.detail_resource().map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityError, InMemoryIdentityStore, User};

    fn factory() -> (ExecutionContextFactory, Arc<InMemoryIdentityStore>) {
        let identity = IdentityConfig::default();
        let store = Arc::new(InMemoryIdentityStore::bootstrap(&identity, "admin"));
        store.add_user(User::new("/ou1/bob").with_role(Role::ElementAuthor, "/ou1/"), Some("pw"));
        (ExecutionContextFactory::new(store.clone(), identity), store)
    }

    #[tokio::test]
    async fn test_guest_and_export_without_admin() {
        let (factory, _) = factory();
        let guest = factory.build(None, &factory.default_info()).await.unwrap();
        assert_eq!(guest.user().name, "Guest");
        assert_eq!(guest.project().name, "Online");

        let info = factory.default_info().with_user_name("Export").unwrap();
        let export = factory.build(None, &info).await.unwrap();
        assert_eq!(export.user().name, "Export");
    }

    #[tokio::test]
    async fn test_impersonation_requires_root_admin() {
        let (factory, _) = factory();
        let info = factory.default_info().with_user_name("/ou1/bob").unwrap();

        assert!(matches!(
            factory.build(None, &info).await,
            Err(RuntimeError::PrivilegeViolation(_))
        ));

        let guest = factory.build(None, &factory.default_info()).await.unwrap();
        assert!(matches!(
            factory.build(Some(&guest), &info).await,
            Err(RuntimeError::PrivilegeViolation(_))
        ));

        let admin = factory.admin_context().await.unwrap();
        let bob = factory.build(Some(&admin), &info).await.unwrap();
        assert_eq!(bob.user().name, "/ou1/bob");
        assert_eq!(bob.org_unit(), "/ou1/");
    }

    #[tokio::test]
    async fn test_build_does_not_mutate_input() {
        let (factory, _) = factory();
        let mut info = factory.default_info();
        info.set_locale_name("en_US").unwrap();
        info.freeze();

        let context = factory.build(None, &info).await.unwrap();
        assert_eq!(context.locale().to_string(), "en_US");
        assert!(info.is_frozen());
        assert!(info.user().is_none());
    }

    #[tokio::test]
    async fn test_unknown_project_is_authentication_failure() {
        let (factory, _) = factory();
        let info = factory.default_info().with_project_name("Nope").unwrap();
        assert!(matches!(
            factory.build(None, &info).await,
            Err(RuntimeError::Authentication(IdentityError::ProjectNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_copy_resets_request_time() {
        let (factory, _) = factory();
        let mut info = factory.default_info();
        info.set_request_time(RequestTime::At(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH))
            .unwrap();
        let original = factory.build(None, &info).await.unwrap();
        assert_eq!(original.request_time(), chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);

        let copy = factory.copy(&original).await.unwrap();
        assert!(copy.request_time() > original.request_time());
        assert_eq!(copy.user(), original.user());
        assert_eq!(copy.site_root(), original.site_root());
    }
}
