//! Authorization handoff.
//!
//! # Responsibilities
//! - Let a pluggable handler authenticate requests without a session
//! - Turn an authenticated user into an execution context (privileged login)
//! - Supply the login form URL used to challenge guests
//!
//! # Design Decisions
//! - The handler never builds contexts itself; it goes through
//!   [`PrivilegedLogin`], which re-checks the user and fires the login event
//! - Workplace start settings are applied here so every login path agrees

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::{ExecutionContext, ExecutionContextFactory};
use crate::dispatch::request::{RequestInfo, RequestSeed};
use crate::error::RuntimeResult;
use crate::identity::{IdentityError, IdentityStore, User};
use crate::observability::metrics;
use crate::services::{EventSink, RuntimeEvent};

/// Query parameter carrying the resource a guest was denied.
pub const REQUESTED_RESOURCE_PARAM: &str = "requestedResource";

/// Authenticates requests that carry no session.
#[async_trait]
pub trait AuthorizationHandler: Send + Sync {
    /// `Ok(None)` hands the request to the guest fallback.
    async fn authorize(
        &self,
        request: &RequestInfo,
        login: &PrivilegedLogin,
    ) -> RuntimeResult<Option<ExecutionContext>>;

    /// Where to send a guest that needs to log in. `None` means HTTP Basic.
    fn login_form_url(&self, request: &RequestInfo) -> Option<String>;
}

/// Builds the context of a freshly authenticated user.
#[derive(Clone)]
pub struct PrivilegedLogin {
    store: Arc<dyn IdentityStore>,
    factory: ExecutionContextFactory,
    seed: RequestSeed,
    events: Arc<dyn EventSink>,
}

impl PrivilegedLogin {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        factory: ExecutionContextFactory,
        seed: RequestSeed,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            factory,
            seed,
            events,
        }
    }

    /// Context for `user`, who has just proven their identity.
    pub async fn login(&self, user: User, request: &RequestInfo) -> RuntimeResult<ExecutionContext> {
        let user = self.store.read_user_by_id(user.id).await?;
        if !user.enabled {
            metrics::record_login("rejected");
            return Err(IdentityError::Disabled(user.name).into());
        }

        let mut info = self.seed.info_for(request)?;
        info.set_user(user)?;
        let mut context = self.factory.build_unchecked(&info).await?;
        self.apply_start_settings(&mut context).await;

        self.events.publish(RuntimeEvent::Login {
            user: context.user().id,
            user_name: context.user().name.clone(),
            remote_addr: context.remote_addr().to_string(),
        });
        metrics::record_login("success");
        Ok(context)
    }

    /// Move a workplace user to their start project and site.
    pub async fn apply_start_settings(&self, context: &mut ExecutionContext) {
        if !context.user().is_workplace_user() {
            return;
        }
        if let Some(name) = context.user().start_project.clone() {
            match self.store.read_project(&name).await {
                Ok(project) => context.set_project(project),
                Err(e) => tracing::warn!(
                    user = %context.user().name,
                    project = %name,
                    error = %e,
                    "Start project not available, keeping default"
                ),
            }
        }
        if let Some(site) = context.user().start_site.clone() {
            context.set_site_root(site);
        }
    }
}

/// Cached workplace settings of a logged in user, if they have any.
pub fn workplace_settings(context: &ExecutionContext) -> Option<Value> {
    let user = context.user();
    if !user.is_workplace_user() {
        return None;
    }
    Some(json!({
        "start_project": user.start_project,
        "start_site": user.start_site,
        "project": context.project().name,
        "site_root": context.site_root(),
    }))
}

/// `Authorization: Basic` handler.
pub struct BasicAuthorizationHandler {
    store: Arc<dyn IdentityStore>,
    seed: RequestSeed,
    form_uri: Option<String>,
}

impl BasicAuthorizationHandler {
    pub fn new(store: Arc<dyn IdentityStore>, seed: RequestSeed, form_uri: Option<String>) -> Self {
        Self {
            store,
            seed,
            form_uri,
        }
    }
}

#[async_trait]
impl AuthorizationHandler for BasicAuthorizationHandler {
    async fn authorize(
        &self,
        request: &RequestInfo,
        login: &PrivilegedLogin,
    ) -> RuntimeResult<Option<ExecutionContext>> {
        let Some((name, password)) = request
            .header(AUTHORIZATION.as_str())
            .and_then(decode_basic_credentials)
        else {
            return Ok(None);
        };

        let user = match self
            .store
            .login_user(&name, &password, &self.seed.client_ip(request))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                metrics::record_login("failed");
                return Err(e.into());
            }
        };
        login.login(user, request).await.map(Some)
    }

    fn login_form_url(&self, request: &RequestInfo) -> Option<String> {
        let form = self.form_uri.as_deref()?;
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(REQUESTED_RESOURCE_PARAM, &request.requested_resource())
            .finish();
        let separator = if form.contains('?') { '&' } else { '?' };
        Some(format!("{form}{separator}{query}"))
    }
}

/// Decode `Basic <base64(name:password)>`.
pub fn decode_basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::error::RuntimeError;
    use crate::identity::{InMemoryIdentityStore, Project, Role};
    use crate::services::TracingEventSink;

    struct Fixture {
        store: Arc<InMemoryIdentityStore>,
        login: PrivilegedLogin,
        handler: BasicAuthorizationHandler,
    }

    fn fixture(form_uri: Option<&str>) -> Fixture {
        let config = RuntimeConfig::default();
        let store = Arc::new(InMemoryIdentityStore::bootstrap(&config.identity, "admin"));
        store.add_project(Project::new("Offline Work"));
        let mut editor = User::new("/ou1/editor").with_role(Role::ElementAuthor, "/ou1/");
        editor.start_project = Some("Offline Work".into());
        editor.start_site = Some("/sites/editorial/".into());
        store.add_user(editor, Some("secret"));

        let seed = RequestSeed::new(&config);
        let factory = ExecutionContextFactory::new(store.clone(), config.identity.clone());
        Fixture {
            login: PrivilegedLogin::new(
                store.clone(),
                factory,
                seed.clone(),
                Arc::new(TracingEventSink),
            ),
            handler: BasicAuthorizationHandler::new(
                store.clone(),
                seed,
                form_uri.map(str::to_string),
            ),
            store,
        }
    }

    fn basic(name: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{name}:{password}")))
    }

    #[test]
    fn test_decode_basic_credentials() {
        assert_eq!(
            decode_basic_credentials(&basic("bob", "p:w")),
            Some(("bob".to_string(), "p:w".to_string()))
        );
        assert_eq!(decode_basic_credentials("Bearer abc"), None);
        assert_eq!(decode_basic_credentials("Basic !!!"), None);
    }

    #[tokio::test]
    async fn test_basic_login_applies_start_settings() {
        let f = fixture(None);
        let request = RequestInfo::new("/index.html")
            .with_header("authorization", &basic("/ou1/editor", "secret"));

        let context = f
            .handler
            .authorize(&request, &f.login)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.user().name, "/ou1/editor");
        assert_eq!(context.project().name, "Offline Work");
        assert_eq!(context.site_root(), "/sites/editorial/");
        assert_eq!(context.org_unit(), "/ou1/");

        let settings = workplace_settings(&context).unwrap();
        assert_eq!(settings["project"], "Offline Work");
    }

    #[tokio::test]
    async fn test_missing_header_falls_through() {
        let f = fixture(None);
        let result = f.handler.authorize(&RequestInfo::new("/"), &f.login).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_bad_password_and_disabled_user() {
        let f = fixture(None);
        let request = RequestInfo::new("/").with_header("authorization", &basic("/ou1/editor", "nope"));
        assert!(matches!(
            f.handler.authorize(&request, &f.login).await,
            Err(RuntimeError::Authentication(IdentityError::InvalidCredentials(_)))
        ));

        let editor = f.store.read_user("/ou1/editor").await.unwrap();
        f.store.set_enabled("/ou1/editor", false);
        assert!(matches!(
            f.login.login(editor, &RequestInfo::new("/")).await,
            Err(RuntimeError::Authentication(IdentityError::Disabled(_)))
        ));
    }

    #[test]
    fn test_login_form_url_carries_requested_resource() {
        let f = fixture(Some("/system/login/"));
        let mut request = RequestInfo::new("/private/report.html");
        request.query = Some("year=2024".into());
        assert_eq!(
            f.handler.login_form_url(&request).unwrap(),
            "/system/login/?requestedResource=%2Fprivate%2Freport.html%3Fyear%3D2024"
        );

        let f = fixture(None);
        assert!(f.handler.login_form_url(&request).is_none());
    }
}
