//! Per-request entry point.
//!
//! # Responsibilities
//! - Resolve every request to an execution context (session, handler, guest)
//! - Open and close sessions for explicit login and logout
//! - Render through the resource loader and merge state back into the session
//! - Challenge guests that hit protected resources
//!
//! # Design Decisions
//! - Collaborator failures before rendering degrade to the guest context
//! - A concurrent-login rejection writes nothing and serves the guest
//! - Session updates are skipped for the tool-switch page, which changes
//!   project and site only for its own rendering

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RuntimeConfig;
use crate::context::{ExecutionContext, ExecutionContextFactory};
use crate::dispatch::auth::{workplace_settings, AuthorizationHandler, PrivilegedLogin};
use crate::dispatch::request::{RequestInfo, RequestSeed};
use crate::error::{RuntimeError, RuntimeResult};
use crate::identity::IdentityStore;
use crate::observability::metrics;
use crate::services::{EventSink, LoaderError, Rendered, ResourceLoader, RuntimeEvent};
use crate::session::{
    BroadcastView, HttpSessionStore, SessionId, SessionRecord, SessionRegistry,
    WORKPLACE_SETTINGS_ATTR,
};

/// How a request was resolved.
#[derive(Debug)]
pub enum DispatchOutcome {
    Authenticated {
        context: ExecutionContext,
        session_id: SessionId,
        /// The session was opened by this request.
        opened: bool,
    },
    GuestServed {
        context: ExecutionContext,
        /// Login form URL to send the guest to when access is denied.
        challenge: Option<String>,
    },
}

impl DispatchOutcome {
    pub fn context(&self) -> &ExecutionContext {
        match self {
            DispatchOutcome::Authenticated { context, .. } => context,
            DispatchOutcome::GuestServed { context, .. } => context,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            DispatchOutcome::Authenticated { session_id, .. } => Some(*session_id),
            DispatchOutcome::GuestServed { .. } => None,
        }
    }
}

/// How a denied guest is asked to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Redirect(String),
    Basic { realm: String },
}

/// Result of serving one request.
#[derive(Debug)]
pub enum Dispatched {
    Rendered {
        rendered: Rendered,
        session: Option<SessionId>,
        opened: bool,
    },
    Challenge(Challenge),
}

/// Collaborators the dispatcher calls into.
pub struct DispatchCollaborators {
    pub store: Arc<dyn IdentityStore>,
    pub registry: Arc<SessionRegistry>,
    pub http_sessions: Arc<HttpSessionStore>,
    pub handler: Arc<dyn AuthorizationHandler>,
    pub loader: Arc<dyn ResourceLoader>,
    pub events: Arc<dyn EventSink>,
}

pub struct RequestDispatchCore {
    pub(super) factory: ExecutionContextFactory,
    pub(super) store: Arc<dyn IdentityStore>,
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) http_sessions: Arc<HttpSessionStore>,
    pub(super) handler: Arc<dyn AuthorizationHandler>,
    pub(super) login: PrivilegedLogin,
    pub(super) loader: Arc<dyn ResourceLoader>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) seed: RequestSeed,
    pub(super) max_inactive: Duration,
    pub(super) repeat_ttl: Duration,
    pub(super) tool_switch_uri: String,
    pub(super) realm: String,
}

impl RequestDispatchCore {
    pub fn new(
        config: &RuntimeConfig,
        factory: ExecutionContextFactory,
        deps: DispatchCollaborators,
    ) -> Self {
        let seed = RequestSeed::new(config);
        let login = PrivilegedLogin::new(
            deps.store.clone(),
            factory.clone(),
            seed.clone(),
            deps.events.clone(),
        );
        Self {
            factory,
            store: deps.store,
            registry: deps.registry,
            http_sessions: deps.http_sessions,
            handler: deps.handler,
            login,
            loader: deps.loader,
            events: deps.events,
            seed,
            max_inactive: Duration::from_secs(config.session.max_inactive_secs),
            repeat_ttl: Duration::from_secs(config.session.broadcast_repeat_ttl_secs),
            tool_switch_uri: config.login.tool_switch_uri.clone(),
            realm: config.login.realm.clone(),
        }
    }

    pub fn factory(&self) -> &ExecutionContextFactory {
        &self.factory
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn http_sessions(&self) -> &Arc<HttpSessionStore> {
        &self.http_sessions
    }

    /// Resolve `request` to a context without rendering.
    pub async fn resolve(&self, request: &RequestInfo) -> RuntimeResult<DispatchOutcome> {
        if let Some(outcome) = self.lookup_session(request).await {
            return Ok(outcome);
        }

        match self.handler.authorize(request, &self.login).await {
            Ok(Some(context)) => match self.open_session(&context, request.session_id()).await {
                Ok(session_id) => {
                    return Ok(DispatchOutcome::Authenticated {
                        context,
                        session_id,
                        opened: true,
                    })
                }
                Err(e) => tracing::warn!(
                    user = %context.user().name,
                    error = %e,
                    "Session not opened, serving as guest"
                ),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(
                path = %request.path,
                error = %e,
                "Authorization failed, serving as guest"
            ),
        }

        let context = self.guest_context(request).await?;
        Ok(DispatchOutcome::GuestServed {
            context,
            challenge: self.handler.login_form_url(request),
        })
    }

    /// Resolve, render and update the session.
    pub async fn serve(&self, request: &RequestInfo) -> RuntimeResult<Dispatched> {
        let started = Instant::now();
        let result = match self.resolve(request).await {
            Ok(outcome) => self.render(outcome).await,
            Err(e) => Err(e),
        };

        let label = match &result {
            Ok(Dispatched::Rendered { session: Some(_), .. }) => "authenticated",
            Ok(Dispatched::Rendered { session: None, .. }) => "guest",
            Ok(Dispatched::Challenge(_)) => "challenged",
            Err(_) => "error",
        };
        metrics::record_dispatch(label, started.elapsed());
        result
    }

    /// Context and id of the session carried by `request`.
    pub async fn authenticated(
        &self,
        request: &RequestInfo,
    ) -> RuntimeResult<(ExecutionContext, SessionId)> {
        match self.lookup_session(request).await {
            Some(DispatchOutcome::Authenticated {
                context,
                session_id,
                ..
            }) => Ok((context, session_id)),
            _ => Err(RuntimeError::Unauthenticated),
        }
    }

    /// Log in with credentials and bind a fresh session.
    pub async fn login(
        &self,
        name: &str,
        password: &str,
        request: &RequestInfo,
    ) -> RuntimeResult<(ExecutionContext, SessionId)> {
        let user = match self
            .store
            .login_user(name, password, &self.seed.client_ip(request))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                metrics::record_login("failed");
                tracing::info!(user = %name, error = %e, "Login failed");
                return Err(e.into());
            }
        };

        let context = self.login.login(user, request).await?;
        let session_id = self.open_session(&context, request.session_id()).await?;
        Ok((context, session_id))
    }

    /// Invalidate the HTTP session; its record goes with it.
    pub async fn logout(&self, id: &SessionId) -> RuntimeResult<()> {
        let user_name = self.registry.get(id).map(|record| record.user_name);
        if !self.http_sessions.invalidate(id).await {
            return Err(RuntimeError::SessionNotFound(id.to_string()));
        }
        if let Some(user_name) = user_name {
            self.events.publish(RuntimeEvent::Logout {
                session: *id,
                user_name,
            });
        }
        Ok(())
    }

    /// Pending broadcasts of a session, as HTML.
    pub fn take_broadcasts(&self, id: &SessionId) -> RuntimeResult<Vec<BroadcastView>> {
        let record = self
            .registry
            .get(id)
            .filter(|_| self.http_sessions.touch(id))
            .ok_or_else(|| RuntimeError::SessionNotFound(id.to_string()))?;
        Ok(record
            .queue
            .take_for_display(Utc::now(), self.repeat_ttl)
            .iter()
            .map(|message| message.view())
            .collect())
    }

    /// Bind `context` to a new session and register it.
    ///
    /// A session carried into the login is invalidated first; its token never
    /// carries over to the authenticated identity.
    pub async fn open_session(
        &self,
        context: &ExecutionContext,
        carried: Option<SessionId>,
    ) -> RuntimeResult<SessionId> {
        if let Some(carried) = carried {
            if self.http_sessions.invalidate(&carried).await {
                tracing::debug!(session = %carried, "Carried session replaced at login");
            }
        }
        let id = self.http_sessions.create();

        let record = SessionRecord::new(
            id,
            context,
            self.max_inactive,
            self.registry.queue_capacity(),
        );
        if let Err(e) = self.registry.put(record).await {
            if matches!(e, RuntimeError::ConcurrentLogin { .. }) {
                metrics::record_login("rejected");
            }
            self.http_sessions.invalidate(&id).await;
            return Err(e);
        }

        if let Some(settings) = workplace_settings(context) {
            self.http_sessions
                .set_attribute(&id, WORKPLACE_SETTINGS_ATTR, settings)?;
        }
        tracing::debug!(session = %id, user = %context.user().name, "Session bound");
        Ok(id)
    }

    async fn lookup_session(&self, request: &RequestInfo) -> Option<DispatchOutcome> {
        let id = request.session_id()?;
        if !self.http_sessions.touch(&id) {
            return None;
        }
        let record = self.registry.get(&id)?;

        let context = match self.seed.info_for(request) {
            Ok(info) => self.factory.build_for_session(&record, &info).await,
            Err(e) => Err(e),
        };
        match context {
            Ok(context) => {
                self.registry.touch(&id);
                Some(DispatchOutcome::Authenticated {
                    context,
                    session_id: id,
                    opened: false,
                })
            }
            Err(e) => {
                tracing::warn!(session = %id, user = %record.user_name, error = %e, "Session context unavailable");
                None
            }
        }
    }

    async fn guest_context(&self, request: &RequestInfo) -> RuntimeResult<ExecutionContext> {
        let info = self.seed.info_for(request)?;
        self.factory.build(None, &info).await
    }

    async fn render(&self, outcome: DispatchOutcome) -> RuntimeResult<Dispatched> {
        match outcome {
            DispatchOutcome::Authenticated {
                mut context,
                session_id,
                opened,
            } => {
                let rendered = self.loader.render(&mut context).await?;
                self.update_session(&context, &session_id);
                Ok(Dispatched::Rendered {
                    rendered,
                    session: Some(session_id),
                    opened,
                })
            }
            DispatchOutcome::GuestServed {
                mut context,
                challenge,
            } => match self.loader.render(&mut context).await {
                Ok(rendered) => Ok(Dispatched::Rendered {
                    rendered,
                    session: None,
                    opened: false,
                }),
                Err(LoaderError::Security(resource)) => {
                    tracing::debug!(resource = %resource, "Guest denied, requesting authorization");
                    Ok(Dispatched::Challenge(match challenge {
                        Some(url) => Challenge::Redirect(url),
                        None => Challenge::Basic {
                            realm: self.realm.clone(),
                        },
                    }))
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Merge project, site and org unit of `context` into the session.
    fn update_session(&self, context: &ExecutionContext, id: &SessionId) -> bool {
        if !context.is_update_session_enabled() || context.requested_uri() == self.tool_switch_uri
        {
            return false;
        }
        self.registry.update(
            id,
            context.project().id,
            context.site_root(),
            context.org_unit(),
        )
    }
}
