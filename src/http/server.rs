//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (runlevel gate, timeouts, limits, request ID, tracing)
//! - Mount the admin API when enabled
//! - Bind server to listener and stop on the shutdown signal

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::RuntimeConfig;
use crate::http::handlers;
use crate::http::middleware::runlevel_gate;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::ServerRuntime;
use crate::observability::tracing::RequestSpan;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ServerRuntime>,
}

/// HTTP front end of the runtime.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build the server for a runtime whose configuration is loaded.
    pub fn new(runtime: Arc<ServerRuntime>, config: &RuntimeConfig) -> Self {
        let state = AppState { runtime };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &RuntimeConfig, state: AppState) -> Router {
        let public = Router::new()
            .route("/system/login", post(handlers::login))
            .route("/system/logout", post(handlers::logout))
            .route("/system/broadcasts", get(handlers::broadcasts))
            .route("/system/switch-user", post(handlers::switch_user))
            .fallback(handlers::dispatch)
            .layer(middleware::from_fn_with_state(state.clone(), runlevel_gate))
            .with_state(state.clone());

        let app = if config.admin.enabled {
            public.merge(setup_admin_router(state))
        } else {
            public
        };

        app.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(config.http.max_body_size))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
