//! Runtime error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::identity::IdentityError;
use crate::runlevel::RunlevelStage;
use crate::services::LoaderError;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the runtime core.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A subsystem was accessed before its owning runlevel was reached.
    #[error("runtime not initialized: requires {required}, current runlevel is {current}")]
    NotInitialized {
        required: RunlevelStage,
        current: RunlevelStage,
    },

    /// A runlevel transition that skips or reverses stages.
    #[error("illegal runlevel transition from {from} to {to}")]
    IllegalSequence {
        from: RunlevelStage,
        to: RunlevelStage,
    },

    /// A manager failed while the runtime was being initialized.
    #[error("initialization of {component} failed: {source}")]
    Initialization {
        component: String,
        #[source]
        source: BoxError,
    },

    /// Mutation of a frozen context configuration.
    #[error("context configuration is frozen")]
    FrozenConfig,

    /// The caller lacks the privilege for the requested operation.
    #[error("privilege violation: {0}")]
    PrivilegeViolation(String),

    /// Single-session mode rejected a second login.
    #[error("user {user} is already logged in")]
    ConcurrentLogin { user: String },

    /// Identity store lookup or credential failure.
    #[error("authentication failed: {0}")]
    Authentication(#[from] IdentityError),

    /// The operation needs an authenticated session.
    #[error("authentication required")]
    Unauthenticated,

    /// No session exists for the given id.
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// A locale name that cannot be parsed.
    #[error("invalid locale name: {0:?}")]
    InvalidLocale(String),

    /// The resource loader failed.
    #[error(transparent)]
    Resource(#[from] LoaderError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Whether the error is a security failure that should re-challenge the client.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            RuntimeError::PrivilegeViolation(_)
                | RuntimeError::Authentication(_)
                | RuntimeError::Unauthenticated
                | RuntimeError::Resource(LoaderError::Security(_))
        )
    }

    /// HTTP status used when the error reaches the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RuntimeError::NotInitialized { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RuntimeError::PrivilegeViolation(_) => StatusCode::FORBIDDEN,
            RuntimeError::ConcurrentLogin { .. } => StatusCode::CONFLICT,
            RuntimeError::Authentication(_) | RuntimeError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            RuntimeError::Resource(LoaderError::NotFound(_)) => StatusCode::NOT_FOUND,
            RuntimeError::Resource(LoaderError::Security(_)) => StatusCode::FORBIDDEN,
            RuntimeError::Resource(LoaderError::Other(_)) => StatusCode::BAD_GATEWAY,
            RuntimeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RuntimeError::InvalidLocale(_) => StatusCode::BAD_REQUEST,
            RuntimeError::IllegalSequence { .. }
            | RuntimeError::Initialization { .. }
            | RuntimeError::FrozenConfig
            | RuntimeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let message = match &self {
            RuntimeError::ConcurrentLogin { .. } => {
                "You are already logged in from another session".to_string()
            }
            RuntimeError::NotInitialized { .. } => "Service unavailable".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
