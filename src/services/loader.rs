//! Resource loading after dispatch.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::error::BoxError;
use crate::identity::Role;

/// A rendered response body.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Rendered {
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json".to_string(),
            body: value.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The current user may not read the resource.
    #[error("access denied to {0}")]
    Security(String),

    #[error("resource loader failed: {0}")]
    Other(#[source] BoxError),
}

/// Renders the resource requested by an execution context.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// The loader may adjust `context`, e.g. disable session updates.
    async fn render(&self, context: &mut ExecutionContext) -> Result<Rendered, LoaderError>;
}

/// Answers every request with a JSON description of its context.
///
/// Paths under a protected prefix require the workplace role.
#[derive(Debug, Clone)]
pub struct ContextEchoLoader {
    protected_prefixes: Vec<String>,
}

impl ContextEchoLoader {
    pub fn new(protected_prefixes: Vec<String>) -> Self {
        Self { protected_prefixes }
    }
}

impl Default for ContextEchoLoader {
    fn default() -> Self {
        Self::new(vec!["/system/workplace/".to_string()])
    }
}

#[async_trait]
impl ResourceLoader for ContextEchoLoader {
    async fn render(&self, context: &mut ExecutionContext) -> Result<Rendered, LoaderError> {
        let uri = context.requested_uri().to_string();
        let protected = self
            .protected_prefixes
            .iter()
            .any(|prefix| uri.starts_with(prefix.as_str()));
        if protected && !context.has_role(Role::WorkplaceUser, context.org_unit()) {
            return Err(LoaderError::Security(uri));
        }

        Ok(Rendered::json(&json!({
            "uri": uri,
            "user": context.user().name,
            "project": context.project().name,
            "site_root": context.site_root(),
            "org_unit": context.org_unit(),
            "locale": context.locale().to_string(),
            "remote_addr": context.remote_addr(),
        })))
    }
}
