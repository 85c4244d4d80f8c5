//! Runlevel gate.
//! Rejects requests until the runtime has reached SERVLET_ACCESS.

use axum::{
    body::Body,
    extract::State,
    http::{header::RETRY_AFTER, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::server::AppState;
use crate::runlevel::RunlevelStage;

pub async fn runlevel_gate(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let stage = state.runtime.stage();
    if stage < RunlevelStage::ServletAccess {
        tracing::debug!(stage = %stage, path = %request.uri().path(), "Rejecting request, not serving yet");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(RETRY_AFTER, HeaderValue::from_static("5"))],
            "Service unavailable",
        )
            .into_response();
    }
    next.run(request).await
}
