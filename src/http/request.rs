//! Request extraction and request ids.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) unless the client sent one
//! - Echo the request ID on the response
//! - Turn request parts into the dispatcher's [`RequestInfo`]
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The peer address comes from `ConnectInfo`; it is absent in unit tests

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderName;
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::dispatch::RequestInfo;
use crate::error::RuntimeError;
use crate::http::server::AppState;
use crate::observability::tracing::REQUEST_ID_HEADER;

/// Layer assigning a request id to every request that lacks one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeRequestUuid)
}

/// Layer copying the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}

/// The inbound request as seen by dispatch.
#[derive(Debug, Clone)]
pub struct Inbound(pub RequestInfo);

impl FromRequestParts<AppState> for Inbound {
    type Rejection = RuntimeError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let config = state.runtime.config()?;
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(RequestInfo::from_parts(
            parts,
            peer,
            &config.session.cookie_name,
        )))
    }
}
