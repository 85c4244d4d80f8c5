use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeResult;
use crate::http::server::AppState;
use crate::session::{BroadcastMessage, BroadcastTarget, ContentMode, SessionId, SessionSummary};

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub runlevel: u8,
    pub stage: String,
    pub sessions_active: u64,
    pub sessions_created_total: u64,
    pub sessions_registered: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KillUserRequest {
    pub user: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KillUserResponse {
    pub killed: Vec<SessionId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub content: String,
    #[serde(default)]
    pub mode: ContentMode,
    /// Keep showing the message on every poll until it expires.
    #[serde(default)]
    pub repeat: bool,
    /// Restrict delivery to one session.
    pub session: Option<SessionId>,
    /// Restrict delivery to the sessions of one user.
    pub user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let stage = state.runtime.stage();
    let (active, created, registered) = match state.runtime.registry() {
        Ok(registry) => (registry.active_count(), registry.created_total(), registry.len()),
        Err(_) => (0, 0, 0),
    };
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        runlevel: stage.level(),
        stage: stage.to_string(),
        sessions_active: active,
        sessions_created_total: created,
        sessions_registered: registered,
    })
}

pub async fn get_sessions(State(state): State<AppState>) -> RuntimeResult<Json<Vec<SessionSummary>>> {
    let registry = state.runtime.registry()?;
    let mut sessions: Vec<SessionSummary> = registry
        .all()
        .iter()
        .map(|record| record.summary())
        .collect();
    sessions.sort_by(|a, b| a.user_name.cmp(&b.user_name));
    Ok(Json(sessions))
}

pub async fn kill_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> RuntimeResult<Json<SessionSummary>> {
    let admin = state.runtime.factory()?.admin_context().await?;
    let record = state.runtime.registry()?.kill_session(&admin, &id).await?;
    state.runtime.http_sessions()?.invalidate(&id).await;
    Ok(Json(record.summary()))
}

pub async fn kill_user(
    State(state): State<AppState>,
    Json(body): Json<KillUserRequest>,
) -> RuntimeResult<Json<KillUserResponse>> {
    let admin = state.runtime.factory()?.admin_context().await?;
    let user = state.runtime.identity_store().read_user(&body.user).await?;
    let killed = state.runtime.registry()?.kill_all(&admin, user.id).await?;

    let http_sessions = state.runtime.http_sessions()?;
    for id in &killed {
        http_sessions.invalidate(id).await;
    }
    Ok(Json(KillUserResponse { killed }))
}

pub async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> RuntimeResult<Json<BroadcastResponse>> {
    let admin = state.runtime.factory()?.admin_context().await?;
    let target = match (body.session, &body.user) {
        (Some(session), _) => BroadcastTarget::Session(session),
        (None, Some(name)) => {
            BroadcastTarget::User(state.runtime.identity_store().read_user(name).await?.id)
        }
        (None, None) => BroadcastTarget::All,
    };

    let mut message = BroadcastMessage::new(Some(admin.user().name.clone()), body.content, body.mode);
    if body.repeat {
        message = message.repeating();
    }
    let delivered = state.runtime.registry()?.broadcast(&message, target);
    tracing::info!(delivered, sender = %admin.user().name, "Broadcast sent");
    Ok(Json(BroadcastResponse { delivered }))
}
