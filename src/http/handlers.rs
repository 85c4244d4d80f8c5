//! Request handlers for the public surface.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use crate::dispatch::{Dispatched, SwitchResponse};
use crate::error::{RuntimeError, RuntimeResult};
use crate::http::request::Inbound;
use crate::http::response;
use crate::http::server::AppState;
use crate::session::{BroadcastView, SessionId};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// Where to go after a successful login.
    #[serde(rename = "requestedResource")]
    pub requested_resource: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: String,
    pub session: SessionId,
    pub project: String,
    pub site_root: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchUserRequest {
    pub user: String,
}

/// Only same-site absolute paths are followed after login.
///
/// Browsers read `\` as `/`, so `/\host` leaves the site just like `//host`.
fn local_target(target: Option<String>) -> Option<String> {
    target.filter(|path| {
        let mut chars = path.chars();
        chars.next() == Some('/')
            && !matches!(chars.next(), Some('/' | '\\'))
            && !path.chars().any(|c| c == '\\' || c.is_control())
    })
}

/// POST /system/login
pub async fn login(
    State(state): State<AppState>,
    Inbound(request): Inbound,
    Form(form): Form<LoginForm>,
) -> RuntimeResult<Response> {
    let config = state.runtime.config()?;
    let dispatcher = state.runtime.dispatcher()?;
    let (context, session) = dispatcher
        .login(&form.username, &form.password, &request)
        .await?;

    let mut response = match local_target(form.requested_resource) {
        Some(target) => Redirect::to(&target).into_response(),
        None => Json(LoginResponse {
            user: context.user().name.clone(),
            session,
            project: context.project().name.clone(),
            site_root: context.site_root().to_string(),
        })
        .into_response(),
    };
    response::set_cookie(
        &mut response,
        &response::session_cookie(&config.session.cookie_name, session, request.is_secure()),
    );
    Ok(response)
}

/// POST /system/logout
pub async fn logout(
    State(state): State<AppState>,
    Inbound(request): Inbound,
) -> RuntimeResult<Response> {
    let config = state.runtime.config()?;
    let dispatcher = state.runtime.dispatcher()?;
    let session = request.session_id().ok_or(RuntimeError::Unauthenticated)?;
    dispatcher.logout(&session).await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response::set_cookie(&mut response, &response::expired_cookie(&config.session.cookie_name));
    Ok(response)
}

/// GET /system/broadcasts
pub async fn broadcasts(
    State(state): State<AppState>,
    Inbound(request): Inbound,
) -> RuntimeResult<Json<Vec<BroadcastView>>> {
    let dispatcher = state.runtime.dispatcher()?;
    let session = request.session_id().ok_or(RuntimeError::Unauthenticated)?;
    Ok(Json(dispatcher.take_broadcasts(&session)?))
}

/// POST /system/switch-user
pub async fn switch_user(
    State(state): State<AppState>,
    Inbound(request): Inbound,
    Json(body): Json<SwitchUserRequest>,
) -> RuntimeResult<Json<SwitchResponse>> {
    let dispatcher = state.runtime.dispatcher()?;
    let (caller, session) = dispatcher.authenticated(&request).await?;
    let outcome = dispatcher.switch_user(&caller, session, &body.user).await?;
    Ok(Json(SwitchResponse::from(&outcome)))
}

/// Everything else: resolve the context and render the resource.
pub async fn dispatch(
    State(state): State<AppState>,
    Inbound(request): Inbound,
) -> RuntimeResult<Response> {
    let config = state.runtime.config()?;
    let dispatcher = state.runtime.dispatcher()?;

    match dispatcher.serve(&request).await? {
        Dispatched::Rendered {
            rendered,
            session,
            opened,
        } => {
            let mut response = response::rendered(rendered);
            if let (Some(session), true) = (session, opened) {
                response::set_cookie(
                    &mut response,
                    &response::session_cookie(
                        &config.session.cookie_name,
                        session,
                        request.is_secure(),
                    ),
                );
            }
            Ok(response)
        }
        Dispatched::Challenge(challenge) => Ok(response::challenge(challenge)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_local_targets_are_followed() {
        assert_eq!(local_target(Some("/news/".into())), Some("/news/".into()));
        assert_eq!(local_target(Some("//evil.example/".into())), None);
        assert_eq!(local_target(Some("https://evil.example/".into())), None);
        assert_eq!(local_target(Some("/\\evil.example/".into())), None);
        assert_eq!(local_target(Some("/news/\\..\\admin".into())), None);
        assert_eq!(local_target(Some("/\tevil.example/".into())), None);
        assert_eq!(local_target(Some("/news/\r\nSet-Cookie:x".into())), None);
        assert_eq!(local_target(Some("/".into())), Some("/".into()));
        assert_eq!(local_target(None), None);
    }
}
