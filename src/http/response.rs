//! Response construction.
//!
//! # Responsibilities
//! - Turn rendered resources into HTTP responses
//! - Issue and clear the session cookie
//! - Answer login challenges (redirect or `WWW-Authenticate: Basic`)

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::Challenge;
use crate::services::Rendered;
use crate::session::SessionId;

/// `Set-Cookie` value binding the client to `id`.
pub fn session_cookie(name: &str, id: SessionId, secure: bool) -> String {
    let mut cookie = format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the session cookie.
pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Cookie not representable as header"),
    }
}

pub fn rendered(rendered: Rendered) -> Response {
    let mut response = Response::new(Body::from(rendered.body));
    *response.status_mut() = rendered.status;
    if let Ok(content_type) = HeaderValue::from_str(&rendered.content_type) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

pub fn challenge(challenge: Challenge) -> Response {
    match challenge {
        Challenge::Redirect(url) => match HeaderValue::from_str(&url) {
            Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
            Err(_) => StatusCode::UNAUTHORIZED.into_response(),
        },
        Challenge::Basic { realm } => {
            let header = format!("Basic realm=\"{}\"", realm.replace('"', ""));
            match HeaderValue::from_str(&header) {
                Ok(value) => (
                    StatusCode::UNAUTHORIZED,
                    [(WWW_AUTHENTICATE, value)],
                    "Authentication required",
                )
                    .into_response(),
                Err(_) => StatusCode::UNAUTHORIZED.into_response(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_flags() {
        let id = SessionId::new();
        let cookie = session_cookie("CMS_SESSION", id, true);
        assert!(cookie.starts_with(&format!("CMS_SESSION={id};")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!session_cookie("CMS_SESSION", id, false).contains("Secure"));
        assert!(expired_cookie("CMS_SESSION").contains("Max-Age=0"));
    }

    #[test]
    fn test_challenges() {
        let response = challenge(Challenge::Redirect("/system/login/?x=1".into()));
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/system/login/?x=1");

        let response = challenge(Challenge::Basic { realm: "CMS".into() });
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Basic realm=\"CMS\"");
    }

    #[test]
    fn test_rendered_keeps_status_and_type() {
        let response = rendered(Rendered {
            status: StatusCode::NOT_FOUND,
            content_type: "text/html".into(),
            body: b"<p>gone</p>".to_vec(),
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
    }
}
