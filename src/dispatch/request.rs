//! Inbound request view used by dispatch.
//!
//! # Design Decisions
//! - Decoupled from axum's request type so dispatch can run without a body
//! - Client IP: trusted proxy header, then first `X-Forwarded-For` hop,
//!   then the socket peer

use axum::http::header::{ACCEPT_LANGUAGE, COOKIE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;

use crate::config::{IdentityConfig, RuntimeConfig};
use crate::context::{ContextInfo, Locale, SiteMatcher, SiteResolver};
use crate::error::RuntimeResult;
use crate::session::SessionId;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// What dispatch needs to know about an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub session_token: Option<String>,
    pub headers: HeaderMap,
    pub peer: Option<SocketAddr>,
    pub path: String,
    pub query: Option<String>,
}

impl RequestInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Build from request parts, reading the session token from `cookie_name`.
    pub fn from_parts(parts: &Parts, peer: Option<SocketAddr>, cookie_name: &str) -> Self {
        Self {
            session_token: cookie_value(&parts.headers, cookie_name),
            headers: parts.headers.clone(),
            peer,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_session(mut self, id: SessionId) -> Self {
        self.session_token = Some(id.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The session token, if it is well formed.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_token.as_deref().and_then(|token| token.parse().ok())
    }

    pub fn scheme(&self) -> &str {
        match self.header(X_FORWARDED_PROTO) {
            Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
            _ => "http",
        }
    }

    pub fn is_secure(&self) -> bool {
        self.scheme() == "https"
    }

    pub fn host(&self) -> Option<&str> {
        self.header(HOST.as_str())
    }

    pub fn site_matcher(&self) -> SiteMatcher {
        match self.host() {
            Some(host) => SiteMatcher::from_host_header(self.scheme(), host),
            None => SiteMatcher::default(),
        }
    }

    /// Path plus query string, as requested.
    pub fn requested_resource(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// First language of `Accept-Language` that parses as a locale.
    pub fn preferred_locale(&self) -> Option<Locale> {
        self.header(ACCEPT_LANGUAGE.as_str())?
            .split(',')
            .filter_map(|entry| entry.split(';').next())
            .find_map(|tag| tag.trim().parse().ok())
    }

    /// Address of the client as far as it can be trusted.
    pub fn client_ip(&self, trusted_proxy_header: Option<&str>) -> String {
        if let Some(ip) = trusted_proxy_header.and_then(|name| self.non_empty_header(name)) {
            return ip.to_string();
        }
        if let Some(first) = self
            .non_empty_header(X_FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return first.to_string();
        }
        self.peer
            .map(|peer| peer.ip().to_string())
            .unwrap_or_else(|| crate::context::info::DEFAULT_REMOTE_ADDR.to_string())
    }

    fn non_empty_header(&self, name: &str) -> Option<&str> {
        self.header(name).map(str::trim).filter(|value| !value.is_empty())
    }
}

/// Seeds the per-request part of a [`ContextInfo`].
#[derive(Debug, Clone)]
pub struct RequestSeed {
    identity: IdentityConfig,
    sites: SiteResolver,
    trusted_proxy_header: Option<String>,
}

impl RequestSeed {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            identity: config.identity.clone(),
            sites: SiteResolver::from_config(&config.sites),
            trusted_proxy_header: config.http.trusted_proxy_header.clone(),
        }
    }

    pub fn client_ip(&self, request: &RequestInfo) -> String {
        request.client_ip(self.trusted_proxy_header.as_deref())
    }

    /// Guest defaults bound to the site, client and locale of `request`.
    pub fn info_for(&self, request: &RequestInfo) -> RuntimeResult<ContextInfo> {
        let matcher = request.site_matcher();
        let mut info = ContextInfo::new(&self.identity);
        info.set_requested_uri(request.path.clone())?;
        info.set_site_root(self.sites.site_root_for(&matcher).to_string())?;
        info.set_request_matcher(matcher)?;
        info.set_remote_addr(self.client_ip(request))?;
        info.set_secure(request.is_secure())?;
        if let Some(locale) = request.preferred_locale() {
            info.set_locale(locale)?;
        }
        Ok(info)
    }
}

/// Value of cookie `name` in the `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    #[test]
    fn test_client_ip_precedence() {
        let request = RequestInfo::new("/")
            .with_peer(peer())
            .with_header("x-real-ip", "203.0.113.9")
            .with_header(X_FORWARDED_FOR, "198.51.100.1, 10.0.0.1");
        assert_eq!(request.client_ip(Some("x-real-ip")), "203.0.113.9");
        assert_eq!(request.client_ip(None), "198.51.100.1");

        let request = RequestInfo::new("/").with_peer(peer());
        assert_eq!(request.client_ip(Some("x-real-ip")), "10.0.0.7");
        assert_eq!(RequestInfo::new("/").client_ip(None), "127.0.0.1");
    }

    #[test]
    fn test_cookie_lookup() {
        let id = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; CMS_SESSION={id}; lang=de")).unwrap(),
        );
        assert_eq!(cookie_value(&headers, "CMS_SESSION"), Some(id.to_string()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_site_and_locale_hints() {
        let request = RequestInfo::new("/index.html")
            .with_header("host", "Docs.Example.org:8080")
            .with_header(X_FORWARDED_PROTO, "https")
            .with_header("accept-language", "de-DE;q=0.9, en;q=0.8");
        let matcher = request.site_matcher();
        assert_eq!(matcher.host, "docs.example.org");
        assert_eq!(matcher.scheme, "https");
        assert!(request.is_secure());
        assert_eq!(request.preferred_locale().unwrap().to_string(), "de_DE");
    }

    #[test]
    fn test_seed_binds_site_by_host() {
        let mut config = RuntimeConfig::default();
        config.sites.sites.push(crate::config::SiteConfig {
            host: "docs.example.org".into(),
            site_root: "/sites/docs/".into(),
        });
        let seed = RequestSeed::new(&config);

        let request = RequestInfo::new("/guide/")
            .with_header("host", "docs.example.org")
            .with_peer(peer());
        let info = seed.info_for(&request).unwrap();
        assert_eq!(info.site_root(), "/sites/docs/");
        assert_eq!(info.requested_uri(), "/guide/");
        assert_eq!(info.remote_addr(), "10.0.0.7");
        assert_eq!(info.user_name(), "Guest");

        let other = seed.info_for(&RequestInfo::new("/")).unwrap();
        assert_eq!(other.site_root(), "/");
    }
}
