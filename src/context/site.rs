//! Site matching.
//!
//! # Design Decisions
//! - Host matching is case-insensitive, ports ignored
//! - Unknown hosts fall back to the default site root

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::config::SitesConfig;

/// Scheme, host and port of a request, used to pick a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteMatcher {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl SiteMatcher {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Parse a `Host` header value (`name[:port]`).
    pub fn from_host_header(scheme: &str, host_header: &str) -> Self {
        match host_header.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') || host.starts_with('[') => {
                match port.parse::<u16>() {
                    Ok(port) => Self::new(scheme, host, Some(port)),
                    Err(_) => Self::new(scheme, host_header, None),
                }
            }
            _ => Self::new(scheme, host_header, None),
        }
    }
}

impl Default for SiteMatcher {
    fn default() -> Self {
        Self::new("http", "localhost", None)
    }
}

impl fmt::Display for SiteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Maps request hosts to site roots.
#[derive(Debug, Clone)]
pub struct SiteResolver {
    by_host: HashMap<String, String>,
    default_site_root: String,
}

impl SiteResolver {
    pub fn from_config(config: &SitesConfig) -> Self {
        let by_host = config
            .sites
            .iter()
            .map(|site| (site.host.to_ascii_lowercase(), site.site_root.clone()))
            .collect();
        Self {
            by_host,
            default_site_root: config.default_site_root.clone(),
        }
    }

    /// Site root for a request.
    pub fn site_root_for(&self, matcher: &SiteMatcher) -> &str {
        self.by_host
            .get(&matcher.host)
            .map(String::as_str)
            .unwrap_or(&self.default_site_root)
    }

    pub fn default_site_root(&self) -> &str {
        &self.default_site_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_host_header_parsing() {
        let m = SiteMatcher::from_host_header("https", "WWW.Example.org:8443");
        assert_eq!(m.host, "www.example.org");
        assert_eq!(m.port, Some(8443));
        assert_eq!(m.to_string(), "https://www.example.org:8443");

        let m = SiteMatcher::from_host_header("http", "example.org");
        assert_eq!(m.port, None);
    }

    #[test]
    fn test_resolver_fallback() {
        let resolver = SiteResolver::from_config(&SitesConfig {
            default_site_root: "/".into(),
            sites: vec![SiteConfig {
                host: "Shop.Example.org".into(),
                site_root: "/sites/shop".into(),
            }],
        });

        let shop = SiteMatcher::from_host_header("http", "shop.example.org:80");
        assert_eq!(resolver.site_root_for(&shop), "/sites/shop");

        let other = SiteMatcher::from_host_header("http", "other.example.org");
        assert_eq!(resolver.site_root_for(&other), "/");
    }
}
