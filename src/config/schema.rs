//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the runtime.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the CMS runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Bootstrap identities and context defaults.
    pub identity: IdentityConfig,

    /// Site roots matched from the request host.
    pub sites: SitesConfig,

    /// Session policy and broadcast queue settings.
    pub session: SessionConfig,

    /// Login form and challenge settings.
    pub login: LoginConfig,

    /// Inbound request handling.
    pub http: HttpConfig,

    /// Shutdown sequencing.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently processed requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Bootstrap identities and defaults used to seed execution contexts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Unprivileged identity used for anonymous requests.
    pub guest_user: String,

    /// Unprivileged identity used by static export.
    pub export_user: String,

    /// Privileged identity used for internal and admin operations.
    pub admin_user: String,

    /// Project selected when none is requested.
    pub default_project: String,

    /// Locale name selected when none is requested.
    pub default_locale: String,

    /// Character encoding of generated content.
    pub default_encoding: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            guest_user: "Guest".to_string(),
            export_user: "Export".to_string(),
            admin_user: "Admin".to_string(),
            default_project: "Online".to_string(),
            default_locale: "en".to_string(),
            default_encoding: "UTF-8".to_string(),
        }
    }
}

/// Site configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SitesConfig {
    /// Site root used when no site matches the request host.
    pub default_site_root: String,

    /// Host-to-site mappings.
    pub sites: Vec<SiteConfig>,
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            default_site_root: "/".to_string(),
            sites: Vec::new(),
        }
    }
}

/// A single host-to-site mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Host header to match (case-insensitive, port ignored).
    pub host: String,

    /// VFS subtree the site is rooted at.
    pub site_root: String,
}

/// Session policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Allow at most one authenticated session per user.
    pub single_session: bool,

    /// Inactivity interval after which a session expires, in seconds.
    pub max_inactive_secs: u64,

    /// Capacity of each session's broadcast queue.
    pub broadcast_queue_size: usize,

    /// How long repeating broadcasts keep being redisplayed, in seconds.
    pub broadcast_repeat_ttl_secs: u64,

    /// Interval of the background session validation sweep, in seconds.
    pub validate_interval_secs: u64,

    /// Name of the session cookie.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            single_session: false,
            max_inactive_secs: 1800,
            broadcast_queue_size: 10,
            broadcast_repeat_ttl_secs: 24 * 3600,
            validate_interval_secs: 60,
            cookie_name: "CMS_SESSION".to_string(),
        }
    }
}

/// Login challenge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Login form URI; when absent, challenges use HTTP Basic.
    pub form_uri: Option<String>,

    /// Page used to switch between tools; never triggers a session update.
    pub tool_switch_uri: String,

    /// Realm announced in Basic challenges.
    pub realm: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            form_uri: Some("/system/login/".to_string()),
            tool_switch_uri: "/system/workplace/switch-tool".to_string(),
            realm: "CMS".to_string(),
        }
    }
}

/// Inbound request handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Header set by a trusted reverse proxy carrying the client IP.
    pub trusted_proxy_header: Option<String>,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_header: None,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Shutdown sequencing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time each subsystem is given to stop, in seconds.
    pub step_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [session]
            single_session = true

            [[sites.sites]]
            host = "www.example.org"
            site_root = "/sites/default"
            "#,
        )
        .unwrap();

        assert!(config.session.single_session);
        assert_eq!(config.session.broadcast_queue_size, 10);
        assert_eq!(config.identity.guest_user, "Guest");
        assert_eq!(config.identity.default_project, "Online");
        assert_eq!(config.sites.sites.len(), 1);
        assert_eq!(config.sites.default_site_root, "/");
    }
}
