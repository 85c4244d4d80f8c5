//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, queue capacity > 0)
//! - Check identities and site roots are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::RuntimeConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be an absolute path, got {value:?}")]
    NotAbsolute { field: &'static str, value: String },

    #[error("identity.{0} must differ from identity.admin_user")]
    PrivilegedBootstrapIdentity(&'static str),

    #[error("observability.log_format must be \"pretty\" or \"json\", got {0:?}")]
    LogFormat(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::LogFormat(
            config.observability.log_format.clone(),
        ));
    }

    for (field, value) in [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("session.max_inactive_secs", config.session.max_inactive_secs),
        ("session.broadcast_queue_size", config.session.broadcast_queue_size as u64),
        ("session.validate_interval_secs", config.session.validate_interval_secs),
        ("shutdown.step_timeout_secs", config.shutdown.step_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let identity = &config.identity;
    for (field, value) in [
        ("identity.guest_user", &identity.guest_user),
        ("identity.export_user", &identity.export_user),
        ("identity.admin_user", &identity.admin_user),
        ("identity.default_project", &identity.default_project),
        ("session.cookie_name", &config.session.cookie_name),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::Empty { field });
        }
    }
    if identity.guest_user == identity.admin_user {
        errors.push(ValidationError::PrivilegedBootstrapIdentity("guest_user"));
    }
    if identity.export_user == identity.admin_user {
        errors.push(ValidationError::PrivilegedBootstrapIdentity("export_user"));
    }

    let mut paths = vec![
        ("sites.default_site_root", config.sites.default_site_root.clone()),
        ("login.tool_switch_uri", config.login.tool_switch_uri.clone()),
    ];
    if let Some(form) = &config.login.form_uri {
        paths.push(("login.form_uri", form.clone()));
    }
    paths.extend(
        config
            .sites
            .sites
            .iter()
            .map(|site| ("sites.sites.site_root", site.site_root.clone())),
    );
    for (field, value) in paths {
        if !value.starts_with('/') {
            errors.push(ValidationError::NotAbsolute { field, value });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RuntimeConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RuntimeConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.session.broadcast_queue_size = 0;
        config.identity.guest_user = "Admin".into();
        config.sites.default_site_root = "sites/default".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero {
            field: "session.broadcast_queue_size"
        }));
        assert!(errors.contains(&ValidationError::PrivilegedBootstrapIdentity(
            "guest_user"
        )));
    }
}
