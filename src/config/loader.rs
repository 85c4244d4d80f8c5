//! Configuration loading.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::RuntimeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Where the runtime obtains its configuration during initialization.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    /// Load and validate the configuration.
    async fn load(&self) -> Result<RuntimeConfig, ConfigError>;
}

/// Reads a TOML file.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_config(&content)
    }
}

/// Hands out a configuration built in code.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: RuntimeConfig,
}

impl StaticConfigSource {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nbind_address = \"127.0.0.1:9000\"\n\n[session]\nsingle_session = true"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert!(config.session.single_session);
    }

    #[test]
    fn test_parse_error_and_validation_error() {
        assert!(matches!(
            parse_config("[session\n"),
            Err(ConfigError::Parse(_))
        ));

        let err = parse_config("[session]\nmax_inactive_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("session.max_inactive_secs"));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileConfigSource::new("/definitely/not/here.toml");
        assert!(matches!(source.load().await, Err(ConfigError::Io(_))));
    }
}
