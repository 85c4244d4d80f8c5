//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, ConfigSource)
//!     → validation.rs (semantic checks)
//!     → RuntimeConfig (validated, immutable)
//!     → loaded while entering INITIALIZING, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigError, ConfigSource, FileConfigSource, StaticConfigSource};
pub use schema::{
    AdminConfig, HttpConfig, IdentityConfig, ListenerConfig, LoginConfig, ObservabilityConfig,
    RuntimeConfig, SessionConfig, ShutdownConfig, SiteConfig, SitesConfig,
};
