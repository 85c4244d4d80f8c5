//! CMS server runtime.
//!
//! Brings the server from cold start to serving through ordered runlevels and
//! resolves every request to an authenticated, site-scoped, session-bound
//! execution context.

pub mod admin;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod runlevel;
pub mod services;
pub mod session;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use http::HttpServer;
pub use lifecycle::{ServerRuntime, Shutdown};
