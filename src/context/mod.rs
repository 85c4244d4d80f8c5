//! Execution context subsystem.
//!
//! # Data Flow
//! ```text
//! request / session record / template
//!     → info.rs (ContextInfo, freezable parameters)
//!     → factory.rs (privilege check, identity resolution)
//!     → execution.rs (ExecutionContext, owned by one operation)
//! ```
//!
//! # Design Decisions
//! - Contexts are never shared between requests
//! - Locale and locale name are derived from each other, never set apart
//! - Site matching lives next to the context it seeds

pub mod execution;
pub mod factory;
pub mod info;
pub mod locale;
pub mod site;

pub use execution::ExecutionContext;
pub use factory::ExecutionContextFactory;
pub use info::{ContextInfo, RequestTime};
pub use locale::Locale;
pub use site::{SiteMatcher, SiteResolver};
