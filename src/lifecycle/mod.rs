//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, runtime.rs):
//!     Load config → Initialize subsystems → Build core state
//!         → Replay locks, start publishing, start sweeper → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop sweeper → Stop publishing
//!         → Invalidate sessions → Subsystems in reverse → OFFLINE
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Every shutdown step has a deadline; a stuck step never blocks the rest

pub mod runtime;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use runtime::{CoreState, RuntimeServices, ServerRuntime};
pub use shutdown::{Shutdown, ShutdownReport, ShutdownSequencer, StepFailure};
pub use signals::shutdown_signal;
