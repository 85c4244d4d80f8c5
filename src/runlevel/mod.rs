//! Runlevel subsystem.
//!
//! # Data Flow
//! ```text
//! OFFLINE(0) → CORE_OBJECT(1) → INITIALIZING(2) → SHELL_ACCESS(3) → SERVLET_ACCESS(4)
//!      ▲                                                                   │
//!      └──────────────────────── shutdown (from any stage) ◀───────────────┘
//! ```
//!
//! # Design Decisions
//! - One stage variable, read lock-free by every accessor
//! - Transitions serialized under a single async lock
//! - Forward transitions advance by exactly one stage

pub mod controller;
pub mod stage;

pub use controller::{RunlevelController, TransitionGuard};
pub use stage::RunlevelStage;
