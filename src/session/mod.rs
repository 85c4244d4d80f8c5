//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! login
//!     → http.rs (HttpSessionStore::create, cookie token)
//!     → record.rs (SessionRecord bound to the token)
//!     → registry.rs (put, single-session check)
//!
//! every request
//!     → registry.rs (get, update after rendering)
//!
//! logout / timeout / kill
//!     → http.rs (invalidate / purge_expired)
//!     → registry.rs (session_destroyed → remove → lock release)
//!
//! broadcast
//!     → registry.rs (fan-out over a key snapshot)
//!     → broadcast.rs (bounded queue per record)
//!     → sanitize.rs (HTML for readers)
//! ```
//!
//! # Design Decisions
//! - HTTP sessions and session records are separate layers joined by id
//! - Counters follow HTTP session callbacks, not registry size
//! - Queues are shared by `Arc` so a record update keeps pending messages

pub mod broadcast;
pub mod http;
pub mod record;
pub mod registry;
pub mod sanitize;

pub use broadcast::{BroadcastMessage, BroadcastQueue, BroadcastView, ContentMode};
pub use http::{HttpSessionListener, HttpSessionStore, SessionLiveness, WORKPLACE_SETTINGS_ATTR};
pub use record::{SessionId, SessionRecord, SessionSummary};
pub use registry::{BroadcastTarget, SessionRegistry};
