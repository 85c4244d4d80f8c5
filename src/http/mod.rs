//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID, RequestInfo extraction)
//!     → middleware/runlevel_gate.rs (503 before SERVLET_ACCESS)
//!     → handlers.rs (login, logout, broadcasts, switch user, dispatch)
//!     → response.rs (cookies, challenges, rendered bodies)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::Inbound;
pub use server::{AppState, HttpServer};
