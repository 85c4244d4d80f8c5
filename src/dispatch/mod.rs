//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestInfo (request.rs)
//!     → SessionLookup: cookie → live HTTP session → SessionRecord → context
//!     → AuthorizationHandoff (auth.rs): handler + PrivilegedLogin → new session
//!     → GuestFallback: guest context for the matched site, login challenge
//!     → ResourceLoader::render
//!     → SessionUpdate: project / site / org unit merged into the record
//! ```
//!
//! # Design Decisions
//! - The dispatcher owns no HTTP types beyond headers; handlers translate
//!   its results into responses
//! - User switching keeps the session id so the client cookie stays valid

pub mod auth;
pub mod dispatcher;
pub mod request;
pub mod switch;

pub use auth::{
    decode_basic_credentials, AuthorizationHandler, BasicAuthorizationHandler, PrivilegedLogin,
};
pub use dispatcher::{
    Challenge, DispatchCollaborators, DispatchOutcome, Dispatched, RequestDispatchCore,
};
pub use request::{RequestInfo, RequestSeed};
pub use switch::{SwitchOutcome, SwitchResponse};
