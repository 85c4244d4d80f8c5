//! Request middleware.

pub mod runlevel_gate;

pub use runlevel_gate::runlevel_gate;
