//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cms_runlevel` (gauge): current runlevel, 0 to 4
//! - `cms_sessions_created_total` (counter): HTTP sessions ever opened
//! - `cms_sessions_active` (gauge): open HTTP sessions
//! - `cms_logins_total` (counter): logins by outcome
//! - `cms_dispatch_total` (counter): dispatched requests by outcome
//! - `cms_dispatch_duration_seconds` (histogram): dispatch latency
//! - `cms_broadcast_deliveries_total` (counter): messages queued to sessions
//!
//! # Design Decisions
//! - Recording functions wrap the macros so names live in one place
//! - Outcome labels are a small fixed set

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::runlevel::RunlevelStage;

pub const RUNLEVEL: &str = "cms_runlevel";
pub const SESSIONS_CREATED_TOTAL: &str = "cms_sessions_created_total";
pub const SESSIONS_ACTIVE: &str = "cms_sessions_active";
pub const LOGINS_TOTAL: &str = "cms_logins_total";
pub const DISPATCH_TOTAL: &str = "cms_dispatch_total";
pub const DISPATCH_DURATION_SECONDS: &str = "cms_dispatch_duration_seconds";
pub const BROADCAST_DELIVERIES_TOTAL: &str = "cms_broadcast_deliveries_total";

/// Start the Prometheus scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_runlevel(stage: RunlevelStage) {
    gauge!(RUNLEVEL).set(f64::from(stage.level()));
}

pub fn record_session_created() {
    counter!(SESSIONS_CREATED_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub fn record_session_destroyed() {
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// `outcome` is one of `success`, `rejected`, `failed`.
pub fn record_login(outcome: &'static str) {
    counter!(LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

/// `outcome` is one of `authenticated`, `guest`, `challenged`, `error`.
pub fn record_dispatch(outcome: &'static str, elapsed: Duration) {
    counter!(DISPATCH_TOTAL, "outcome" => outcome).increment(1);
    histogram!(DISPATCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_broadcast(delivered: usize) {
    counter!(BROADCAST_DELIVERIES_TOTAL).increment(delivered as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed_snake_case() {
        for name in [
            RUNLEVEL,
            SESSIONS_CREATED_TOTAL,
            SESSIONS_ACTIVE,
            LOGINS_TOTAL,
            DISPATCH_TOTAL,
            DISPATCH_DURATION_SECONDS,
            BROADCAST_DELIVERIES_TOTAL,
        ] {
            assert!(name.starts_with("cms_"));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_runlevel(RunlevelStage::ServletAccess);
        record_dispatch("guest", Duration::from_millis(3));
        record_broadcast(0);
    }
}
