//! Shutdown coordination.
//!
//! # Responsibilities
//! - Broadcast the shutdown signal to long-running tasks
//! - Tear down dependent subsystems in a fixed order
//!
//! # Design Decisions
//! - Every step gets the same bounded time budget
//! - A failing or timed-out step is logged and the next one still runs

use futures_util::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::BoxError;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a shutdown sequence.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ShutdownReport {
    pub completed: Vec<String>,
    pub failed: Vec<StepFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub reason: String,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered list of teardown steps.
pub struct ShutdownSequencer {
    step_timeout: Duration,
    steps: Vec<(String, BoxFuture<'static, Result<(), BoxError>>)>,
}

impl ShutdownSequencer {
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            step_timeout,
            steps: Vec::new(),
        }
    }

    /// Append a step; steps run in the order they were added.
    pub fn step<F>(mut self, name: impl Into<String>, step: F) -> Self
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.steps.push((name.into(), Box::pin(step)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        for (name, step) in self.steps {
            tracing::debug!(step = %name, "Shutdown step starting");
            match tokio::time::timeout(self.step_timeout, step).await {
                Ok(Ok(())) => {
                    tracing::info!(step = %name, "Shutdown step completed");
                    report.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::error!(step = %name, error = %e, "Shutdown step failed");
                    report.failed.push(StepFailure {
                        step: name,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    tracing::error!(
                        step = %name,
                        timeout_secs = self.step_timeout.as_secs_f64(),
                        "Shutdown step timed out"
                    );
                    report.failed.push(StepFailure {
                        step: name,
                        reason: "timed out".to_string(),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_steps_run_in_order_despite_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str, fail: bool| {
            let order = order.clone();
            async move {
                order.lock().push(name);
                if fail {
                    Err::<(), BoxError>("disk full".into())
                } else {
                    Ok(())
                }
            }
        };

        let report = ShutdownSequencer::new(Duration::from_secs(1))
            .step("publish", record("publish", false))
            .step("sessions", record("sessions", true))
            .step("search", record("search", false))
            .run()
            .await;

        assert_eq!(*order.lock(), vec!["publish", "sessions", "search"]);
        assert_eq!(report.completed, vec!["publish", "search"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].step, "sessions");
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_step_times_out() {
        let report = ShutdownSequencer::new(Duration::from_secs(2))
            .step("hung", async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .step("after", async { Ok(()) })
            .run()
            .await;
        assert_eq!(report.failed[0].reason, "timed out");
        assert_eq!(report.completed, vec!["after"]);
    }

    #[tokio::test]
    async fn test_shutdown_signal_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);
        shutdown.trigger();
        assert!(rx.recv().await.is_ok());
    }
}
