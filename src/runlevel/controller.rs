//! Guarded runlevel transitions.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{RuntimeError, RuntimeResult};
use crate::observability::metrics;
use crate::runlevel::RunlevelStage;

/// Owns the runtime's single stage variable.
///
/// Reads are lock-free; every transition goes through a [`TransitionGuard`]
/// so that a whole startup or shutdown sequence runs under one lock.
#[derive(Debug)]
pub struct RunlevelController {
    stage: AtomicU8,
    transitions: Mutex<()>,
}

impl RunlevelController {
    /// Create a controller at [`RunlevelStage::Offline`].
    pub fn new() -> Self {
        Self {
            stage: AtomicU8::new(RunlevelStage::Offline as u8),
            transitions: Mutex::new(()),
        }
    }

    /// Current stage.
    pub fn current(&self) -> RunlevelStage {
        RunlevelStage::from(self.stage.load(Ordering::Acquire))
    }

    /// Fail with `NotInitialized` unless the current stage is at least `required`.
    pub fn require_at_least(&self, required: RunlevelStage) -> RuntimeResult<()> {
        let current = self.current();
        if current < required {
            return Err(RuntimeError::NotInitialized { required, current });
        }
        Ok(())
    }

    /// Acquire the transition lock.
    ///
    /// Held for the duration of a startup or shutdown sequence; concurrent
    /// callers wait here rather than running the sequence twice.
    pub async fn begin(&self) -> TransitionGuard<'_> {
        TransitionGuard {
            controller: self,
            _lock: self.transitions.lock().await,
        }
    }

    /// Perform a single transition under the lock.
    pub async fn transition_to(&self, target: RunlevelStage) -> RuntimeResult<RunlevelStage> {
        self.begin().await.advance(target)
    }
}

impl Default for RunlevelController {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the caller holds the transition lock.
pub struct TransitionGuard<'a> {
    controller: &'a RunlevelController,
    _lock: MutexGuard<'a, ()>,
}

impl TransitionGuard<'_> {
    /// Current stage, as seen under the lock.
    pub fn current(&self) -> RunlevelStage {
        self.controller.current()
    }

    /// Move to `target`.
    ///
    /// Allowed: exactly one stage forward, or `Offline` from any other stage.
    /// Returns the previous stage.
    pub fn advance(&mut self, target: RunlevelStage) -> RuntimeResult<RunlevelStage> {
        let from = self.current();
        let allowed = if target == RunlevelStage::Offline {
            from != RunlevelStage::Offline
        } else {
            from.next() == Some(target)
        };

        if !allowed {
            tracing::error!(from = %from, to = %target, "Illegal runlevel transition");
            return Err(RuntimeError::IllegalSequence { from, to: target });
        }

        self.controller
            .stage
            .store(target as u8, Ordering::Release);
        metrics::record_runlevel(target);
        tracing::info!(from = %from, to = %target, "Runlevel changed");
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunlevelStage; 5] = [
        RunlevelStage::Offline,
        RunlevelStage::CoreObject,
        RunlevelStage::Initializing,
        RunlevelStage::ShellAccess,
        RunlevelStage::ServletAccess,
    ];

    async fn controller_at(stage: RunlevelStage) -> RunlevelController {
        let controller = RunlevelController::new();
        let mut guard = controller.begin().await;
        for level in 1..=stage.level() {
            guard.advance(RunlevelStage::from(level)).unwrap();
        }
        drop(guard);
        controller
    }

    #[tokio::test]
    async fn test_forward_by_one_only() {
        for from in ALL {
            for to in ALL {
                let controller = controller_at(from).await;
                let result = controller.transition_to(to).await;
                let expected_ok = if to == RunlevelStage::Offline {
                    from != RunlevelStage::Offline
                } else {
                    to.level() == from.level() + 1
                };
                assert_eq!(result.is_ok(), expected_ok, "{from} -> {to}");
                if expected_ok {
                    assert_eq!(controller.current(), to);
                } else {
                    assert_eq!(controller.current(), from);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_require_at_least() {
        let controller = controller_at(RunlevelStage::Initializing).await;
        assert!(controller.require_at_least(RunlevelStage::CoreObject).is_ok());
        assert!(controller.require_at_least(RunlevelStage::Initializing).is_ok());

        match controller.require_at_least(RunlevelStage::ServletAccess) {
            Err(RuntimeError::NotInitialized { required, current }) => {
                assert_eq!(required, RunlevelStage::ServletAccess);
                assert_eq!(current, RunlevelStage::Initializing);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_guard_serializes_transitions() {
        let controller = std::sync::Arc::new(RunlevelController::new());
        let mut guard = controller.begin().await;
        guard.advance(RunlevelStage::CoreObject).unwrap();

        let other = controller.clone();
        let waiter = tokio::spawn(async move {
            other.transition_to(RunlevelStage::Initializing).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(controller.current(), RunlevelStage::CoreObject);

        drop(guard);
        let previous = waiter.await.unwrap().unwrap();
        assert_eq!(previous, RunlevelStage::CoreObject);
        assert_eq!(controller.current(), RunlevelStage::Initializing);
    }
}
