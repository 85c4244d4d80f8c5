//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all subsystems in registration order
//! - Restore persisted locks and start publishing on reaching shell access
//! - Start the background session sweeper
//!
//! # Design Decisions
//! - Fail fast: any initialization error aborts the sequence and shuts down
//!   the subsystems that were already up
//! - Subsystems initialize in order, not concurrently
//! - Each failure names the component that caused it

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigSource, RuntimeConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::services::{LockManager, PublishService, Subsystem};
use crate::session::{HttpSessionStore, SessionRegistry};

/// Load the configuration from `source`.
pub async fn load_configuration(source: &dyn ConfigSource) -> RuntimeResult<RuntimeConfig> {
    tracing::info!(source = %source.describe(), "Loading configuration");
    source
        .load()
        .await
        .map_err(|e| RuntimeError::Initialization {
            component: "configuration".to_string(),
            source: Box::new(e),
        })
}

/// Initialize `subsystems` one after another.
///
/// When one fails, the ones already initialized are shut down again in
/// reverse order before the error is returned.
pub async fn initialize_subsystems(
    subsystems: &[Arc<dyn Subsystem>],
    config: &RuntimeConfig,
) -> RuntimeResult<()> {
    for (index, subsystem) in subsystems.iter().enumerate() {
        tracing::debug!(subsystem = subsystem.name(), "Initializing subsystem");
        if let Err(source) = subsystem.initialize(config).await {
            let step_timeout = Duration::from_secs(config.shutdown.step_timeout_secs);
            roll_back(&subsystems[..index], step_timeout).await;
            return Err(RuntimeError::Initialization {
                component: subsystem.name().to_string(),
                source,
            });
        }
        tracing::info!(subsystem = subsystem.name(), "Subsystem initialized");
    }
    Ok(())
}

async fn roll_back(initialized: &[Arc<dyn Subsystem>], step_timeout: Duration) {
    for subsystem in initialized.iter().rev() {
        match tokio::time::timeout(step_timeout, subsystem.shutdown()).await {
            Ok(Ok(())) => {
                tracing::info!(subsystem = subsystem.name(), "Subsystem rolled back")
            }
            Ok(Err(e)) => tracing::error!(
                subsystem = subsystem.name(),
                error = %e,
                "Subsystem rollback failed"
            ),
            Err(_) => tracing::error!(subsystem = subsystem.name(), "Subsystem rollback timed out"),
        }
    }
}

/// Work done on first arrival at shell access.
pub async fn enter_shell_access(
    lock_manager: &dyn LockManager,
    publish: &dyn PublishService,
) -> RuntimeResult<()> {
    let restored = lock_manager
        .replay_persisted_locks()
        .await
        .map_err(|source| RuntimeError::Initialization {
            component: "lock manager".to_string(),
            source,
        })?;
    tracing::info!(restored, "Persisted locks replayed");

    publish
        .start()
        .await
        .map_err(|source| RuntimeError::Initialization {
            component: "publish service".to_string(),
            source,
        })?;
    Ok(())
}

/// Periodically purge expired HTTP sessions and drop stale records.
///
/// Stops when `shutdown` fires.
pub fn spawn_session_sweeper(
    registry: Arc<SessionRegistry>,
    http_sessions: Arc<HttpSessionStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = http_sessions.purge_expired(Utc::now()).await;
                    let removed = registry.validate(http_sessions.as_ref()).await;
                    if purged > 0 || !removed.is_empty() {
                        tracing::debug!(purged, removed = removed.len(), "Session sweep finished");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Session sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use crate::error::BoxError;
    use crate::services::{IdlePublishService, InMemoryLockManager, TracingEventSink};
    use async_trait::async_trait;

    struct Failing;

    #[async_trait]
    impl Subsystem for Failing {
        fn name(&self) -> &str {
            "search index"
        }

        async fn initialize(&self, _config: &RuntimeConfig) -> Result<(), BoxError> {
            Err("index directory missing".into())
        }

        async fn shutdown(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subsystem_failure_names_component() {
        let config = load_configuration(&StaticConfigSource::default())
            .await
            .unwrap();
        let subsystems: Vec<Arc<dyn Subsystem>> = vec![Arc::new(Failing)];
        match initialize_subsystems(&subsystems, &config).await {
            Err(RuntimeError::Initialization { component, source }) => {
                assert_eq!(component, "search index");
                assert_eq!(source.to_string(), "index directory missing");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_initialization_error() {
        let mut config = RuntimeConfig::default();
        config.session.broadcast_queue_size = 0;
        let result = load_configuration(&StaticConfigSource::new(config)).await;
        assert!(matches!(
            result,
            Err(RuntimeError::Initialization { ref component, .. }) if component == "configuration"
        ));
    }

    #[tokio::test]
    async fn test_shell_access_starts_publishing() {
        let publish = IdlePublishService::default();
        enter_shell_access(&InMemoryLockManager::new(), &publish)
            .await
            .unwrap();
        assert!(publish.is_running());
    }

    #[tokio::test]
    async fn test_sweeper_purges_and_stops() {
        let registry = Arc::new(SessionRegistry::new(
            &Default::default(),
            Arc::new(InMemoryLockManager::new()),
            Arc::new(TracingEventSink),
        ));
        let http_sessions = Arc::new(
            HttpSessionStore::new(Duration::from_millis(1)).with_listener(registry.clone()),
        );
        http_sessions.create();

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_session_sweeper(
            registry.clone(),
            http_sessions.clone(),
            Duration::from_millis(20),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(http_sessions.is_empty());
        assert_eq!(registry.active_count(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
