//! Collaborator interfaces.
//!
//! # Data Flow
//! ```text
//! ServerRuntime
//!     → Subsystem::initialize (entering INITIALIZING, in registration order)
//!     → LockManager::replay_persisted_locks + PublishService::start (SHELL_ACCESS)
//!     → ResourceLoader::render (per request, after dispatch)
//!     → EventSink::publish (login, logout, session destroyed, user switched)
//!     → Subsystem::shutdown (reverse order, entering OFFLINE)
//! ```
//!
//! # Design Decisions
//! - Storage, rendering and publishing stay outside the runtime core
//! - Collaborators return boxed errors; the runtime wraps them with context
//! - In-memory defaults make the runtime usable stand-alone

pub mod events;
pub mod loader;
pub mod locks;

use async_trait::async_trait;

use crate::config::RuntimeConfig;
use crate::error::BoxError;
use crate::identity::UserId;

pub use events::{EventSink, RuntimeEvent, TracingEventSink};
pub use loader::{ContextEchoLoader, LoaderError, Rendered, ResourceLoader};
pub use locks::InMemoryLockManager;

/// A manager initialized while the runtime enters INITIALIZING.
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self, config: &RuntimeConfig) -> Result<(), BoxError>;

    /// Flush and stop. Called once while the runtime goes OFFLINE.
    async fn shutdown(&self) -> Result<(), BoxError>;
}

/// Resource lock bookkeeping.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Restore locks persisted by a previous run. Returns the number restored.
    async fn replay_persisted_locks(&self) -> Result<usize, BoxError>;

    /// Drop the temporary locks of `user`. Returns the number released.
    async fn release_temporary_locks(&self, user: UserId) -> Result<usize, BoxError>;
}

/// Background publishing of offline changes.
#[async_trait]
pub trait PublishService: Send + Sync {
    async fn start(&self) -> Result<(), BoxError>;

    async fn shutdown(&self) -> Result<(), BoxError>;
}

/// Publish service that only records its state.
#[derive(Debug, Default)]
pub struct IdlePublishService {
    running: std::sync::atomic::AtomicBool,
}

impl IdlePublishService {
    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::Acquire)
    }
}

#[async_trait]
impl PublishService for IdlePublishService {
    async fn start(&self) -> Result<(), BoxError> {
        self.running.store(true, std::sync::atomic::Ordering::Release);
        tracing::debug!("Publish service started");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.running.store(false, std::sync::atomic::Ordering::Release);
        tracing::debug!("Publish service stopped");
        Ok(())
    }
}
