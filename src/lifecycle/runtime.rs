//! The runtime that owns every core component.
//!
//! # Data Flow
//! ```text
//! ServerRuntime::new          OFFLINE → CORE_OBJECT
//!     → initialize()          config, subsystems, core state → INITIALIZING
//!                             lock replay, publish start, sweeper → SHELL_ACCESS
//!     → start_serving()       → SERVLET_ACCESS (dispatcher available)
//!     → shutdown()            ShutdownSequencer, core state released → OFFLINE
//! ```
//!
//! # Design Decisions
//! - Constructed explicitly and shared as `Arc`; there is no global instance
//! - Core state sits in an `ArcSwapOption` so readers never take a lock
//! - Every accessor checks the runlevel first and fails with `NotInitialized`

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigSource, RuntimeConfig};
use crate::context::ExecutionContextFactory;
use crate::dispatch::{
    AuthorizationHandler, BasicAuthorizationHandler, DispatchCollaborators, RequestDispatchCore,
    RequestSeed,
};
use crate::error::{BoxError, RuntimeError, RuntimeResult};
use crate::identity::IdentityStore;
use crate::lifecycle::shutdown::{Shutdown, ShutdownReport, ShutdownSequencer};
use crate::lifecycle::startup;
use crate::runlevel::{RunlevelController, RunlevelStage};
use crate::services::{
    ContextEchoLoader, EventSink, IdlePublishService, InMemoryLockManager, LockManager,
    PublishService, ResourceLoader, Subsystem, TracingEventSink,
};
use crate::session::{HttpSessionStore, SessionRegistry};

/// Step budget used when shutting down before any configuration was loaded.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// External collaborators of the runtime.
pub struct RuntimeServices {
    pub store: Arc<dyn IdentityStore>,
    pub lock_manager: Arc<dyn LockManager>,
    pub publish: Arc<dyn PublishService>,
    pub loader: Arc<dyn ResourceLoader>,
    pub events: Arc<dyn EventSink>,
    /// Defaults to HTTP Basic with the configured login form.
    pub handler: Option<Arc<dyn AuthorizationHandler>>,
    /// Initialized in order, shut down in reverse.
    pub subsystems: Vec<Arc<dyn Subsystem>>,
}

impl RuntimeServices {
    /// In-memory defaults around `store`.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            lock_manager: Arc::new(InMemoryLockManager::new()),
            publish: Arc::new(IdlePublishService::default()),
            loader: Arc::new(ContextEchoLoader::default()),
            events: Arc::new(TracingEventSink),
            handler: None,
            subsystems: Vec::new(),
        }
    }

    pub fn with_lock_manager(mut self, lock_manager: Arc<dyn LockManager>) -> Self {
        self.lock_manager = lock_manager;
        self
    }

    pub fn with_publish(mut self, publish: Arc<dyn PublishService>) -> Self {
        self.publish = publish;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn AuthorizationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_subsystem(mut self, subsystem: Arc<dyn Subsystem>) -> Self {
        self.subsystems.push(subsystem);
        self
    }
}

/// Everything built once configuration is loaded.
pub struct CoreState {
    pub config: Arc<RuntimeConfig>,
    pub registry: Arc<SessionRegistry>,
    pub http_sessions: Arc<HttpSessionStore>,
    pub dispatcher: Arc<RequestDispatchCore>,
}

pub struct ServerRuntime {
    runlevel: RunlevelController,
    config_source: Arc<dyn ConfigSource>,
    services: RuntimeServices,
    core: ArcSwapOption<CoreState>,
    shutdown: Shutdown,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ServerRuntime {
    /// Create the runtime and enter CORE_OBJECT.
    pub async fn new(
        config_source: Arc<dyn ConfigSource>,
        services: RuntimeServices,
    ) -> RuntimeResult<Self> {
        let runtime = Self {
            runlevel: RunlevelController::new(),
            config_source,
            services,
            core: ArcSwapOption::empty(),
            shutdown: Shutdown::new(),
            sweeper: Mutex::new(None),
        };
        runtime
            .runlevel
            .transition_to(RunlevelStage::CoreObject)
            .await?;
        Ok(runtime)
    }

    pub fn stage(&self) -> RunlevelStage {
        self.runlevel.current()
    }

    pub fn identity_store(&self) -> Arc<dyn IdentityStore> {
        self.services.store.clone()
    }

    pub fn runlevel(&self) -> &RunlevelController {
        &self.runlevel
    }

    /// Fires when the runtime starts going offline.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Cold start from CORE_OBJECT up to SHELL_ACCESS.
    ///
    /// On a configuration or subsystem failure the stage stays at
    /// CORE_OBJECT, with the subsystems started so far shut down again. Concurrent callers are serialized; only the first one
    /// runs the sequence, the others get `IllegalSequence`.
    pub async fn initialize(&self) -> RuntimeResult<()> {
        let mut guard = self.runlevel.begin().await;
        let current = guard.current();
        if current != RunlevelStage::CoreObject {
            tracing::error!(current = %current, "Initialization requested out of sequence");
            return Err(RuntimeError::IllegalSequence {
                from: current,
                to: RunlevelStage::Initializing,
            });
        }

        let config = startup::load_configuration(self.config_source.as_ref()).await?;
        startup::initialize_subsystems(&self.services.subsystems, &config).await?;
        let core = Arc::new(self.build_core(config));
        self.core.store(Some(core.clone()));
        guard.advance(RunlevelStage::Initializing)?;

        startup::enter_shell_access(
            self.services.lock_manager.as_ref(),
            self.services.publish.as_ref(),
        )
        .await?;
        guard.advance(RunlevelStage::ShellAccess)?;

        let sweeper = startup::spawn_session_sweeper(
            core.registry.clone(),
            core.http_sessions.clone(),
            Duration::from_secs(core.config.session.validate_interval_secs),
            self.shutdown.subscribe(),
        );
        *self.sweeper.lock() = Some(sweeper);
        Ok(())
    }

    /// Enter SERVLET_ACCESS; requests are served from here on.
    pub async fn start_serving(&self) -> RuntimeResult<()> {
        self.runlevel
            .transition_to(RunlevelStage::ServletAccess)
            .await
            .map(|_| ())
    }

    /// Run the shutdown sequence and go OFFLINE.
    ///
    /// Calling it on an offline runtime returns an empty report.
    pub async fn shutdown(&self) -> RuntimeResult<ShutdownReport> {
        let mut guard = self.runlevel.begin().await;
        let current = guard.current();
        if current == RunlevelStage::Offline {
            return Ok(ShutdownReport::default());
        }
        tracing::info!(from = %current, "Shutting down");
        self.shutdown.trigger();

        let core = self.core.load_full();
        let step_timeout = core
            .as_ref()
            .map(|core| Duration::from_secs(core.config.shutdown.step_timeout_secs))
            .unwrap_or(DEFAULT_STEP_TIMEOUT);
        let mut sequencer = ShutdownSequencer::new(step_timeout);

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            sequencer = sequencer.step("session sweeper", async move {
                handle.await.map_err(BoxError::from)
            });
        }
        if current >= RunlevelStage::ShellAccess {
            let publish = self.services.publish.clone();
            sequencer = sequencer.step("publish service", async move { publish.shutdown().await });
        }
        if let Some(core) = &core {
            let http_sessions = core.http_sessions.clone();
            sequencer = sequencer.step("sessions", async move {
                let destroyed = http_sessions.invalidate_all().await;
                tracing::info!(destroyed, "Sessions invalidated");
                Ok(())
            });
        }
        if current >= RunlevelStage::Initializing {
            for subsystem in self.services.subsystems.iter().rev() {
                let subsystem = subsystem.clone();
                let name = subsystem.name().to_string();
                sequencer = sequencer.step(name, async move { subsystem.shutdown().await });
            }
        }

        let report = sequencer.run().await;
        guard.advance(RunlevelStage::Offline)?;
        self.core.store(None);
        Ok(report)
    }

    pub fn config(&self) -> RuntimeResult<Arc<RuntimeConfig>> {
        Ok(self.core(RunlevelStage::Initializing)?.config.clone())
    }

    pub fn registry(&self) -> RuntimeResult<Arc<SessionRegistry>> {
        Ok(self.core(RunlevelStage::Initializing)?.registry.clone())
    }

    pub fn http_sessions(&self) -> RuntimeResult<Arc<HttpSessionStore>> {
        Ok(self.core(RunlevelStage::Initializing)?.http_sessions.clone())
    }

    pub fn factory(&self) -> RuntimeResult<ExecutionContextFactory> {
        Ok(self
            .core(RunlevelStage::Initializing)?
            .dispatcher
            .factory()
            .clone())
    }

    /// The request dispatcher; only available once serving.
    pub fn dispatcher(&self) -> RuntimeResult<Arc<RequestDispatchCore>> {
        Ok(self.core(RunlevelStage::ServletAccess)?.dispatcher.clone())
    }

    fn core(&self, required: RunlevelStage) -> RuntimeResult<Arc<CoreState>> {
        self.runlevel.require_at_least(required)?;
        self.core
            .load_full()
            .ok_or_else(|| RuntimeError::NotInitialized {
                required,
                current: self.runlevel.current(),
            })
    }

    fn build_core(&self, config: RuntimeConfig) -> CoreState {
        let config = Arc::new(config);
        let services = &self.services;

        let registry = Arc::new(SessionRegistry::new(
            &config.session,
            services.lock_manager.clone(),
            services.events.clone(),
        ));
        let http_sessions = Arc::new(
            HttpSessionStore::new(Duration::from_secs(config.session.max_inactive_secs))
                .with_listener(registry.clone()),
        );
        let factory = ExecutionContextFactory::new(services.store.clone(), config.identity.clone());
        let handler: Arc<dyn AuthorizationHandler> = match &services.handler {
            Some(handler) => handler.clone(),
            None => Arc::new(BasicAuthorizationHandler::new(
                services.store.clone(),
                RequestSeed::new(&config),
                config.login.form_uri.clone(),
            )),
        };
        let dispatcher = Arc::new(RequestDispatchCore::new(
            &config,
            factory,
            DispatchCollaborators {
                store: services.store.clone(),
                registry: registry.clone(),
                http_sessions: http_sessions.clone(),
                handler,
                loader: services.loader.clone(),
                events: services.events.clone(),
            },
        ));

        CoreState {
            config,
            registry,
            http_sessions,
            dispatcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigSource;
    use crate::dispatch::RequestInfo;
    use crate::identity::InMemoryIdentityStore;
    use async_trait::async_trait;

    struct Recorder {
        name: &'static str,
        fail_init: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Subsystem for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn initialize(&self, _config: &RuntimeConfig) -> Result<(), BoxError> {
            self.log.lock().push(format!("init {}", self.name));
            if self.fail_init {
                return Err("unavailable".into());
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("shutdown {}", self.name));
            Ok(())
        }
    }

    fn services(log: &Arc<Mutex<Vec<String>>>, failing: Option<&'static str>) -> RuntimeServices {
        let config = RuntimeConfig::default();
        let store = Arc::new(InMemoryIdentityStore::bootstrap(&config.identity, "admin"));
        let mut services = RuntimeServices::new(store);
        for name in ["search", "scheduler"] {
            services = services.with_subsystem(Arc::new(Recorder {
                name,
                fail_init: failing == Some(name),
                log: log.clone(),
            }));
        }
        services
    }

    async fn runtime(log: &Arc<Mutex<Vec<String>>>) -> ServerRuntime {
        ServerRuntime::new(
            Arc::new(StaticConfigSource::default()),
            services(log, None),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_cold_start_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = runtime(&log).await;
        assert_eq!(runtime.stage(), RunlevelStage::CoreObject);
        assert!(matches!(
            runtime.registry(),
            Err(RuntimeError::NotInitialized { .. })
        ));

        runtime.initialize().await.unwrap();
        assert_eq!(runtime.stage(), RunlevelStage::ShellAccess);
        assert_eq!(*log.lock(), vec!["init search", "init scheduler"]);
        assert!(runtime.registry().is_ok());
        assert!(runtime.factory().is_ok());
        assert!(matches!(
            runtime.dispatcher(),
            Err(RuntimeError::NotInitialized {
                required: RunlevelStage::ServletAccess,
                current: RunlevelStage::ShellAccess,
            })
        ));

        runtime.start_serving().await.unwrap();
        let dispatcher = runtime.dispatcher().unwrap();
        let outcome = dispatcher.resolve(&RequestInfo::new("/")).await.unwrap();
        assert_eq!(outcome.context().user().name, "Guest");
    }

    #[tokio::test]
    async fn test_failed_subsystem_keeps_core_object() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = ServerRuntime::new(
            Arc::new(StaticConfigSource::default()),
            services(&log, Some("search")),
        )
        .await
        .unwrap();

        match runtime.initialize().await {
            Err(RuntimeError::Initialization { component, .. }) => assert_eq!(component, "search"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(runtime.stage(), RunlevelStage::CoreObject);
        assert_eq!(*log.lock(), vec!["init search"]);
        assert!(runtime.config().is_err());
    }

    #[tokio::test]
    async fn test_failed_subsystem_rolls_back_earlier_ones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = ServerRuntime::new(
            Arc::new(StaticConfigSource::default()),
            services(&log, Some("scheduler")),
        )
        .await
        .unwrap();

        match runtime.initialize().await {
            Err(RuntimeError::Initialization { component, .. }) => {
                assert_eq!(component, "scheduler")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(runtime.stage(), RunlevelStage::CoreObject);
        assert_eq!(
            *log.lock(),
            vec!["init search", "init scheduler", "shutdown search"]
        );

        let report = runtime.shutdown().await.unwrap();
        assert!(report.completed.iter().all(|step| step != "search"));
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_runs_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = Arc::new(runtime(&log).await);

        let first = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.initialize().await }
        });
        let second = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.initialize().await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RuntimeError::IllegalSequence { .. }))));
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = runtime(&log).await;
        runtime.initialize().await.unwrap();
        runtime.start_serving().await.unwrap();

        let dispatcher = runtime.dispatcher().unwrap();
        let (_, session) = dispatcher
            .login("Admin", "admin", &RequestInfo::new("/"))
            .await
            .unwrap();
        let registry = runtime.registry().unwrap();
        assert!(registry.contains(&session));

        let report = runtime.shutdown().await.unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(
            report.completed,
            vec!["session sweeper", "publish service", "sessions", "scheduler", "search"]
        );
        assert_eq!(runtime.stage(), RunlevelStage::Offline);
        assert!(registry.is_empty());
        assert!(matches!(
            runtime.dispatcher(),
            Err(RuntimeError::NotInitialized { .. })
        ));
        assert_eq!(
            log.lock()[2..],
            ["shutdown scheduler".to_string(), "shutdown search".to_string()]
        );

        let again = runtime.shutdown().await.unwrap();
        assert!(again.completed.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_initialization() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runtime = runtime(&log).await;
        let report = runtime.shutdown().await.unwrap();
        assert!(report.completed.is_empty());
        assert_eq!(runtime.stage(), RunlevelStage::Offline);
        assert!(log.lock().is_empty());
    }
}
