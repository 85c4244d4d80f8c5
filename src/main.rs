//! CMS runtime server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http server ──▶ runlevel gate ──▶ handlers
//!                                                          │
//!                                                          ▼
//!                                                 RequestDispatchCore
//!                                       session lookup → authorization → guest
//!                                                          │
//!                      ┌───────────────────────────────────┼──────────────────┐
//!                      ▼                                   ▼                  ▼
//!               SessionRegistry                 ExecutionContextFactory  ResourceLoader
//!           (records, broadcast queues)           (ContextInfo → ctx)
//!
//!     ServerRuntime owns all of it and walks the runlevels:
//!     OFFLINE → CORE_OBJECT → INITIALIZING → SHELL_ACCESS → SERVLET_ACCESS → OFFLINE
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use cms_runtime::config::loader::load_config;
use cms_runtime::config::{ConfigSource, FileConfigSource, RuntimeConfig, StaticConfigSource};
use cms_runtime::http::HttpServer;
use cms_runtime::identity::InMemoryIdentityStore;
use cms_runtime::lifecycle::{shutdown_signal, RuntimeServices, ServerRuntime};
use cms_runtime::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cms-runtime")]
#[command(about = "CMS server runtime", long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop at shell access: initialize everything but do not serve HTTP
    #[arg(long)]
    shell_only: bool,

    /// Password of the bootstrap administrator
    #[arg(long, default_value = "admin")]
    admin_password: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let bootstrap = match &args.config {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };
    logging::init_logging(&bootstrap.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cms-runtime starting");

    if bootstrap.observability.metrics_enabled {
        if let Ok(addr) = bootstrap.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %bootstrap.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let source: Arc<dyn ConfigSource> = match &args.config {
        Some(path) => Arc::new(FileConfigSource::new(path.clone())),
        None => Arc::new(StaticConfigSource::new(bootstrap.clone())),
    };
    let store = Arc::new(InMemoryIdentityStore::bootstrap(
        &bootstrap.identity,
        &args.admin_password,
    ));
    let runtime = Arc::new(ServerRuntime::new(source, RuntimeServices::new(store)).await?);

    if let Err(e) = runtime.initialize().await {
        tracing::error!(error = %e, "Initialization failed");
        return Err(e.into());
    }
    let config = runtime.config()?;

    if args.shell_only {
        tracing::info!(stage = %runtime.stage(), "Running in shell mode, HTTP disabled");
        shutdown_signal().await;
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            max_connections = config.listener.max_connections,
            request_timeout_secs = config.timeouts.request_secs,
            "Listening for connections"
        );

        let server = HttpServer::new(runtime.clone(), &config);
        runtime.start_serving().await?;
        server.run(listener, shutdown_signal()).await?;
    }

    let report = runtime.shutdown().await?;
    tracing::info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        "Shutdown complete"
    );
    Ok(())
}
