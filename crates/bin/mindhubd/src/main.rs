//! # mindhubd — mindhub daemon
//!
//! Composition root that wires all adapters together and starts the runtime.
//!
//! ## Responsibilities
//! - Load configuration (`mindhub.toml` + env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct store implementations (adapters)
//! - Build the LLM backend and the built-in tool registry
//! - Assemble the pipeline and runtime handle, injecting ports
//! - Serve the websocket RPC endpoint
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mindhub_adapter_fswatch_notify::NotifyDirectoryWatcher;
use mindhub_adapter_llm::{build_backend, LlmConfig};
use mindhub_adapter_storage_sqlite_sqlx::{
    Config as DatabaseConfig, SqliteLogStore, SqliteSignalStore,
};
use mindhub_adapter_virtual::{builtin_registry, VirtualStateBus};
use mindhub_app::agent_loop::AgentLoopConfig;
use mindhub_app::pipeline::PipelineConfig;
use mindhub_app::runtime::{build_runtime, RuntimeApi};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = DatabaseConfig {
        database_url: config.database.url.clone(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();
    let signals = Arc::new(SqliteSignalStore::new(pool.clone()));
    let logs = Arc::new(SqliteLogStore::new(pool));

    // Entity world and built-in tools
    let bus = VirtualStateBus::new();
    let tools = builtin_registry(Arc::clone(&bus));

    // Model backend
    let backend = build_backend(&LlmConfig {
        provider: config.llm.provider.clone(),
        api_key: config.llm.api_key.clone(),
        model: config.llm.model.clone(),
        base_url: config.llm.base_url.clone(),
    })?;

    // Runtime
    let (pipeline, handle) = build_runtime(
        PipelineConfig {
            automation_dir: config.automations.dir.clone(),
            debounce: config.debounce(),
        },
        AgentLoopConfig::default(),
        backend,
        tools,
        signals,
        logs,
        bus,
        Arc::new(NotifyDirectoryWatcher::new()),
    );

    let cancel = CancellationToken::new();
    let pipeline_task = tokio::spawn(pipeline.run(cancel.clone()));

    // RPC
    let api: Arc<dyn RuntimeApi> = Arc::new(handle);
    let app = mindhub_adapter_rpc_axum::ws::router(api);

    let bind_addr = config.bind_addr();
    info!(%bind_addr, "mindhubd listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    pipeline_task.await?;
    info!("mindhubd stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
