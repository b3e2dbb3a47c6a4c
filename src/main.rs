//! workflowd - Workflow State Machine Service
//!
//! An HTTP service hosting workflow definitions and their running instances,
//! with snapshot persistence across restarts.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use workflowd_core::WorkflowEngine;
use workflowd_server::{run_metrics_server, Config, Metrics, Server, ServerConfig};
use workflowd_storage::{Snapshot, SnapshotStore};

#[derive(Parser)]
#[command(name = "workflowd")]
#[command(about = "Workflow state machine service")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "WORKFLOWD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(ref path) = cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    tracing::info!("Starting workflowd");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());

    let snapshot_dir = config.storage.snapshots_dir();
    let snapshot_store = SnapshotStore::open(&snapshot_dir)?;
    tracing::info!("  Snapshot directory: {}", snapshot_dir.display());

    let engine = Arc::new(WorkflowEngine::new());

    if config.storage.restore_on_startup {
        match snapshot_store.latest()? {
            Some(snapshot) => {
                let report = snapshot.restore_into(&engine)?;
                tracing::info!(
                    "Restored {} definitions and {} instances from snapshot taken {}",
                    report.definitions_restored,
                    report.instances_restored,
                    snapshot.created_at
                );
            }
            None => tracing::info!("No snapshot found, starting empty"),
        }
    }

    let (metrics_shutdown, _) = broadcast::channel(1);
    let mut server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_connections(config.network.max_connections)
        .with_max_body_bytes(config.network.max_body_bytes);

    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());

        let addr = config.metrics.bind_addr;
        let shutdown_rx = metrics_shutdown.subscribe();
        tracing::info!("  Metrics: enabled on {}", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let server = Arc::new(Server::new(server_config, engine.clone()));

    let shutdown_server = server.clone();
    let shutdown_metrics = metrics_shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
        let _ = shutdown_metrics.send(());
    });

    // Blocks until shutdown
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    if config.storage.snapshot_on_shutdown {
        let meta = snapshot_store.save(&Snapshot::capture(&engine))?;
        tracing::info!("Wrote shutdown snapshot {}", meta.snapshot_id);

        if config.storage.snapshots_retained > 0 {
            snapshot_store.prune(config.storage.snapshots_retained)?;
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
