//! CLI entry point: one process, one listening port.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use crate::config;
use crate::router::{build_router, AppState};
use crate::rpc::Bridge;
use crate::supervisor::Supervisor;
use crate::telemetry;

#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", about = "HTTP bridge for MCP servers speaking JSON-RPC over stdio", version)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0", env = "MCP_BRIDGE_HOST")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "MCP_BRIDGE_PORT")]
    port: u16,

    /// Path to the server configuration file.
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, env = "MCP_CONFIG_PATH")]
    config: PathBuf,

    /// Log level filter, e.g. info,debug,trace.
    #[arg(long, default_value = "info", env = "MCP_BRIDGE_LOG")]
    log: String,
}

#[tokio::main]
pub async fn run_bridge() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    telemetry::init(&cli.log);

    let config = config::load(&cli.config);
    let supervisor = Supervisor::new();
    for (id, spec) in &config.mcp_servers {
        match supervisor.start(id, spec).await {
            Ok(snapshot) => {
                info!(server = %id, pid = snapshot.pid, "configured server started");
            }
            Err(err) => {
                error!(server = %id, error = %err, "failed to start configured server; skipping it");
            }
        }
    }

    let state = AppState::new(Bridge::new(supervisor.clone()));
    let router = build_router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "mcp-bridge listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down; stopping all servers");
    supervisor.shutdown().await;
    Ok(())
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
