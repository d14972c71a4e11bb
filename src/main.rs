use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, StoreBackend};
use floodgate::server::{demo_app, gate_from_config, HttpServer};

/// Rate-limiting gate in front of an HTTP application.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// YAML configuration file; FLOODGATE__* environment variables override it
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Keep counters in process instead of Redis
    #[arg(long)]
    memory_store: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = FloodgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.listen {
        config.server.http_addr = addr;
    }
    if cli.memory_store {
        config.store.backend = StoreBackend::Memory;
    }

    info!(
        http_addr = %config.server.http_addr,
        limit = config.rate_limiting.limit,
        window_secs = config.rate_limiting.window_secs,
        enforcement = ?config.rate_limiting.enforcement,
        failure_policy = ?config.rate_limiting.failure_policy,
        store = ?config.store.backend,
        "Configuration loaded"
    );

    let gate = Arc::new(gate_from_config(&config).await?);
    info!(rules = gate.rules().len(), "Gate initialized");

    let server = HttpServer::new(config.server.http_addr, gate, demo_app());

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
