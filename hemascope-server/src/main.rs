// Hemascope blood cell detection server

use clap::Parser;
use hemascope_eye::load_model;
use hemascope_server::config_manager::ConfigBuilder;
use hemascope_server::{create_router, AppContext};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hemascope-server", version, about = "Blood cell detection API")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "HEMASCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Starting Hemascope {}", env!("CARGO_PKG_VERSION"));

    let mut builder = ConfigBuilder::from_sources(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        builder = builder.with_host(host);
    }
    if let Some(port) = cli.port {
        builder = builder.with_port(port);
    }
    let config = builder.build()?;

    let model = tokio::task::spawn_blocking({
        let model_config = config.model.clone();
        let input_size = config.detection.input_size;
        move || load_model(&model_config, input_size)
    })
    .await?;
    if model.status.is_degraded() && config.model.refuse_degraded {
        warn!("Prediction endpoints will refuse requests until trained weights are available");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let context = Arc::new(AppContext::builder(config).with_model(model).build()?);
    let app = create_router(context);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
