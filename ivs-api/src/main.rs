//! ivs-api - Used Instrument Valuation Service
//!
//! Hosts the description (photo → InstrumentDescription) and valuation
//! (InstrumentDescription → ValuationResult) pipelines behind synchronous
//! JSON endpoints and streaming SSE endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ivs_api::config::{CliOverrides, ServiceConfig};
use ivs_api::model::openai::OpenAiClient;
use ivs_api::pipeline::{DescriptionPipeline, ValuationPipeline};
use ivs_api::retrieval::{load_seed, InMemoryStore};
use ivs_api::AppState;

/// Command-line arguments for ivs-api
#[derive(Parser, Debug)]
#[command(name = "ivs-api")]
#[command(about = "Used instrument valuation service")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config_dir>/ivs/ivs-api.toml)
    #[arg(short, long, env = "IVS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON Lines file with reference records for retrieval
    #[arg(long)]
    seed_path: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (e.g. "info", "ivs_api=debug")
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let overrides = CliOverrides {
        config: args.config,
        host: args.host,
        port: args.port,
        seed_path: args.seed_path,
        log_level: args.log_level,
    };
    let config = ServiceConfig::resolve(&overrides).context("Failed to resolve configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ivs-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("IVS_GIT_HASH"),
        env!("IVS_BUILD_TIMESTAMP"),
        env!("IVS_BUILD_PROFILE")
    );
    info!(
        vlm_model = %config.openai.vlm_model,
        rag_model = %config.openai.rag_model,
        embed_model = %config.openai.embed_model,
        top_k = config.rag.top_k,
        "Model configuration"
    );

    let client = Arc::new(
        OpenAiClient::new(&config.openai).context("Failed to initialize OpenAI client")?,
    );

    let records = load_seed(config.seed_path())
        .with_context(|| format!("Failed to load seed file {}", config.seed_path().display()))?;
    let store = InMemoryStore::build(client.clone(), records)
        .await
        .context("Failed to build retrieval store")?;
    info!("Retrieval store ready");

    let description = Arc::new(DescriptionPipeline::new(
        client.clone(),
        config.server.max_upload_bytes,
    ));
    let valuation = Arc::new(ValuationPipeline::new(
        Arc::new(store),
        client,
        config.rag.top_k,
        config.rag.context_max_chars,
    ));

    let state = AppState::new(description, valuation);
    let app = ivs_api::build_router(state, &config.server);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
