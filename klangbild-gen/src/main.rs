//! klangbild-gen - Image to image and music generation service
//!
//! Accepts an image, has it described by a vision model, synthesizes a new
//! image from that description and, for the remote backend, generates a
//! music piece in the background. Clients poll the transaction or follow
//! `/events`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use klangbild_common::config::{load_toml_config, resolve_config_path};
use klangbild_common::events::EventBus;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use klangbild_gen::config::{resolve_openai_api_key, ServiceConfig, CONFIG_ENV_VAR};
use klangbild_gen::AppState;

/// Command-line arguments for klangbild-gen
#[derive(Parser, Debug)]
#[command(name = "klangbild-gen")]
#[command(about = "Image and music generation service")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "KLANGBILD_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config file)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, "klangbild-gen");
    let mut config: ServiceConfig = load_toml_config(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting klangbild-gen v{} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let api_key = resolve_openai_api_key(&config.openai)?;

    let event_bus = EventBus::new(config.pipeline.event_capacity);
    info!("Event bus initialized (capacity {})", event_bus.capacity());

    let controller = Arc::new(
        klangbild_gen::build_controller(&config, api_key, event_bus.clone())
            .context("Failed to initialize pipeline")?,
    );
    info!(
        "Pipeline ready (inference: {}, max concurrent audio tasks: {})",
        config.inference.base_url, config.pipeline.max_concurrent_audio_tasks
    );

    let state = AppState::new(controller.clone(), event_bus, config.pipeline.max_upload_bytes);
    let app = klangbild_gen::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    controller.audio_pool().shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
