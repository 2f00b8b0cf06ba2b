//! Reelflow API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelflow_api::{create_router, metrics, ApiConfig, AppState, WebhookSender, WebhookSenderConfig};

const DEFAULT_LOG_FILTER: &str = "reelflow=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        error!("reelflow-api exited: {:#}", e);
        std::process::exit(1);
    }
}

/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(false)).init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true))
            .init();
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "true" | "1"))
        .unwrap_or(default)
}

async fn run() -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting reelflow-api");

    // Redis TLS and reqwest share the process-wide rustls provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    let config = ApiConfig::from_env().context("invalid configuration")?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;
    info!(
        environment = %config.environment,
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let state = AppState::new(config)
        .await
        .context("failed to build application state")?;

    let metrics_handle = if env_flag("METRICS_ENABLED", true) {
        match metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                None
            }
        }
    } else {
        None
    };

    let sender = WebhookSender::new(Arc::clone(&state.webhooks), WebhookSenderConfig::from_env())
        .context("failed to build webhook sender")?;
    tokio::spawn(async move { sender.run().await });

    let app = create_router(state, metrics_handle);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
