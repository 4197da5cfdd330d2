//! API service
//!
//! Entry point for the PaaS backend API. Serves the auth endpoints and
//! gates protected routes behind JWT verification.

use api_service::config::{AuthMode, Config};
use api_service::observability::metrics::init_metrics_recorder;
use api_service::routes::{self, AppState};
use common::config::{LogFormat, DEFAULT_LOG_FILTER};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration is loaded before tracing so LOG_FORMAT can pick the formatter
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    let json_logs = config.observability.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_filter.clone().into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting API service");

    info!(
        bind_address = %config.bind_address,
        jwks_url = config.auth.jwks_url.as_deref().unwrap_or("<none>"),
        audience_configured = config.auth.audience.is_some(),
        issuer_configured = config.auth.issuer.is_some(),
        jwks_cache_ttl_seconds = config.auth.jwks_cache_ttl.as_secs(),
        default_log_filter = DEFAULT_LOG_FILTER,
        "Configuration loaded successfully"
    );

    match config.auth.mode() {
        AuthMode::Secure { .. } => info!("JWT verification enabled"),
        AuthMode::Insecure => warn!(
            "ALLOW_INSECURE_JWT is enabled and no JWKS is configured: tokens are decoded WITHOUT signature verification. Do not use in production"
        ),
        AuthMode::Misconfigured => error!(
            "JWKS not configured and ALLOW_INSECURE_JWT not set: every protected request will be rejected. Set COGNITO_JWKS_URL or COGNITO_USER_POOL_ID+AWS_REGION"
        ),
    }

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState::new(config));
    let app = routes::build_routes(state, metrics_handle);

    info!("API service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("API service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("API_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (API_DRAIN_SECONDS=0)");
    }
}
