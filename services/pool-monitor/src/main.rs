//! Credential pool monitor
//!
//! Single-binary service that:
//! 1. Opens the shared credential database
//! 2. Runs the background validation sweep over ACTIVE credentials
//! 3. Serves `/health` (per-platform pool counts) and `/metrics`
//!    (Prometheus) for the scraper fleet's dashboards

mod config;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credential_pool::{CredentialPool, spawn_sweep_task};
use credential_store::{CredentialStore, SqliteCredentialStore};
use platform_client::{ClientFactory, CookieHttpFactory};

use crate::config::Config;

/// Drain timeout for graceful shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    pool: Arc<CredentialPool>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting credpool-monitor");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        database = %config.database.path.display(),
        max_tries = config.pool.max_tries,
        validate_on_acquire = config.pool.validate_on_acquire,
        sweep_enabled = config.sweep.enabled,
        "configuration loaded"
    );

    let store = SqliteCredentialStore::open(&config.database.path)
        .await
        .with_context(|| {
            format!(
                "failed to open credential database at {}",
                config.database.path.display()
            )
        })?;
    let pool = Arc::new(CredentialPool::new(
        Arc::new(store) as Arc<dyn CredentialStore>
    ));

    let mut factory = CookieHttpFactory::new()
        .map_err(|e| anyhow::anyhow!("failed to build probe factory: {e}"))?;
    if let Some(url) = &config.probe.url_override {
        warn!(url = %url, "probing every platform against an override URL");
        factory = factory.with_probe_url(url.clone());
    }
    let factory: Arc<dyn ClientFactory> = Arc::new(factory);

    if config.sweep.enabled {
        let _sweep = spawn_sweep_task(
            pool.clone(),
            factory.clone(),
            Duration::from_secs(config.sweep.interval_secs),
            config.pool.probe_timeout(),
        );
        info!(
            interval_secs = config.sweep.interval_secs,
            factory = factory.id(),
            "validation sweep started"
        );
    }

    let state = AppState {
        pool,
        prometheus,
        started_at: Instant::now(),
    };
    let app = build_router(state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown: stop accepting on SIGTERM/SIGINT, then bound the
    // drain so a slow client cannot block process exit.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Pool health: per-platform ACTIVE/INVALID counts plus an overall status.
/// Returns 200 while any credentials are usable, 503 when unhealthy.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();

    match state.pool.health().await {
        Ok(mut health) => {
            // Refresh the per-platform gauges alongside the JSON answer.
            if let Some(platforms) = health["platforms"].as_array() {
                for entry in platforms {
                    metrics::record_pool_counts(
                        entry["platform"].as_str().unwrap_or("unknown"),
                        entry["active"].as_u64().unwrap_or(0),
                        entry["invalid"].as_u64().unwrap_or(0),
                    );
                }
            }
            health["uptime_seconds"] = serde_json::json!(uptime);

            let status_code = if health["status"] == "unhealthy" {
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            } else {
                axum::http::StatusCode::OK
            };
            (
                status_code,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                health.to_string(),
            )
        }
        Err(e) => {
            error!(error = %e, "health check failed to read the store");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::json!({
                    "status": "error",
                    "error": e.to_string(),
                })
                .to_string(),
            )
        }
    }
}

/// Prometheus metrics endpoint — text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
