mod config;
mod containers;
mod control;
mod error;
mod hosts;
mod metrics;
mod query;
mod state;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: basic tracing so config loading can log. Thread-local so the
    // phase-2 global subscriber can replace it.
    let basic_tracing = init_tracing_basic();

    info!("Starting dockpulse collector v{}", env!("CARGO_PKG_VERSION"));

    let config = CollectorConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: re-initialize tracing with the configured level.
    drop(basic_tracing);
    init_tracing_from_config(&config);

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.server.bind_address);

    let state = AppState::new(config.clone());
    state.initialize().await;

    let app = build_router(state.clone());

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("Invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("========================================");
    info!("dockpulse collector is ready!");
    info!("Listening on: http://{}", addr);
    info!("Press Ctrl+C to shutdown gracefully");
    info!("========================================");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Signal the poll supervisor and trim task to stop.
    state.shutdown();

    info!("Server shut down gracefully");
    Ok(())
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.enable_cors {
        let origins = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|s| s.parse::<axum::http::HeaderValue>().ok())
            .collect::<Vec<_>>();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    } else {
        // Same-origin only when CORS is disabled.
        CorsLayer::new()
    };

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        .route("/api/info", get(info_handler))
        .route(
            "/api/hosts",
            get(hosts::route::list_hosts).post(hosts::route::add_host),
        )
        .route(
            "/api/hosts/{id}",
            put(hosts::route::update_host).delete(hosts::route::delete_host),
        )
        .route("/api/containers", get(containers::route::list_containers))
        .route(
            "/api/containers/{id}/status",
            get(containers::route::container_status),
        )
        .route(
            "/api/containers/{id}/{verb}",
            post(control::route::control_container),
        )
        .route("/api/metrics", get(metrics::route::query_metrics))
        .route("/api/metrics/latest", get(metrics::route::latest_metrics))
        .route("/api/stats", get(metrics::route::collector_stats))
        .route("/api/query", post(query::route::run_query))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
                .layer(cors),
        )
        .with_state(state)
}

/// Root handler — service identity.
async fn root_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "dockpulse-collector",
        "version": env!("CARGO_PKG_VERSION"),
        "hostname": state.hostname,
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

/// Capability report mirroring the agent's shape.
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let hosts = state.registry.list();
    Json(json!({
        "hostname": state.hostname,
        "version": env!("CARGO_PKG_VERSION"),
        "hosts": {
            "total": hosts.len(),
            "enabled": hosts.iter().filter(|h| h.enabled).count(),
            "healthy": state.health.healthy_count(),
        },
    }))
}

/// Health check handler — reflects actual host fleet health.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let total = state.registry.list().iter().filter(|h| h.enabled).count();
    let healthy = state.health.healthy_count();

    // Healthy if no hosts configured, or at least one answers.
    let is_healthy = total == 0 || healthy > 0;
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if is_healthy { "healthy" } else { "unhealthy" },
            "timestamp": chrono::Utc::now(),
            "hosts": {
                "total": total,
                "healthy": healthy,
            },
        })),
    )
}

/// Readiness check handler
async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    let total = state.registry.list().iter().filter(|h| h.enabled).count();
    let healthy = state.health.healthy_count();
    let ready = total == 0 || healthy > 0;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "ready": ready,
            "hosts": {
                "total": total,
                "healthy": healthy,
            },
        })),
    )
}

/// Phase 1: basic tracing so config loading can log.
fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,collector=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: re-initialize tracing with the configured level. RUST_LOG still
/// wins when set.
fn init_tracing_from_config(config: &CollectorConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let layer = fmt::layer().with_target(true);
    tracing_subscriber::registry().with(filter).with(layer).init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
