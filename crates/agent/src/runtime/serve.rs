//! Serve — build the HTTP router and accept connections until shutdown.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AgentConfig;
use crate::runtime::stop::shutdown_signal;
use crate::state::SharedState;
use crate::{containers, control, metrics};

pub async fn serve(state: SharedState, config: &AgentConfig) -> anyhow::Result<()> {
    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("========================================");
    info!("dockpulse agent is ready!");
    info!("Listening on: http://{}", addr);
    info!("Press Ctrl+C to shutdown gracefully");
    info!("========================================");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the sampler and trim tasks.
    state.shutdown();

    info!("Server shutdown complete");
    Ok(())
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/info", get(info_handler))
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
        .route("/api/stats", get(metrics::route::agent_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness envelope.
async fn root_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "dockpulse-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "hostname": state.hostname,
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

/// Capability report: docker reachability and PSI support.
async fn info_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let docker_connected = state.docker.ping().await.is_ok();
    let docker_version = if docker_connected {
        state.docker.version().await.ok().flatten()
    } else {
        None
    };

    Json(json!({
        "hostname": state.hostname,
        "agentVersion": env!("CARGO_PKG_VERSION"),
        "dockerVersion": docker_version,
        "dockerConnected": docker_connected,
        "psiSupported": state.psi.supported(),
    }))
}
