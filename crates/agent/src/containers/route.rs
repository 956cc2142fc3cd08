//! Route — container listing and status handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use fabric::docker::DockerError;
use fabric::stats::model::ContainerRecord;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub all: bool,
}

/// GET /api/containers — live listing from the runtime, as records.
pub async fn list_containers(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ContainerRecord>>, (StatusCode, Json<Value>)> {
    match state.docker.list(params.all).await {
        Ok(briefs) => Ok(Json(
            briefs
                .iter()
                .map(|b| b.to_record(&state.config.host_id, &state.hostname))
                .collect(),
        )),
        Err(e) => {
            error!(error = %e, "container listing failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}

/// GET /api/containers/{id}/status — real-time inspect, 404 when gone.
pub async fn container_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.docker.inspect(&id).await {
        Ok(status) => Ok(Json(json!(status))),
        Err(DockerError::NotFound(message)) => {
            Err((StatusCode::NOT_FOUND, Json(json!({ "error": message }))))
        }
        Err(e) => {
            error!(container_id = %id, error = %e, "container inspect failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
