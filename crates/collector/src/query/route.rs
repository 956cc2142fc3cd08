//! Route — POST /api/query, the visualization adapter's entry point.

use axum::extract::State;
use axum::response::Json;
use fabric::docker::{DockerError, RuntimeClient};
use fabric::query::{FabricQuery, QueryType};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::control::route::authorize;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Dispatch a typed query. Metrics and containers queries answer from the
/// store; control queries run a gated lifecycle verb.
pub async fn run_query(
    State(state): State<AppState>,
    Json(query): Json<FabricQuery>,
) -> ApiResult<Json<Value>> {
    let hosts = state.registry.list();

    match query.query_type {
        QueryType::Metrics => {
            let frames = state.engine.metrics(&query, &hosts)?;
            Ok(Json(json!(frames)))
        }
        QueryType::Containers => {
            let frame = state.engine.containers(&query, &hosts)?;
            Ok(Json(json!([frame])))
        }
        QueryType::Control => run_control(&state, &query).await,
    }
}

async fn run_control(state: &AppState, query: &FabricQuery) -> ApiResult<Json<Value>> {
    let action = query
        .control_action
        .ok_or_else(|| ApiError::Validation("no control action specified".to_string()))?;
    let container_id = query
        .container_ids
        .first()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("containerId is required".to_string()))?;

    authorize(&state.registry.settings(), action).map_err(ApiError::Validation)?;

    // The target host comes from the selection map or the legacy id list.
    let host_id = query
        .host_selections
        .keys()
        .next()
        .cloned()
        .or_else(|| query.host_ids.first().cloned())
        .ok_or_else(|| ApiError::Validation("hostId is required".to_string()))?;
    let host = state
        .registry
        .get(&host_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown host: {host_id}")))?;
    if !host.enabled {
        return Err(ApiError::Validation(format!("host '{host_id}' is disabled")));
    }

    let client = RuntimeClient::connect(&host.url)?;
    info!(host_id = %host.id, container_id = %container_id, action = %action, "control query");
    match client.control(container_id, action, None).await {
        Ok(()) => Ok(Json(json!({
            "success": true,
            "action": action,
            "containerId": container_id,
        }))),
        Err(DockerError::NotFound(message)) => Err(ApiError::NotFound(message)),
        Err(e) => {
            warn!(host_id = %host.id, container_id = %container_id, error = %e, "control query failed");
            Ok(Json(json!({
                "success": false,
                "action": action,
                "containerId": container_id,
                "error": e.to_string(),
            })))
        }
    }
}
