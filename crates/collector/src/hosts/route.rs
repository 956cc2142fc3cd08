//! Route — host management handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use fabric::registry::{normalize_url, Host, HostPatch};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHost {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// GET /api/hosts — configured hosts with their latest health.
pub async fn list_hosts(State(state): State<AppState>) -> Json<Value> {
    let health = state.health.snapshot();
    let hosts: Vec<Value> = state
        .registry
        .list()
        .into_iter()
        .map(|host| {
            let entry = health.get(&host.id);
            json!({
                "id": host.id,
                "name": host.name,
                "url": host.url,
                "enabled": host.enabled,
                "health": entry,
            })
        })
        .collect();
    Json(json!({ "hosts": hosts }))
}

/// POST /api/hosts — add a host. Duplicate URLs are a conflict; the
/// registry state stays unchanged.
pub async fn add_host(
    State(state): State<AppState>,
    Json(body): Json<NewHost>,
) -> ApiResult<(StatusCode, Json<Host>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }
    if body.url.trim().is_empty() {
        return Err(ApiError::Validation("url is required".to_string()));
    }

    let url = normalize_url(body.url.trim());
    if let Some(existing) = state.registry.find_by_url(&url) {
        return Err(ApiError::Conflict(format!(
            "a host with url '{}' is already configured as '{}'",
            url, existing.id
        )));
    }

    let host = Host {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name.trim().to_string(),
        url,
        enabled: body.enabled,
    };
    let host = state
        .registry
        .add(host)
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(host)))
}

/// PUT /api/hosts/{id} — patch name, url, or enabled.
pub async fn update_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<HostPatch>,
) -> ApiResult<Json<Host>> {
    if let Some(url) = &patch.url {
        let url = normalize_url(url.trim());
        if url.is_empty() {
            return Err(ApiError::Validation("url must not be empty".to_string()));
        }
        if let Some(existing) = state.registry.find_by_url(&url) {
            if existing.id != id {
                return Err(ApiError::Conflict(format!(
                    "a host with url '{}' is already configured as '{}'",
                    url, existing.id
                )));
            }
        }
    }

    state
        .registry
        .update(&id, patch)
        .map(Json)
        .map_err(|e| ApiError::NotFound(e.to_string()))
}

/// DELETE /api/hosts/{id} — remove a host and purge its samples and health
/// immediately. The supervisor drains the worker on the change event; the
/// second purge after the drain is idempotent.
pub async fn delete_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let host = state
        .registry
        .remove(&id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    let dropped = state.store.remove_host(&id);
    state.health.remove(&id);

    Ok(Json(json!({
        "removed": host.id,
        "droppedContainers": dropped,
    })))
}
