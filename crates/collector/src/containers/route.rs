//! Route — container listing and status across hosts.
//!
//! Listing fans out to the runtimes live so stopped containers show up
//! too; a failing host is logged and skipped while the others still
//! answer.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use fabric::docker::{DockerError, RuntimeClient};
use fabric::registry::Host;
use fabric::stats::model::ContainerRecord;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListParams {
    pub all: bool,
    pub host_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusParams {
    pub host_id: Option<String>,
}

/// Enabled hosts targeted by a request: the named one, or all of them.
pub fn select_hosts(state: &AppState, host_id: Option<&str>) -> ApiResult<Vec<Host>> {
    match host_id {
        Some(id) => {
            let host = state
                .registry
                .get(id)
                .ok_or_else(|| ApiError::NotFound(format!("unknown host: {id}")))?;
            if !host.enabled {
                return Err(ApiError::Validation(format!("host '{id}' is disabled")));
            }
            Ok(vec![host])
        }
        None => {
            let hosts: Vec<Host> = state
                .registry
                .list()
                .into_iter()
                .filter(|h| h.enabled)
                .collect();
            if hosts.is_empty() {
                return Err(ApiError::NotConfigured(
                    "no enabled hosts configured".to_string(),
                ));
            }
            Ok(hosts)
        }
    }
}

/// GET /api/containers?all=&hostId=
pub async fn list_containers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ContainerRecord>>> {
    let hosts = select_hosts(&state, params.host_id.as_deref())?;

    let mut records = Vec::new();
    for host in &hosts {
        match list_on_host(host, params.all).await {
            Ok(mut host_records) => records.append(&mut host_records),
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "skipping host in container listing");
            }
        }
    }
    Ok(Json(records))
}

async fn list_on_host(host: &Host, all: bool) -> Result<Vec<ContainerRecord>, DockerError> {
    let client = RuntimeClient::connect(&host.url)?;
    let briefs = client.list(all).await?;
    Ok(briefs
        .iter()
        .map(|b| b.to_record(&host.id, &host.name))
        .collect())
}

/// GET /api/containers/{id}/status?hostId=
///
/// Without a host filter the lookup spans all enabled hosts; the first one
/// that knows the container answers.
pub async fn container_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StatusParams>,
) -> ApiResult<Json<Value>> {
    let hosts = select_hosts(&state, params.host_id.as_deref())?;

    for host in &hosts {
        let client = match RuntimeClient::connect(&host.url) {
            Ok(client) => client,
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "skipping host in status lookup");
                continue;
            }
        };
        match client.inspect(&id).await {
            Ok(status) => {
                return Ok(Json(json!({
                    "hostId": host.id,
                    "hostName": host.name,
                    "status": status,
                })))
            }
            Err(DockerError::NotFound(_)) => continue,
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "skipping host in status lookup");
                continue;
            }
        }
    }

    Err(ApiError::NotFound(format!("container not found: {id}")))
}
