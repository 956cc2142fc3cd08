//! Route — metrics query handlers over the unified store.

use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use fabric::stats::model::{project_sample, Sample};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsParams {
    /// Absent means the query spans all hosts.
    pub host_id: Option<String>,
    pub container_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Comma-separated field keys; absent means full samples.
    pub fields: Option<String>,
    /// Keep only the most recent N samples.
    pub limit: Option<usize>,
    /// Return just the last sample per container.
    pub latest: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LatestParams {
    pub host_id: Option<String>,
}

/// GET /api/metrics — time-range, host, container, and field selection.
pub async fn query_metrics(
    State(state): State<AppState>,
    Query(params): Query<MetricsParams>,
) -> Json<Value> {
    let mut samples = if params.latest {
        let mut latest = state.store.latest(params.host_id.as_deref());
        if let Some(container_id) = &params.container_id {
            latest.retain(|s| &s.container_id == container_id);
        }
        latest
    } else {
        state.store.query(
            params.host_id.as_deref(),
            params.container_id.as_deref(),
            params.from,
            params.to,
        )
    };

    let total_available = samples.len();
    if let Some(limit) = params.limit {
        if samples.len() > limit {
            samples.drain(..samples.len() - limit);
        }
    }

    let fields: Option<HashSet<&str>> = params
        .fields
        .as_deref()
        .map(|csv| csv.split(',').map(str::trim).filter(|f| !f.is_empty()).collect());

    let metrics: Vec<Value> = samples
        .iter()
        .map(|sample| project_sample(sample, fields.as_ref()))
        .collect();

    Json(json!({
        "metrics": metrics,
        "metadata": { "totalAvailable": total_available },
    }))
}

/// GET /api/metrics/latest — last sample per (host, container).
pub async fn latest_metrics(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Json<Vec<Sample>> {
    Json(state.store.latest(params.host_id.as_deref()))
}

/// GET /api/stats — store and fleet introspection.
pub async fn collector_stats(State(state): State<AppState>) -> Json<Value> {
    let hosts = state.registry.list();
    let enabled = hosts.iter().filter(|h| h.enabled).count();

    Json(json!({
        "hostname": state.hostname,
        "version": env!("CARGO_PKG_VERSION"),
        "hosts": {
            "total": hosts.len(),
            "enabled": enabled,
            "healthy": state.health.healthy_count(),
        },
        "containerCount": state.store.container_count(),
        "totalSnapshots": state.store.sample_count(),
        "timestamp": Utc::now(),
    }))
}
