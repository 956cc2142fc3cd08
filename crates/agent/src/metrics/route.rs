//! Route — metrics query handlers over the local store.

use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use fabric::stats::model::{project_sample, Sample};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsParams {
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

/// GET /api/metrics — time-range, container, and field selection.
pub async fn query_metrics(
    State(state): State<SharedState>,
    Query(params): Query<MetricsParams>,
) -> Json<Value> {
    let mut samples = if params.latest {
        let mut latest = state.store.latest(None);
        if let Some(container_id) = &params.container_id {
            latest.retain(|s| &s.container_id == container_id);
        }
        latest
    } else {
        state
            .store
            .query(None, params.container_id.as_deref(), params.from, params.to)
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

/// GET /api/metrics/latest — last sample per container.
pub async fn latest_metrics(State(state): State<SharedState>) -> Json<Vec<Sample>> {
    Json(state.store.latest(None))
}

/// GET /api/stats — store and service introspection.
pub async fn agent_stats(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "hostname": state.hostname,
        "agentVersion": env!("CARGO_PKG_VERSION"),
        "psiSupported": state.psi.supported(),
        "containerCount": state.store.container_count(),
        "totalSnapshots": state.store.sample_count(),
        "timestamp": Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::runtime::serve::build_router;
    use crate::state::AgentState;
    use axum::body::Body;
    use axum::http::Request;
    use fabric::docker::RuntimeClient;
    use fabric::psi::PsiReader;
    use fabric::stats::model::{ContainerRecord, ContainerState, HealthState};
    use fabric::store::MetricsStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::util::ServiceExt;

    fn seed(store: &MetricsStore, container: &str, n: usize) {
        let t0 = Utc::now() - chrono::TimeDelta::minutes(5);
        for i in 0..n {
            let record = ContainerRecord {
                host_id: "local".to_string(),
                host_name: "node-a".to_string(),
                container_id: container.to_string(),
                container_name: format!("{container}-app"),
                state: ContainerState::Running,
                health_status: HealthState::None,
                is_running: true,
                is_paused: false,
                is_unhealthy: false,
            };
            let sample = Sample {
                host_id: "local".to_string(),
                host_name: "node-a".to_string(),
                container_id: container.to_string(),
                container_name: format!("{container}-app"),
                timestamp: t0 + chrono::TimeDelta::seconds(10 * i as i64),
                cpu_percent: 40.0,
                memory_bytes: 1024,
                memory_percent: 2.0,
                network_rx_bytes: 1,
                network_tx_bytes: 2,
                disk_read_bytes: 3,
                disk_write_bytes: 4,
                uptime_seconds: 5,
                is_running: true,
                is_paused: false,
                is_unhealthy: false,
                cpu_pressure: None,
                memory_pressure: None,
                io_pressure: None,
            };
            store.append(record, sample);
        }
    }

    async fn test_state() -> crate::state::SharedState {
        let dir = tempfile::tempdir().unwrap();
        let psi = PsiReader::detect(dir.path()).await;
        let (shutdown_tx, _) = watch::channel(false);
        let store = Arc::new(MetricsStore::new());
        seed(&store, "c1", 5);
        seed(&store, "c2", 3);
        Arc::new(AgentState {
            docker: RuntimeClient::remote("http://127.0.0.1:1").unwrap(),
            store,
            psi: Arc::new(psi),
            config: AgentConfig::default(),
            hostname: "test-host".to_string(),
            shutdown_tx,
        })
    }

    async fn get_json(state: crate::state::SharedState, uri: &str) -> Value {
        let app = build_router(state);
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success(), "GET {uri}");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn metrics_filter_limit_and_metadata() {
        let state = test_state().await;
        let body = get_json(state, "/api/metrics?containerId=c1&limit=2").await;

        assert_eq!(body["metadata"]["totalAvailable"], 5);
        let metrics = body["metrics"].as_array().unwrap();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|m| m["containerId"] == "c1"));
    }

    #[tokio::test]
    async fn metrics_field_selection_projects() {
        let state = test_state().await;
        let body = get_json(state, "/api/metrics?containerId=c1&fields=cpuPercent").await;
        let first = &body["metrics"][0];
        assert!(first.get("cpuPercent").is_some());
        assert!(first.get("hostId").is_some());
        assert!(first.get("memoryBytes").is_none());
    }

    #[tokio::test]
    async fn latest_returns_one_sample_per_container() {
        let state = test_state().await;
        let body = get_json(state, "/api/metrics/latest").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let state = test_state().await;
        let body = get_json(state, "/api/stats").await;
        assert_eq!(body["containerCount"], 2);
        assert_eq!(body["totalSnapshots"], 8);
        assert_eq!(body["psiSupported"], false);
        assert_eq!(body["hostname"], "test-host");
    }
}
