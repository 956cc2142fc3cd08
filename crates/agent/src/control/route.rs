//! Route — container lifecycle verb handler.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use fabric::docker::{ControlAction, DockerError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::control::map::authorize;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlParams {
    /// Grace period for stop/restart, seconds.
    pub stop_grace: Option<u32>,
}

/// POST /api/containers/{id}/{verb}
///
/// Validation failures (unknown verb, controls disabled, disallowed
/// action) return 400 before any runtime call. Runtime failures come back
/// as `success=false` with the error message; a container already in the
/// target state is a success.
pub async fn control_container(
    State(state): State<SharedState>,
    Path((id, verb)): Path<(String, String)>,
    Query(params): Query<ControlParams>,
) -> (StatusCode, Json<Value>) {
    let id = id.trim().to_string();
    if id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "containerId is required" })),
        );
    }

    let action: ControlAction = match verb.parse() {
        Ok(action) => action,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": message })));
        }
    };

    if let Err(message) = authorize(&state.config, action) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": message })));
    }

    info!(container_id = %id, action = %action, "applying container control");
    match state.docker.control(&id, action, params.stop_grace).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "action": action,
                "containerId": id,
            })),
        ),
        Err(DockerError::NotFound(message)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
        }
        Err(e) => {
            warn!(container_id = %id, action = %action, error = %e, "container control failed");
            (
                StatusCode::OK,
                Json(json!({
                    "success": false,
                    "action": action,
                    "containerId": id,
                    "error": e.to_string(),
                })),
            )
        }
    }
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
    use fabric::store::MetricsStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::sync::watch;
    use tower::util::ServiceExt;

    async fn test_state(config: AgentConfig) -> crate::state::SharedState {
        let dir = tempfile::tempdir().unwrap();
        let psi = PsiReader::detect(dir.path()).await;
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(AgentState {
            docker: RuntimeClient::remote("http://127.0.0.1:1").unwrap(),
            store: Arc::new(MetricsStore::new()),
            psi: Arc::new(psi),
            config,
            hostname: "test-host".to_string(),
            shutdown_tx,
        })
    }

    async fn post_verb(state: crate::state::SharedState, verb: &str) -> (StatusCode, Value) {
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::post(format!("/api/containers/c1/{verb}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn disallowed_action_is_rejected_before_any_runtime_call() {
        // The runtime endpoint is unreachable; a 400 (not a transport
        // failure) proves no call was attempted.
        let config = AgentConfig {
            enable_container_controls: true,
            allowed_control_actions: Some(vec![ControlAction::Start, ControlAction::Restart]),
            ..AgentConfig::default()
        };
        let (status, body) = post_verb(test_state(config).await, "stop").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "action 'stop' is not allowed by datasource settings"
        );
    }

    #[tokio::test]
    async fn controls_disabled_is_rejected() {
        let (status, body) = post_verb(test_state(AgentConfig::default()).await, "start").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "container controls are disabled");
    }

    #[tokio::test]
    async fn unknown_verb_is_rejected() {
        let config = AgentConfig {
            enable_container_controls: true,
            ..AgentConfig::default()
        };
        let (status, body) = post_verb(test_state(config).await, "destroy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid control action"));
    }

    #[tokio::test]
    async fn runtime_failure_reports_success_false() {
        let config = AgentConfig {
            enable_container_controls: true,
            ..AgentConfig::default()
        };
        let (status, body) = post_verb(test_state(config).await, "start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["action"], "start");
        assert!(body["error"].as_str().is_some());
    }
}
