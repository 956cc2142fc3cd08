//! Route — container lifecycle verb handler across hosts.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use fabric::docker::{ControlAction, DockerError, RuntimeClient};
use fabric::registry::{Host, RegistrySettings};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlParams {
    pub host_id: Option<String>,
    /// Grace period for stop/restart, seconds.
    pub stop_grace: Option<u32>,
}

/// Check the control gates before any runtime call is made.
pub fn authorize(settings: &RegistrySettings, action: ControlAction) -> Result<(), String> {
    if !settings.enable_container_controls {
        return Err("container controls are disabled".to_string());
    }
    if !settings.action_allowed(action) {
        return Err(format!(
            "action '{action}' is not allowed by datasource settings"
        ));
    }
    Ok(())
}

/// The host a control verb targets: the named one, or the single enabled
/// host when only one is configured.
fn resolve_host(state: &AppState, host_id: Option<&str>) -> ApiResult<Host> {
    if let Some(id) = host_id {
        let host = state
            .registry
            .get(id)
            .ok_or_else(|| ApiError::NotFound(format!("unknown host: {id}")))?;
        if !host.enabled {
            return Err(ApiError::Validation(format!("host '{id}' is disabled")));
        }
        return Ok(host);
    }

    let mut enabled: Vec<Host> = state
        .registry
        .list()
        .into_iter()
        .filter(|h| h.enabled)
        .collect();
    match enabled.len() {
        0 => Err(ApiError::NotConfigured(
            "no enabled hosts configured".to_string(),
        )),
        1 => Ok(enabled.remove(0)),
        _ => Err(ApiError::Validation(
            "hostId is required when multiple hosts are configured".to_string(),
        )),
    }
}

/// POST /api/containers/{id}/{verb}?hostId=
pub async fn control_container(
    State(state): State<AppState>,
    Path((id, verb)): Path<(String, String)>,
    Query(params): Query<ControlParams>,
) -> ApiResult<Json<Value>> {
    let id = id.trim().to_string();
    if id.is_empty() {
        return Err(ApiError::Validation("containerId is required".to_string()));
    }
    let action: ControlAction = verb.parse().map_err(ApiError::Validation)?;

    authorize(&state.registry.settings(), action).map_err(ApiError::Validation)?;

    let host = resolve_host(&state, params.host_id.as_deref())?;
    let client = RuntimeClient::connect(&host.url)?;

    info!(host_id = %host.id, container_id = %id, action = %action, "applying container control");
    match client.control(&id, action, params.stop_grace).await {
        Ok(()) => Ok(Json(json!({
            "success": true,
            "action": action,
            "containerId": id,
        }))),
        Err(DockerError::NotFound(message)) => Err(ApiError::NotFound(message)),
        Err(e) => {
            warn!(host_id = %host.id, container_id = %id, error = %e, "container control failed");
            Ok(Json(json!({
                "success": false,
                "action": action,
                "containerId": id,
                "error": e.to_string(),
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_requires_enabled_controls() {
        let settings = RegistrySettings::default();
        assert_eq!(
            authorize(&settings, ControlAction::Start).unwrap_err(),
            "container controls are disabled"
        );
    }

    #[test]
    fn authorize_enforces_allow_list_with_exact_message() {
        let settings = RegistrySettings {
            enable_container_controls: true,
            allowed_control_actions: Some(vec![ControlAction::Start, ControlAction::Restart]),
            ..RegistrySettings::default()
        };
        assert!(authorize(&settings, ControlAction::Restart).is_ok());
        assert_eq!(
            authorize(&settings, ControlAction::Stop).unwrap_err(),
            "action 'stop' is not allowed by datasource settings"
        );
    }
}
