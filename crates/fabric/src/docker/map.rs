//! Map — normalization of bollard models into fabric container types.

use bollard::models::{ContainerInspectResponse, ContainerSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stats::model::{ContainerRecord, ContainerState, HealthState};

/// Container identity and state as learned from the runtime's list API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerBrief {
    pub id: String,
    /// Without the leading slash.
    pub name: String,
    pub state: ContainerState,
    pub health: HealthState,
    pub status_text: String,
    pub created_at: i64,
}

impl From<ContainerSummary> for ContainerBrief {
    fn from(s: ContainerSummary) -> Self {
        let state = ContainerState::parse(s.state.map(|st| st.to_string()).as_deref());
        let status_text = s.status.unwrap_or_default();

        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/'))
                .unwrap_or("unknown")
                .to_string(),
            state,
            // The list API folds healthcheck results into the status text.
            health: HealthState::from_status_text(&status_text),
            status_text,
            created_at: s.created.unwrap_or_default(),
        }
    }
}

impl ContainerBrief {
    /// Record form of this container for the store and listing queries.
    pub fn to_record(&self, host_id: &str, host_name: &str) -> ContainerRecord {
        ContainerRecord {
            host_id: host_id.to_string(),
            host_name: host_name.to_string(),
            container_id: self.id.clone(),
            container_name: self.name.clone(),
            state: self.state,
            health_status: self.health,
            is_running: self.state.is_running(),
            is_paused: self.state.is_paused(),
            is_unhealthy: self.health == HealthState::Unhealthy,
        }
    }
}

/// Real-time state of one container from the runtime's inspect API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    pub status: ContainerState,
    pub running: bool,
    pub paused: bool,
    pub health: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl From<ContainerInspectResponse> for ContainerStatus {
    fn from(details: ContainerInspectResponse) -> Self {
        let state = details.state.as_ref();

        let status = ContainerState::parse(
            state
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string())
                .as_deref(),
        );

        let health = HealthState::parse(
            state
                .and_then(|s| s.health.as_ref())
                .and_then(|h| h.status.as_ref())
                .map(|s| s.to_string())
                .as_deref(),
        );

        let started_at = state
            .and_then(|s| s.started_at.as_deref())
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            // Docker reports the zero time for containers that never ran.
            .filter(|dt| dt.timestamp() > 0);

        Self {
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".into()),
            status,
            running: state.and_then(|s| s.running).unwrap_or(status.is_running()),
            paused: state.and_then(|s| s.paused).unwrap_or(status.is_paused()),
            health,
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerState as BollardState, ContainerStateStatusEnum};

    #[test]
    fn brief_from_summary_strips_name_slash() {
        let summary = ContainerSummary {
            id: Some("abc123".to_string()),
            names: Some(vec!["/web-1".to_string()]),
            status: Some("Up 2 hours (healthy)".to_string()),
            created: Some(1_700_000_000),
            ..Default::default()
        };
        let brief = ContainerBrief::from(summary);
        assert_eq!(brief.name, "web-1");
        assert_eq!(brief.health, HealthState::Healthy);
        assert_eq!(brief.created_at, 1_700_000_000);
        // Missing state normalizes to undefined, not invalid.
        assert_eq!(brief.state, ContainerState::Undefined);
    }

    #[test]
    fn brief_to_record_paused_container() {
        let summary = ContainerSummary {
            id: Some("abc".to_string()),
            names: Some(vec!["/db".to_string()]),
            state: Some(bollard::models::ContainerSummaryStateEnum::PAUSED),
            ..Default::default()
        };
        let record = ContainerBrief::from(summary).to_record("h1", "node-a");
        assert!(record.is_running, "paused is a running sub-state");
        assert!(record.is_paused);
        assert!(!record.is_unhealthy);
        assert_eq!(record.host_id, "h1");
    }

    #[test]
    fn status_from_inspect() {
        let details = ContainerInspectResponse {
            name: Some("/api".to_string()),
            state: Some(BollardState {
                status: Some(ContainerStateStatusEnum::RUNNING),
                running: Some(true),
                paused: Some(false),
                started_at: Some("2025-06-15T10:30:00.000000000Z".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = ContainerStatus::from(details);
        assert_eq!(status.name, "api");
        assert_eq!(status.status, ContainerState::Running);
        assert!(status.running);
        assert!(!status.paused);
        assert_eq!(status.started_at.unwrap().timestamp(), 1_749_983_400);
    }

    #[test]
    fn status_ignores_zero_start_time() {
        let details = ContainerInspectResponse {
            state: Some(BollardState {
                status: Some(ContainerStateStatusEnum::CREATED),
                started_at: Some("0001-01-01T00:00:00Z".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = ContainerStatus::from(details);
        assert!(status.started_at.is_none());
    }
}
