//! Model — the typed query contract and its frame output shapes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::docker::ControlAction;
use crate::stats::model::{ContainerState, HealthState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Metrics,
    Containers,
    Control,
}

/// Inclusive time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Whitelist,
    Blacklist,
}

/// Per-host container and field selection.
///
/// Whitelist: include a container iff it is listed; its field set is the
/// per-container entry when present, else every field. Blacklist: include
/// a container iff it is not listed; the field set is `metrics` when
/// non-empty, else every field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSelection {
    pub mode: SelectionMode,
    pub container_ids: Vec<String>,
    pub container_metrics: HashMap<String, Vec<String>>,
    pub metrics: Vec<String>,
}

/// The wire query. `host_selections` is the current shape; the flat
/// `host_ids`/`container_ids`/`container_name_pattern`/`metrics` fields are
/// the legacy equivalents and only consulted when `host_selections` is
/// empty. A `BTreeMap` keeps frame ordering deterministic across hosts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FabricQuery {
    pub query_type: QueryType,
    pub time_range: Option<TimeRange>,
    pub host_selections: BTreeMap<String, HostSelection>,
    pub host_ids: Vec<String>,
    pub container_ids: Vec<String>,
    pub container_name_pattern: Option<String>,
    pub metrics: Vec<String>,
    /// Only meaningful for control queries.
    pub control_action: Option<ControlAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameLabels {
    pub container_id: String,
    pub container_name: String,
    pub host_name: String,
}

/// One (container, field) time series: a time axis and a value axis,
/// tagged with the stable field key next to the human name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub name: String,
    pub field_key: String,
    pub labels: FrameLabels,
    pub times: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

/// The containers listing as one table of parallel columns.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainersFrame {
    pub container_id: Vec<String>,
    pub container_name: Vec<String>,
    pub host_id: Vec<String>,
    pub host_name: Vec<String>,
    pub state: Vec<ContainerState>,
    pub health_status: Vec<HealthState>,
    pub is_running: Vec<bool>,
    pub is_paused: Vec<bool>,
    pub is_unhealthy: Vec<bool>,
}

impl ContainersFrame {
    pub fn len(&self) -> usize {
        self.container_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container_id.is_empty()
    }
}
