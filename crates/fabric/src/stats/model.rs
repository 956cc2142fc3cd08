//! Model — wire types shared by the store, the poll loop, and the query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pressure Stall Information for one dimension (cpu, memory, or io):
/// `some`/`full` stall percentages averaged over 10/60/300 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pressure {
    pub some10: f64,
    pub some60: f64,
    pub some300: f64,
    pub full10: f64,
    pub full60: f64,
    pub full300: f64,
}

/// The three PSI dimensions for one container. A `None` dimension means the
/// source system does not expose pressure for it; a present dimension is
/// always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PsiSet {
    pub cpu: Option<Pressure>,
    pub memory: Option<Pressure>,
    pub io: Option<Pressure>,
}

/// One derived metric point for a container at a moment in time.
///
/// Counter fields (network, disk) are absolute monotonic values as reported
/// by the runtime; rate computation happens on the read side so the store
/// never loses information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub host_id: String,
    pub host_name: String,
    pub container_id: String,
    pub container_name: String,
    /// Moment of derivation, not the runtime-reported read time.
    pub timestamp: DateTime<Utc>,
    /// Normalized to number-of-CPUs × 100.
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub uptime_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_unhealthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub cpu_pressure: Option<Pressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub memory_pressure: Option<Pressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub io_pressure: Option<Pressure>,
}

/// Container runtime state. Unknown inputs normalize to `Invalid`,
/// missing inputs to `Undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Paused,
    Exited,
    Created,
    Dead,
    Restarting,
    Removing,
    Undefined,
    Invalid,
}

impl ContainerState {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => ContainerState::Undefined,
            Some(s) if s.is_empty() => ContainerState::Undefined,
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "running" => ContainerState::Running,
                "paused" => ContainerState::Paused,
                "exited" => ContainerState::Exited,
                "created" => ContainerState::Created,
                "dead" => ContainerState::Dead,
                "restarting" => ContainerState::Restarting,
                "removing" => ContainerState::Removing,
                _ => ContainerState::Invalid,
            },
        }
    }

    /// Paused is a sub-state of running in the runtime model.
    pub fn is_running(self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Paused)
    }

    pub fn is_paused(self) -> bool {
        matches!(self, ContainerState::Paused)
    }
}

/// Container health as reported by the runtime's healthcheck, or `None`
/// for containers without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Starting,
    None,
}

impl HealthState {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "healthy" => HealthState::Healthy,
            Some(s) if s == "unhealthy" => HealthState::Unhealthy,
            Some(s) if s == "starting" => HealthState::Starting,
            _ => HealthState::None,
        }
    }

    /// Docker's list API folds health into the human status text,
    /// e.g. `"Up 2 hours (healthy)"` or `"Up 5 seconds (health: starting)"`.
    pub fn from_status_text(status: &str) -> Self {
        if status.contains("(healthy)") {
            HealthState::Healthy
        } else if status.contains("(unhealthy)") {
            HealthState::Unhealthy
        } else if status.contains("health: starting") {
            HealthState::Starting
        } else {
            HealthState::None
        }
    }
}

/// Latest known identity and state for one container on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub host_id: String,
    pub host_name: String,
    pub container_id: String,
    pub container_name: String,
    pub state: ContainerState,
    pub health_status: HealthState,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_unhealthy: bool,
}

/// Stable field keys for every queryable sample value. Frames are tagged
/// with these keys so consumers recognize fields without parsing display
/// names. The pressure keys carry the `some10` average of their dimension.
pub const ALL_FIELDS: &[&str] = &[
    "cpuPercent",
    "memoryBytes",
    "memoryPercent",
    "networkRxBytes",
    "networkTxBytes",
    "diskReadBytes",
    "diskWriteBytes",
    "uptimeSeconds",
    "cpuPressure",
    "memoryPressure",
    "ioPressure",
];

/// Whether a field is byte-valued (frame values convert to MB).
pub fn field_is_bytes(key: &str) -> bool {
    matches!(
        key,
        "memoryBytes" | "networkRxBytes" | "networkTxBytes" | "diskReadBytes" | "diskWriteBytes"
    )
}

/// Human display name for a field key.
pub fn field_display_name(key: &str) -> &'static str {
    match key {
        "cpuPercent" => "CPU %",
        "memoryBytes" => "Memory (MB)",
        "memoryPercent" => "Memory %",
        "networkRxBytes" => "Network RX (MB)",
        "networkTxBytes" => "Network TX (MB)",
        "diskReadBytes" => "Disk Read (MB)",
        "diskWriteBytes" => "Disk Write (MB)",
        "uptimeSeconds" => "Uptime (s)",
        "cpuPressure" => "CPU Pressure %",
        "memoryPressure" => "Memory Pressure %",
        "ioPressure" => "I/O Pressure %",
        _ => "Unknown",
    }
}

/// Wire projection for field selection: identity fields plus the selected
/// value fields. Without a selection the full sample goes out.
pub fn project_sample(
    sample: &Sample,
    fields: Option<&std::collections::HashSet<&str>>,
) -> serde_json::Value {
    const IDENTITY_FIELDS: &[&str] = &[
        "hostId",
        "hostName",
        "containerId",
        "containerName",
        "timestamp",
    ];

    let full = serde_json::to_value(sample).unwrap_or(serde_json::Value::Null);
    let Some(fields) = fields else {
        return full;
    };

    match full {
        serde_json::Value::Object(source) => {
            let mut out = serde_json::Map::new();
            for (key, value) in source {
                if IDENTITY_FIELDS.contains(&key.as_str()) || fields.contains(key.as_str()) {
                    out.insert(key, value);
                }
            }
            serde_json::Value::Object(out)
        }
        other => other,
    }
}

/// Raw value of a field on a sample. `None` for pressure dimensions the
/// host does not expose, and for unknown keys.
pub fn field_value(sample: &Sample, key: &str) -> Option<f64> {
    match key {
        "cpuPercent" => Some(sample.cpu_percent),
        "memoryBytes" => Some(sample.memory_bytes as f64),
        "memoryPercent" => Some(sample.memory_percent),
        "networkRxBytes" => Some(sample.network_rx_bytes as f64),
        "networkTxBytes" => Some(sample.network_tx_bytes as f64),
        "diskReadBytes" => Some(sample.disk_read_bytes as f64),
        "diskWriteBytes" => Some(sample.disk_write_bytes as f64),
        "uptimeSeconds" => Some(sample.uptime_seconds as f64),
        "cpuPressure" => sample.cpu_pressure.map(|p| p.some10),
        "memoryPressure" => sample.memory_pressure.map(|p| p.some10),
        "ioPressure" => sample.io_pressure.map(|p| p.some10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_normalization() {
        assert_eq!(ContainerState::parse(Some("running")), ContainerState::Running);
        assert_eq!(ContainerState::parse(Some("Paused")), ContainerState::Paused);
        assert_eq!(ContainerState::parse(Some("EXITED")), ContainerState::Exited);
        assert_eq!(ContainerState::parse(Some("zombie")), ContainerState::Invalid);
        assert_eq!(ContainerState::parse(Some("")), ContainerState::Undefined);
        assert_eq!(ContainerState::parse(None), ContainerState::Undefined);
    }

    #[test]
    fn paused_is_running() {
        assert!(ContainerState::Paused.is_running());
        assert!(ContainerState::Paused.is_paused());
        assert!(ContainerState::Running.is_running());
        assert!(!ContainerState::Exited.is_running());
    }

    #[test]
    fn health_from_status_text() {
        assert_eq!(HealthState::from_status_text("Up 2 hours (healthy)"), HealthState::Healthy);
        assert_eq!(HealthState::from_status_text("Up 1 minute (unhealthy)"), HealthState::Unhealthy);
        assert_eq!(
            HealthState::from_status_text("Up 5 seconds (health: starting)"),
            HealthState::Starting
        );
        assert_eq!(HealthState::from_status_text("Up 2 hours"), HealthState::None);
        assert_eq!(HealthState::from_status_text("Exited (0) 3 days ago"), HealthState::None);
    }

    #[test]
    fn sample_wire_names_are_camel_case() {
        let sample = Sample {
            host_id: "h1".into(),
            host_name: "node-a".into(),
            container_id: "c1".into(),
            container_name: "web".into(),
            timestamp: Utc::now(),
            cpu_percent: 12.5,
            memory_bytes: 1024,
            memory_percent: 1.0,
            network_rx_bytes: 10,
            network_tx_bytes: 20,
            disk_read_bytes: 30,
            disk_write_bytes: 40,
            uptime_seconds: 5,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
            cpu_pressure: None,
            memory_pressure: None,
            io_pressure: None,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert!(json.get("hostId").is_some());
        assert!(json.get("networkRxBytes").is_some());
        assert!(json.get("isUnhealthy").is_some());
        // Absent pressure dimensions stay off the wire entirely.
        assert!(json.get("cpuPressure").is_none());
    }

    #[test]
    fn field_registry_covers_all_keys() {
        let sample = Sample {
            host_id: "h1".into(),
            host_name: "node-a".into(),
            container_id: "c1".into(),
            container_name: "web".into(),
            timestamp: Utc::now(),
            cpu_percent: 1.0,
            memory_bytes: 2,
            memory_percent: 3.0,
            network_rx_bytes: 4,
            network_tx_bytes: 5,
            disk_read_bytes: 6,
            disk_write_bytes: 7,
            uptime_seconds: 8,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
            cpu_pressure: Some(Pressure { some10: 9.0, ..Default::default() }),
            memory_pressure: None,
            io_pressure: None,
        };
        for key in ALL_FIELDS {
            if *key == "memoryPressure" || *key == "ioPressure" {
                assert!(field_value(&sample, key).is_none(), "{key} should be absent");
            } else {
                assert!(field_value(&sample, key).is_some(), "{key} should resolve");
            }
            assert_ne!(field_display_name(key), "Unknown");
        }
        assert_eq!(field_value(&sample, "cpuPressure"), Some(9.0));
        assert!(field_value(&sample, "bogus").is_none());
    }
}
