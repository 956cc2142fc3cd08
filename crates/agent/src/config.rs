use std::path::Path;

use fabric::docker::ControlAction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub port: u16,
    /// Empty means bollard's default local socket resolution.
    pub docker_socket: String,
    pub host_id: String,
    pub poll_interval_seconds: u64,
    pub retention_hours: u64,
    pub trim_interval_minutes: u64,
    pub enable_container_controls: bool,
    /// `None` allows every verb once controls are enabled.
    pub allowed_control_actions: Option<Vec<ControlAction>>,
    pub cgroup_base: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            docker_socket: String::new(),
            host_id: "local".to_string(),
            poll_interval_seconds: 10,
            retention_hours: 6,
            trim_interval_minutes: 5,
            enable_container_controls: false,
            allowed_control_actions: None,
            cgroup_base: "/sys/fs/cgroup".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from file or environment variables.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = std::env::var("AGENT_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/dockpulse/agent.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!(
                "Config file not found at {}, using environment variables",
                config_path
            );
            Self::from_env()
        };

        // Environment variables override file config for critical settings
        if let Ok(port) = std::env::var("AGENT_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            config.docker_socket = socket;
        }
        if let Ok(base) = std::env::var("AGENT_CGROUP_BASE") {
            config.cgroup_base = base;
        }

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("AGENT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            docker_socket: std::env::var("DOCKER_SOCKET").unwrap_or(defaults.docker_socket),
            host_id: std::env::var("AGENT_HOST_ID").unwrap_or(defaults.host_id),
            poll_interval_seconds: std::env::var("AGENT_POLL_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_seconds),
            retention_hours: std::env::var("AGENT_RETENTION_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retention_hours),
            trim_interval_minutes: std::env::var("AGENT_TRIM_INTERVAL_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.trim_interval_minutes),
            enable_container_controls: std::env::var("AGENT_ENABLE_CONTROLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enable_container_controls),
            allowed_control_actions: std::env::var("AGENT_ALLOWED_ACTIONS")
                .ok()
                .map(|csv| parse_actions(&csv)),
            cgroup_base: std::env::var("AGENT_CGROUP_BASE").unwrap_or(defaults.cgroup_base),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.host_id.is_empty() {
            return Err("host_id must not be empty".to_string());
        }
        if self.poll_interval_seconds == 0 {
            return Err("poll_interval_seconds must be > 0".to_string());
        }
        if self.retention_hours == 0 {
            return Err("retention_hours must be > 0".to_string());
        }
        if self.trim_interval_minutes == 0 {
            return Err("trim_interval_minutes must be > 0".to_string());
        }
        Ok(())
    }

    pub fn action_allowed(&self, action: ControlAction) -> bool {
        match &self.allowed_control_actions {
            None => true,
            Some(allowed) => allowed.contains(&action),
        }
    }
}

fn parse_actions(csv: &str) -> Vec<ControlAction> {
    csv.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse::<ControlAction>() {
                Ok(action) => Some(action),
                Err(e) => {
                    tracing::warn!(action = part, "{e}, ignoring");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = AgentConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.poll_interval_seconds, 10);
        assert_eq!(config.retention_hours, 6);
        assert_eq!(config.trim_interval_minutes, 5);
        assert!(!config.enable_container_controls);
        assert!(config.allowed_control_actions.is_none());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut config = AgentConfig::default();
        config.poll_interval_seconds = 0;
        assert!(config.validate().unwrap_err().contains("poll_interval"));

        let mut config = AgentConfig::default();
        config.retention_hours = 0;
        assert!(config.validate().unwrap_err().contains("retention_hours"));

        let mut config = AgentConfig::default();
        config.trim_interval_minutes = 0;
        assert!(config.validate().unwrap_err().contains("trim_interval"));
    }

    #[test]
    fn file_round_trip_with_partial_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "port = 6100\nretention_hours = 12\nenable_container_controls = true\n\
             allowed_control_actions = [\"start\", \"restart\"]\n",
        )
        .unwrap();

        let config = AgentConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 6100);
        assert_eq!(config.retention_hours, 12);
        // Unspecified keys keep defaults.
        assert_eq!(config.poll_interval_seconds, 10);
        assert!(config.action_allowed(ControlAction::Start));
        assert!(!config.action_allowed(ControlAction::Stop));
    }

    #[test]
    fn action_csv_parsing_skips_invalid_entries() {
        let actions = parse_actions("start, stop, selfdestruct,");
        assert_eq!(actions, vec![ControlAction::Start, ControlAction::Stop]);
    }

    #[test]
    fn default_allows_every_action() {
        let config = AgentConfig::default();
        for action in ControlAction::ALL {
            assert!(config.action_allowed(action));
        }
    }
}
