//! Map — control gating shared by the HTTP handlers.

use fabric::docker::ControlAction;

use crate::config::AgentConfig;

/// Check the control gates before any runtime call is made.
pub fn authorize(config: &AgentConfig, action: ControlAction) -> Result<(), String> {
    if !config.enable_container_controls {
        return Err("container controls are disabled".to_string());
    }
    if !config.action_allowed(action) {
        return Err(format!(
            "action '{action}' is not allowed by datasource settings"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_controls_block_everything() {
        let config = AgentConfig::default();
        let err = authorize(&config, ControlAction::Start).unwrap_err();
        assert_eq!(err, "container controls are disabled");
    }

    #[test]
    fn allow_list_blocks_with_exact_message() {
        let config = AgentConfig {
            enable_container_controls: true,
            allowed_control_actions: Some(vec![ControlAction::Start, ControlAction::Restart]),
            ..AgentConfig::default()
        };
        assert!(authorize(&config, ControlAction::Start).is_ok());
        assert!(authorize(&config, ControlAction::Restart).is_ok());
        let err = authorize(&config, ControlAction::Stop).unwrap_err();
        assert_eq!(err, "action 'stop' is not allowed by datasource settings");
    }

    #[test]
    fn enabled_without_list_allows_all() {
        let config = AgentConfig {
            enable_container_controls: true,
            ..AgentConfig::default()
        };
        for action in ControlAction::ALL {
            assert!(authorize(&config, action).is_ok());
        }
    }
}
