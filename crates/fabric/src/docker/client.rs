//! Runtime client — core struct, constructors, error types.
//!
//! Wraps one bollard `Docker` handle for a single host. Local hosts talk
//! over the unix socket, remote hosts over HTTP. Every request carries the
//! 30 s client timeout; `ping` uses its own 2 s deadline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bollard::query_parameters::{
    ListContainersOptions, RestartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::Docker;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::StreamExt;

use super::map::{ContainerBrief, ContainerStatus};

/// Per-request timeout toward the runtime, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Deadline for liveness pings.
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period passed to stop/restart when the caller does not choose one.
pub const DEFAULT_STOP_GRACE_SECS: u32 = 10;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("malformed runtime response: {0}")]
    Decode(String),
    #[error("runtime transport error: {0}")]
    Transport(String),
}

impl DockerError {
    /// Transport errors fail a whole poll tick; decode and not-found
    /// errors only skip a single container.
    pub fn is_transport(&self) -> bool {
        matches!(self, DockerError::ConnectionFailed(_) | DockerError::Transport(_))
    }
}

impl From<bollard::errors::Error> for DockerError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, message } => {
                DockerError::NotFound(message)
            }
            bollard::errors::Error::JsonDataError { .. }
            | bollard::errors::Error::JsonSerdeError { .. } => DockerError::Decode(e.to_string()),
            other => DockerError::Transport(other.to_string()),
        }
    }
}

/// One of the five container lifecycle verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl ControlAction {
    pub const ALL: [ControlAction; 5] = [
        ControlAction::Start,
        ControlAction::Stop,
        ControlAction::Restart,
        ControlAction::Pause,
        ControlAction::Unpause,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Pause => "pause",
            ControlAction::Unpause => "unpause",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "pause" => Ok(ControlAction::Pause),
            "unpause" => Ok(ControlAction::Unpause),
            other => Err(format!("invalid control action: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeClient {
    client: Docker,
    endpoint: String,
}

impl RuntimeClient {
    /// Client for the local daemon. An empty path uses bollard's default
    /// socket resolution.
    pub fn local(socket_path: &str) -> Result<Self, DockerError> {
        let connection = if socket_path.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, REQUEST_TIMEOUT_SECS, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        };

        Ok(RuntimeClient {
            client: connection,
            endpoint: socket_path.to_string(),
        })
    }

    /// Client for a remote daemon reachable over HTTP.
    pub fn remote(base_url: &str) -> Result<Self, DockerError> {
        let connection =
            Docker::connect_with_http(base_url, REQUEST_TIMEOUT_SECS, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?;

        Ok(RuntimeClient {
            client: connection,
            endpoint: base_url.to_string(),
        })
    }

    /// Dispatch on the endpoint shape: empty or `unix://` endpoints are
    /// local sockets, everything else is treated as a remote base URL.
    pub fn connect(endpoint: &str) -> Result<Self, DockerError> {
        if endpoint.is_empty() || endpoint.starts_with("unix://") || endpoint.starts_with('/') {
            Self::local(endpoint)
        } else {
            Self::remote(endpoint)
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Liveness probe with a short dedicated deadline, so one dead host
    /// cannot stall a health sweep.
    pub async fn ping(&self) -> Result<(), DockerError> {
        match tokio::time::timeout(PING_TIMEOUT, self.client.ping()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DockerError::from(e)),
            Err(_) => Err(DockerError::Transport(format!(
                "ping timed out after {}s",
                PING_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Ordered container listing. `all` includes stopped containers.
    pub async fn list(&self, all: bool) -> Result<Vec<ContainerBrief>, DockerError> {
        let options = Some(ListContainersOptions {
            all,
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(ContainerBrief::from).collect())
    }

    /// One-shot stats snapshot (`stream=false`), the raw document consumed
    /// by derivation.
    pub async fn stats_once(
        &self,
        container_id: &str,
    ) -> Result<bollard::models::ContainerStatsResponse, DockerError> {
        let options = Some(StatsOptions {
            stream: false,
            ..Default::default()
        });
        let mut stream = self.client.stats(container_id, options);
        match stream.next().await {
            Some(result) => Ok(result?),
            None => Err(DockerError::Decode(format!(
                "empty stats response for container {container_id}"
            ))),
        }
    }

    pub async fn inspect(&self, container_id: &str) -> Result<ContainerStatus, DockerError> {
        let details = self.client.inspect_container(container_id, None).await?;
        Ok(ContainerStatus::from(details))
    }

    /// Apply a lifecycle verb. Stop and restart carry the grace period in
    /// the control request; `304 Not Modified` on start/stop means the
    /// container was already in the target state and counts as success.
    pub async fn control(
        &self,
        container_id: &str,
        action: ControlAction,
        stop_grace_secs: Option<u32>,
    ) -> Result<(), DockerError> {
        let grace = stop_grace_secs.unwrap_or(DEFAULT_STOP_GRACE_SECS);
        let result = match action {
            ControlAction::Start => self.client.start_container(container_id, None).await,
            ControlAction::Stop => {
                let options = Some(StopContainerOptions {
                    t: Some(grace as i32),
                    ..Default::default()
                });
                self.client.stop_container(container_id, options).await
            }
            ControlAction::Restart => {
                let options = Some(RestartContainerOptions {
                    t: Some(grace as i32),
                    ..Default::default()
                });
                self.client.restart_container(container_id, options).await
            }
            ControlAction::Pause => self.client.pause_container(container_id).await,
            ControlAction::Unpause => self.client.unpause_container(container_id).await,
        };

        classify_control_result(result)
    }

    /// Daemon hostname (docker system info).
    pub async fn hostname(&self) -> Result<Option<String>, DockerError> {
        let info = self.client.info().await.map_err(DockerError::from)?;
        Ok(info.name)
    }

    /// Daemon version string.
    pub async fn version(&self) -> Result<Option<String>, DockerError> {
        let version = self.client.version().await.map_err(DockerError::from)?;
        Ok(version.version)
    }
}

/// `304 Not Modified` means the container was already in the verb's target
/// state: an idempotent success, not a failure.
fn classify_control_result(result: Result<(), bollard::errors::Error>) -> Result<(), DockerError> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, message }) => {
            Err(DockerError::NotFound(message))
        }
        Err(e) => Err(DockerError::from(e)),
    }
}
