//! Boot — logging init, config load, docker connection, state creation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use fabric::docker::RuntimeClient;
use fabric::health::HealthBoard;
use fabric::poll::{run_trim, HostWorker};
use fabric::psi::PsiReader;
use fabric::registry::Host;
use fabric::store::MetricsStore;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AgentConfig;
use crate::state::{AgentState, SharedState};

/// Initialise the tracing / logging subsystem.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent=info,fabric=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load config, connect to docker, build shared state, and spawn the
/// background sampler and trim tasks.
pub async fn boot() -> anyhow::Result<(SharedState, AgentConfig)> {
    info!("Starting dockpulse agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Loaded configuration: port={}, poll_interval={}s, retention={}h",
        config.port, config.poll_interval_seconds, config.retention_hours
    );

    info!(
        "Connecting to docker daemon at: {}",
        if config.docker_socket.is_empty() {
            "default socket"
        } else {
            &config.docker_socket
        }
    );
    let docker = RuntimeClient::local(&config.docker_socket).inspect_err(|e| {
        error!("Failed to connect to docker: {}", e);
    })?;
    docker
        .ping()
        .await
        .context("docker daemon did not answer ping")?;
    info!("Successfully connected to docker daemon");

    let hostname = match docker.hostname().await {
        Ok(Some(name)) => name,
        _ => std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
    };

    let psi = Arc::new(PsiReader::detect(&config.cgroup_base).await);
    info!(supported = psi.supported(), "PSI reader initialised");

    let store = Arc::new(MetricsStore::new());
    let health = Arc::new(HealthBoard::new());
    let (shutdown_tx, _) = watch::channel(false);

    let state = Arc::new(AgentState {
        docker,
        store: Arc::clone(&store),
        psi: Arc::clone(&psi),
        config: config.clone(),
        hostname: hostname.clone(),
        shutdown_tx,
    });

    // The sampler worker for the implicit local host, with its own client.
    let local_host = Host {
        id: config.host_id.clone(),
        name: hostname,
        url: config.docker_socket.clone(),
        enabled: true,
    };
    let worker_client = RuntimeClient::local(&config.docker_socket).inspect_err(|e| {
        error!("Failed to create sampler docker client: {}", e);
    })?;
    let worker = HostWorker::new(
        local_host,
        worker_client,
        Arc::clone(&store),
        health,
        psi.supported().then(|| Arc::clone(&psi)),
        Duration::from_secs(config.poll_interval_seconds),
        state.shutdown_tx.subscribe(),
    );
    tokio::spawn(worker.run());
    info!(
        "Started local sampler (interval: {}s)",
        config.poll_interval_seconds
    );

    tokio::spawn(run_trim(
        store,
        TimeDelta::hours(config.retention_hours as i64),
        Duration::from_secs(config.trim_interval_minutes * 60),
        state.shutdown_tx.subscribe(),
    ));
    info!(
        "Started retention trim (window: {}h, every: {}min)",
        config.retention_hours, config.trim_interval_minutes
    );

    Ok((state, config))
}
