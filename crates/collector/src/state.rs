use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use fabric::health::HealthBoard;
use fabric::poll::{run_trim, PollSupervisor};
use fabric::query::QueryEngine;
use fabric::registry::HostRegistry;
use fabric::store::MetricsStore;
use tracing::info;

use crate::config::CollectorConfig;

/// Shared application state (thread-safe)
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CollectorConfig>,
    pub registry: Arc<HostRegistry>,
    pub store: Arc<MetricsStore>,
    pub health: Arc<HealthBoard>,
    pub engine: Arc<QueryEngine>,
    pub hostname: String,
    /// Watch channel for shutdown signaling: receivers always see the
    /// latest value even when they subscribe late.
    pub shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: CollectorConfig) -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        let registry = Arc::new(HostRegistry::load(
            &config.registry.file_path,
            config.settings.clone(),
        ));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HealthBoard::new());
        let engine = Arc::new(QueryEngine::new(Arc::clone(&store)));
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "collector".to_string());

        Self {
            config: Arc::new(config),
            registry,
            store,
            health,
            engine,
            hostname,
            shutdown_tx,
        }
    }

    /// Seed the registry if configured, then start the poll supervisor and
    /// the retention trim task.
    pub async fn initialize(&self) {
        info!("Initializing application state...");

        if self.config.registry.seed_local {
            self.registry.seed_local_if_empty(&self.hostname).await;
        }

        let supervisor = PollSupervisor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.health),
            self.shutdown_tx.subscribe(),
        );
        tokio::spawn(supervisor.run());

        let settings = self.registry.settings();
        tokio::spawn(run_trim(
            Arc::clone(&self.store),
            TimeDelta::hours(settings.retention_hours as i64),
            Duration::from_secs(settings.trim_interval_minutes * 60),
            self.shutdown_tx.subscribe(),
        ));

        info!(
            hosts = self.registry.list().len(),
            retention_hours = settings.retention_hours,
            "application state initialized"
        );
    }

    /// Signal shutdown to all background tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
