//! Supervisor — keeps exactly one worker per enabled host.
//!
//! Subscribes to registry change events and starts, restarts, or drains
//! workers accordingly. A drained host's samples and health entry are
//! purged right after its worker finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::docker::RuntimeClient;
use crate::health::HealthBoard;
use crate::poll::worker::HostWorker;
use crate::registry::{Host, HostChange, HostRegistry};
use crate::store::MetricsStore;

struct WorkerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct PollSupervisor {
    registry: Arc<HostRegistry>,
    store: Arc<MetricsStore>,
    health: Arc<HealthBoard>,
    shutdown: watch::Receiver<bool>,
    events: broadcast::Receiver<HostChange>,
}

impl PollSupervisor {
    /// Subscribes to registry events immediately so nothing mutated between
    /// construction and task start is missed.
    pub fn new(
        registry: Arc<HostRegistry>,
        store: Arc<MetricsStore>,
        health: Arc<HealthBoard>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let events = registry.subscribe();
        Self {
            registry,
            store,
            health,
            shutdown,
            events,
        }
    }

    pub async fn run(mut self) {
        // Take the construction-time receiver out so its buffered events
        // survive into the loop.
        let mut events = {
            let placeholder = self.registry.subscribe();
            std::mem::replace(&mut self.events, placeholder)
        };
        let mut workers: HashMap<String, WorkerHandle> = HashMap::new();

        for host in self.registry.list() {
            if host.enabled {
                self.start_worker(&mut workers, host);
            }
        }
        info!(workers = workers.len(), "poll supervisor started");

        loop {
            tokio::select! {
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(change) => self.apply(&mut workers, change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "registry event stream lagged, resyncing workers");
                        self.resync(&mut workers).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        // Shutdown: drain every worker but keep the store intact.
        for (host_id, handle) in workers.drain() {
            stop_worker(handle, &host_id).await;
        }
        info!("poll supervisor stopped");
    }

    /// Apply one registry change. Events arrive in mutation order and are
    /// processed sequentially.
    async fn apply(&self, workers: &mut HashMap<String, WorkerHandle>, change: HostChange) {
        for host in change.added {
            if host.enabled {
                self.start_worker(workers, host);
            }
        }

        for update in change.updated {
            let running = workers.contains_key(&update.after.id);
            if update.after.enabled {
                if !running {
                    self.start_worker(workers, update.after);
                } else if update.before.url != update.after.url {
                    // New endpoint, same identity: swap the worker but keep
                    // the host's samples.
                    self.retire(workers, &update.after.id, false).await;
                    self.start_worker(workers, update.after);
                }
            } else if running {
                self.retire(workers, &update.after.id, true).await;
            }
        }

        for host in change.removed {
            self.retire(workers, &host.id, true).await;
        }
    }

    /// Full reconciliation against the registry, used after event loss.
    async fn resync(&self, workers: &mut HashMap<String, WorkerHandle>) {
        let desired: HashMap<String, Host> = self
            .registry
            .list()
            .into_iter()
            .filter(|h| h.enabled)
            .map(|h| (h.id.clone(), h))
            .collect();

        let stale: Vec<String> = workers
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        for host_id in stale {
            self.retire(workers, &host_id, true).await;
        }

        for (host_id, host) in desired {
            if !workers.contains_key(&host_id) {
                self.start_worker(workers, host);
            }
        }
    }

    fn start_worker(&self, workers: &mut HashMap<String, WorkerHandle>, host: Host) {
        if workers.contains_key(&host.id) {
            return;
        }
        let client = match RuntimeClient::connect(&host.url) {
            Ok(client) => client,
            Err(e) => {
                warn!(host_id = %host.id, url = %host.url, error = %e, "cannot build runtime client");
                self.health.report_err(&host.id, &e);
                return;
            }
        };

        let poll_interval =
            Duration::from_secs(self.registry.settings().poll_interval_seconds.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = HostWorker::new(
            host.clone(),
            client,
            Arc::clone(&self.store),
            Arc::clone(&self.health),
            None,
            poll_interval,
            stop_rx,
        );
        let task = tokio::spawn(worker.run());
        workers.insert(host.id, WorkerHandle { stop: stop_tx, task });
    }

    /// Drain a worker; with `purge` the host's samples and health entry go
    /// with it.
    async fn retire(&self, workers: &mut HashMap<String, WorkerHandle>, host_id: &str, purge: bool) {
        if let Some(handle) = workers.remove(host_id) {
            stop_worker(handle, host_id).await;
        }
        if purge {
            let dropped = self.store.remove_host(host_id);
            self.health.remove(host_id);
            debug!(host_id, dropped, "purged host after removal");
        }
    }
}

async fn stop_worker(handle: WorkerHandle, host_id: &str) {
    let _ = handle.stop.send(true);
    if handle.task.await.is_err() {
        warn!(host_id, "poll worker panicked");
    }
}

/// Periodic retention trim, independent of poll ticks.
pub async fn run_trim(
    store: Arc<MetricsStore>,
    retention: TimeDelta,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = store.trim(Utc::now(), retention);
                if removed > 0 {
                    debug!(removed, "trimmed expired samples");
                }
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HostPatch, RegistrySettings};
    use crate::stats::model::{ContainerRecord, ContainerState, HealthState, Sample};

    fn seed_sample(store: &MetricsStore, host: &str, container: &str) {
        let record = ContainerRecord {
            host_id: host.to_string(),
            host_name: host.to_string(),
            container_id: container.to_string(),
            container_name: container.to_string(),
            state: ContainerState::Running,
            health_status: HealthState::None,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
        };
        let sample = Sample {
            host_id: host.to_string(),
            host_name: host.to_string(),
            container_id: container.to_string(),
            container_name: container.to_string(),
            timestamp: Utc::now(),
            cpu_percent: 0.0,
            memory_bytes: 0,
            memory_percent: 0.0,
            network_rx_bytes: 0,
            network_tx_bytes: 0,
            disk_read_bytes: 0,
            disk_write_bytes: 0,
            uptime_seconds: 0,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
            cpu_pressure: None,
            memory_pressure: None,
            io_pressure: None,
        };
        store.append(record, sample);
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn removal_event_purges_host_data() {
        let registry = Arc::new(HostRegistry::in_memory(RegistrySettings::default()));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HealthBoard::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Unreachable endpoint: the worker exists but every tick fails.
        registry
            .add(Host {
                id: "h1".to_string(),
                name: "node-a".to_string(),
                url: "http://127.0.0.1:1".to_string(),
                enabled: true,
            })
            .unwrap();
        seed_sample(&store, "h1", "c1");
        health.report_ok("h1");

        let supervisor = PollSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&health),
            shutdown_rx,
        );
        let task = tokio::spawn(supervisor.run());

        registry.remove("h1").unwrap();
        let store_probe = Arc::clone(&store);
        let health_probe = Arc::clone(&health);
        assert!(
            wait_for(move || {
                store_probe.container_count() == 0 && health_probe.get("h1").is_none()
            })
            .await,
            "host data must be purged after the removal event"
        );

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disable_event_purges_and_enable_restarts() {
        let registry = Arc::new(HostRegistry::in_memory(RegistrySettings::default()));
        let store = Arc::new(MetricsStore::new());
        let health = Arc::new(HealthBoard::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        registry
            .add(Host {
                id: "h1".to_string(),
                name: "node-a".to_string(),
                url: "http://127.0.0.1:1".to_string(),
                enabled: true,
            })
            .unwrap();

        let supervisor = PollSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&health),
            shutdown_rx,
        );
        let task = tokio::spawn(supervisor.run());

        // The worker's first failing tick marks the host unhealthy.
        let health_probe = Arc::clone(&health);
        assert!(wait_for(move || health_probe.get("h1").is_some()).await);

        seed_sample(&store, "h1", "c1");
        registry
            .update("h1", HostPatch { enabled: Some(false), ..Default::default() })
            .unwrap();
        let store_probe = Arc::clone(&store);
        let health_probe = Arc::clone(&health);
        assert!(
            wait_for(move || {
                store_probe.container_count() == 0 && health_probe.get("h1").is_none()
            })
            .await,
            "disable must drain and purge"
        );

        registry
            .update("h1", HostPatch { enabled: Some(true), ..Default::default() })
            .unwrap();
        let health_probe = Arc::clone(&health);
        assert!(
            wait_for(move || health_probe.get("h1").is_some()).await,
            "re-enable must start a fresh worker"
        );

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
