//! Worker — sequential per-container gather loop for one host.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::docker::{ContainerBrief, DockerError, RuntimeClient};
use crate::health::HealthBoard;
use crate::psi::PsiReader;
use crate::registry::Host;
use crate::stats::model::ContainerState;
use crate::stats::{derive, paused_sample, SampleMeta};
use crate::store::MetricsStore;

/// Per-container state carried across ticks: the previous raw stats
/// document (for deltas) and the cached start time (for uptime). Neither
/// outlives the container's presence in the list.
#[derive(Default)]
struct ContainerTrack {
    prev_stats: Option<ContainerStatsResponse>,
    started_at: Option<DateTime<Utc>>,
    was_running: bool,
}

/// One poll worker. Owns its runtime client exclusively; gathers containers
/// sequentially within a tick so per-container deltas stay well-defined and
/// memory stays bounded. Overrunning ticks are skipped, never queued.
pub struct HostWorker {
    host: Host,
    client: RuntimeClient,
    store: Arc<MetricsStore>,
    health: Arc<HealthBoard>,
    psi: Option<Arc<PsiReader>>,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
    tracks: HashMap<String, ContainerTrack>,
}

impl HostWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Host,
        client: RuntimeClient,
        store: Arc<MetricsStore>,
        health: Arc<HealthBoard>,
        psi: Option<Arc<PsiReader>>,
        poll_interval: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            host,
            client,
            store,
            health,
            psi,
            poll_interval,
            stop,
            tracks: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        info!(host_id = %self.host.id, url = %self.host.url, "poll worker started");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(count) => {
                            self.health.report_ok(&self.host.id);
                            debug!(host_id = %self.host.id, samples = count, "poll tick complete");
                        }
                        Err(e) => {
                            warn!(host_id = %self.host.id, error = %e, "poll tick failed");
                            self.health.report_err(&self.host.id, &e);
                        }
                    }
                }
                result = self.stop.changed() => {
                    if result.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!(host_id = %self.host.id, "poll worker stopped");
    }

    fn stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// One tick: list, then gather each listed container in order.
    /// Transport errors fail the tick; decode and not-found errors only
    /// skip the container they hit.
    async fn poll_once(&mut self) -> Result<usize, DockerError> {
        let containers = self.client.list(false).await?;

        let mut seen = HashSet::new();
        let mut appended = 0;
        for brief in &containers {
            // Cancellation is observed between containers.
            if self.stopping() {
                break;
            }
            seen.insert(brief.id.clone());
            match self.gather(brief).await {
                Ok(true) => appended += 1,
                Ok(false) => {}
                Err(e) if e.is_transport() => return Err(e),
                Err(DockerError::NotFound(_)) => {
                    // Removed mid-poll; the next list will reflect it.
                    self.tracks.remove(&brief.id);
                }
                Err(e) => {
                    warn!(
                        host_id = %self.host.id,
                        container_id = %brief.id,
                        error = %e,
                        "skipping container this tick"
                    );
                }
            }
        }

        // Forget containers that left the listing so a reused id starts
        // from a clean delta baseline.
        self.tracks.retain(|id, _| seen.contains(id));
        Ok(appended)
    }

    async fn gather(&mut self, brief: &ContainerBrief) -> Result<bool, DockerError> {
        let now = Utc::now();
        let record = brief.to_record(&self.host.id, &self.host.name);
        let is_unhealthy = record.is_unhealthy;

        if brief.state.is_paused() {
            // Paused containers bypass derivation entirely so the state
            // transition is visible immediately.
            let meta = self.meta(brief, 0, is_unhealthy);
            let sample = paused_sample(&meta, now);
            self.store.append(record, sample);
            if let Some(track) = self.tracks.get_mut(&brief.id) {
                track.was_running = false;
            }
            return Ok(true);
        }

        if brief.state != ContainerState::Running {
            return Ok(false);
        }

        // The list API has no start timestamp, so inspect once when a
        // container first shows up running and cache started_at.
        let needs_inspect = match self.tracks.get(&brief.id) {
            Some(track) => track.started_at.is_none() || !track.was_running,
            None => true,
        };
        let inspected_start = if needs_inspect {
            self.client.inspect(&brief.id).await?.started_at
        } else {
            None
        };

        let curr = self.client.stats_once(&brief.id).await?;

        let psi = match &self.psi {
            Some(reader) => Some(reader.read(&brief.id).await),
            None => None,
        };

        let track = self.tracks.entry(brief.id.clone()).or_default();
        if needs_inspect {
            track.started_at = inspected_start;
        }
        track.was_running = true;

        let uptime_seconds = track
            .started_at
            .map(|started| (now - started).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let meta = SampleMeta {
            host_id: &self.host.id,
            host_name: &self.host.name,
            container_id: &brief.id,
            container_name: &brief.name,
            uptime_seconds,
            is_unhealthy,
        };
        let sample = derive(track.prev_stats.as_ref(), &curr, &meta, psi.as_ref(), now);
        track.prev_stats = Some(curr);

        self.store.append(record, sample);
        Ok(true)
    }

    fn meta<'a>(&'a self, brief: &'a ContainerBrief, uptime: u64, is_unhealthy: bool) -> SampleMeta<'a> {
        SampleMeta {
            host_id: &self.host.id,
            host_name: &self.host.name,
            container_id: &brief.id,
            container_name: &brief.name,
            uptime_seconds: uptime,
            is_unhealthy,
        }
    }
}
