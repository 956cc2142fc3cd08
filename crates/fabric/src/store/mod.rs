//! Store — thread-safe per-(host, container) sample series with rolling
//! retention.
//!
//! Writers serialize per shard through the DashMap entry API; readers copy
//! snapshots out so callers never observe a series mid-append. No I/O
//! happens while a shard lock is held.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::stats::model::{ContainerRecord, Sample};

/// Series identity. Cross-host collisions on container id never merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub host_id: String,
    pub container_id: String,
}

struct Series {
    record: ContainerRecord,
    samples: Vec<Sample>,
}

/// In-memory metrics store shared read-write across the poll workers and
/// the query side.
#[derive(Default)]
pub struct MetricsStore {
    series: DashMap<StoreKey, Series>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample and refresh the container record for its key.
    /// Timestamps must be strictly increasing within a key; a stale sample
    /// is dropped rather than reordering the series.
    pub fn append(&self, record: ContainerRecord, sample: Sample) {
        let key = StoreKey {
            host_id: sample.host_id.clone(),
            container_id: sample.container_id.clone(),
        };
        let mut entry = self.series.entry(key).or_insert_with(|| Series {
            record: record.clone(),
            samples: Vec::new(),
        });
        if let Some(last) = entry.samples.last() {
            if sample.timestamp <= last.timestamp {
                debug!(
                    host_id = %sample.host_id,
                    container_id = %sample.container_id,
                    "dropping out-of-order sample"
                );
                return;
            }
        }
        entry.record = record;
        entry.samples.push(sample);
    }

    /// All samples matching the filters, ascending by timestamp. Absent
    /// filters select everything; a container filter without a host filter
    /// matches the container across all hosts. `from`/`to` are inclusive.
    pub fn query(
        &self,
        host_id: Option<&str>,
        container_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<Sample> {
        let mut out = Vec::new();
        for entry in self.series.iter() {
            let key = entry.key();
            if host_id.is_some_and(|h| h != key.host_id) {
                continue;
            }
            if container_id.is_some_and(|c| c != key.container_id) {
                continue;
            }
            for sample in &entry.samples {
                if from.is_some_and(|f| sample.timestamp < f) {
                    continue;
                }
                if to.is_some_and(|t| sample.timestamp > t) {
                    continue;
                }
                out.push(sample.clone());
            }
        }
        out.sort_by_key(|s| s.timestamp);
        out
    }

    /// Last sample per key, optionally restricted to one host.
    pub fn latest(&self, host_id: Option<&str>) -> Vec<Sample> {
        let mut out: Vec<Sample> = self
            .series
            .iter()
            .filter(|e| host_id.is_none_or(|h| h == e.key().host_id))
            .filter_map(|e| e.samples.last().cloned())
            .collect();
        out.sort_by(|a, b| {
            (&a.host_id, &a.container_name).cmp(&(&b.host_id, &b.container_name))
        });
        out
    }

    /// Latest known record per key, optionally restricted to one host.
    pub fn list_containers(&self, host_id: Option<&str>) -> Vec<ContainerRecord> {
        let mut out: Vec<ContainerRecord> = self
            .series
            .iter()
            .filter(|e| host_id.is_none_or(|h| h == e.key().host_id))
            .map(|e| e.record.clone())
            .collect();
        out.sort_by(|a, b| {
            (&a.host_id, &a.container_name).cmp(&(&b.host_id, &b.container_name))
        });
        out
    }

    /// Atomically drop every series belonging to a host. Returns the number
    /// of removed keys.
    pub fn remove_host(&self, host_id: &str) -> usize {
        let before = self.series.len();
        self.series.retain(|key, _| key.host_id != host_id);
        before - self.series.len()
    }

    /// Drop samples older than `now − window` and any key left empty.
    /// Returns the number of removed samples.
    pub fn trim(&self, now: DateTime<Utc>, window: TimeDelta) -> usize {
        let cutoff = now - window;
        let mut removed = 0;
        self.series.retain(|_, series| {
            let before = series.samples.len();
            series.samples.retain(|s| s.timestamp >= cutoff);
            removed += before - series.samples.len();
            !series.samples.is_empty()
        });
        removed
    }

    pub fn container_count(&self) -> usize {
        self.series.len()
    }

    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|e| e.samples.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::model::{ContainerState, HealthState};

    fn record(host: &str, container: &str) -> ContainerRecord {
        ContainerRecord {
            host_id: host.to_string(),
            host_name: format!("{host}-name"),
            container_id: container.to_string(),
            container_name: format!("{container}-name"),
            state: ContainerState::Running,
            health_status: HealthState::None,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
        }
    }

    fn sample(host: &str, container: &str, at: DateTime<Utc>) -> Sample {
        Sample {
            host_id: host.to_string(),
            host_name: format!("{host}-name"),
            container_id: container.to_string(),
            container_name: format!("{container}-name"),
            timestamp: at,
            cpu_percent: 1.0,
            memory_bytes: 100,
            memory_percent: 1.0,
            network_rx_bytes: 10,
            network_tx_bytes: 10,
            disk_read_bytes: 10,
            disk_write_bytes: 10,
            uptime_seconds: 60,
            is_running: true,
            is_paused: false,
            is_unhealthy: false,
            cpu_pressure: None,
            memory_pressure: None,
            io_pressure: None,
        }
    }

    fn seed(store: &MetricsStore, host: &str, container: &str, at: DateTime<Utc>) {
        store.append(record(host, container), sample(host, container, at));
    }

    #[test]
    fn query_is_ascending_and_inclusive() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        for i in [3, 1, 2] {
            // Appends must arrive in time order per key, so use two keys.
            seed(&store, "h1", &format!("c{i}"), t0 + TimeDelta::seconds(i));
        }
        let all = store.query(None, None, None, None);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        // Inclusive bounds.
        let ranged = store.query(
            None,
            None,
            Some(t0 + TimeDelta::seconds(1)),
            Some(t0 + TimeDelta::seconds(2)),
        );
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn append_drops_stale_timestamps() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        seed(&store, "h1", "c1", t0);
        seed(&store, "h1", "c1", t0); // same timestamp: dropped
        seed(&store, "h1", "c1", t0 - TimeDelta::seconds(5)); // older: dropped
        seed(&store, "h1", "c1", t0 + TimeDelta::seconds(5));
        assert_eq!(store.sample_count(), 2);
        let samples = store.query(Some("h1"), Some("c1"), None, None);
        assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn container_filter_spans_hosts_without_host_filter() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        seed(&store, "h1", "c1", t0);
        seed(&store, "h2", "c1", t0 + TimeDelta::seconds(1));
        seed(&store, "h2", "c2", t0 + TimeDelta::seconds(2));

        let spanning = store.query(None, Some("c1"), None, None);
        assert_eq!(spanning.len(), 2);

        let pinned = store.query(Some("h2"), Some("c1"), None, None);
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].host_id, "h2");
    }

    #[test]
    fn remove_host_purges_only_that_host() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        // Host h1: 5 samples across 2 containers.
        for i in 0..3 {
            seed(&store, "h1", "c1", t0 + TimeDelta::seconds(i));
        }
        for i in 0..2 {
            seed(&store, "h1", "c2", t0 + TimeDelta::seconds(i));
        }
        seed(&store, "h2", "c9", t0);

        let removed = store.remove_host("h1");
        assert_eq!(removed, 2);
        assert!(store.query(Some("h1"), None, None, None).is_empty());
        assert!(store.list_containers(Some("h1")).is_empty());
        assert_eq!(store.query(Some("h2"), None, None, None).len(), 1);
    }

    #[test]
    fn trim_enforces_retention_window() {
        let store = MetricsStore::new();
        let now = Utc::now();
        // Samples at t−25h, t−12h, t−1h against a 24h window.
        seed(&store, "h1", "c1", now - TimeDelta::hours(25));
        seed(&store, "h1", "c1", now - TimeDelta::hours(12));
        seed(&store, "h1", "c1", now - TimeDelta::hours(1));

        let removed = store.trim(now, TimeDelta::hours(24));
        assert_eq!(removed, 1);

        let survivors = store.query(Some("h1"), Some("c1"), None, None);
        assert_eq!(survivors.len(), 2);
        let cutoff = now - TimeDelta::hours(24);
        assert!(survivors.iter().all(|s| s.timestamp >= cutoff));

        // The window query returns exactly the survivors.
        let windowed = store.query(None, None, Some(cutoff), Some(now));
        assert_eq!(windowed, survivors);
    }

    #[test]
    fn trim_drops_empty_keys() {
        let store = MetricsStore::new();
        let now = Utc::now();
        seed(&store, "h1", "old", now - TimeDelta::hours(30));
        seed(&store, "h1", "new", now - TimeDelta::minutes(5));

        store.trim(now, TimeDelta::hours(24));
        assert_eq!(store.container_count(), 1);
        assert_eq!(store.list_containers(None)[0].container_id, "new");
    }

    #[test]
    fn latest_returns_last_sample_per_key() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        for i in 0..4 {
            seed(&store, "h1", "c1", t0 + TimeDelta::seconds(i));
        }
        seed(&store, "h1", "c2", t0);

        let latest = store.latest(Some("h1"));
        assert_eq!(latest.len(), 2);
        let c1 = latest.iter().find(|s| s.container_id == "c1").unwrap();
        assert_eq!(c1.timestamp, t0 + TimeDelta::seconds(3));
    }

    #[test]
    fn list_containers_reflects_latest_record() {
        let store = MetricsStore::new();
        let t0 = Utc::now();
        seed(&store, "h1", "c1", t0);
        // Same key, newer state.
        let mut newer = record("h1", "c1");
        newer.state = ContainerState::Paused;
        newer.is_paused = true;
        store.append(newer, sample("h1", "c1", t0 + TimeDelta::seconds(10)));

        let records = store.list_containers(Some("h1"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, ContainerState::Paused);
        assert!(records[0].is_paused);
    }
}
