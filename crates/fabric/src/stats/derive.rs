//! Derive — pure conversion from raw runtime stats documents to samples.

use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};

use super::model::{PsiSet, Sample};

/// Per-sample metadata the stats document does not carry: host and
/// container identity plus state learned from the list/inspect APIs.
#[derive(Debug, Clone)]
pub struct SampleMeta<'a> {
    pub host_id: &'a str,
    pub host_name: &'a str,
    pub container_id: &'a str,
    pub container_name: &'a str,
    pub uptime_seconds: u64,
    pub is_unhealthy: bool,
}

/// Derive one sample from the previous and current raw stats documents.
///
/// CPU% spans the two documents; when no previous document exists yet
/// (first poll of a container) the daemon-populated `precpu_stats` inside
/// the current document is used instead. All other values read from the
/// current document alone. The sample timestamp is `now`, the moment of
/// derivation.
pub fn derive(
    prev: Option<&ContainerStatsResponse>,
    curr: &ContainerStatsResponse,
    meta: &SampleMeta<'_>,
    psi: Option<&PsiSet>,
    now: DateTime<Utc>,
) -> Sample {
    let (memory_bytes, memory_percent) = memory_usage(curr);
    let (network_rx_bytes, network_tx_bytes) = network_totals(curr);
    let (disk_read_bytes, disk_write_bytes) = blkio_totals(curr);
    let psi = psi.copied().unwrap_or_default();

    Sample {
        host_id: meta.host_id.to_string(),
        host_name: meta.host_name.to_string(),
        container_id: meta.container_id.to_string(),
        container_name: meta.container_name.to_string(),
        timestamp: now,
        cpu_percent: cpu_percent(prev, curr),
        memory_bytes,
        memory_percent,
        network_rx_bytes,
        network_tx_bytes,
        disk_read_bytes,
        disk_write_bytes,
        uptime_seconds: meta.uptime_seconds,
        is_running: true,
        is_paused: false,
        is_unhealthy: meta.is_unhealthy,
        cpu_pressure: psi.cpu,
        memory_pressure: psi.memory,
        io_pressure: psi.io,
    }
}

/// Sample for a paused container. Paused containers bypass derivation so
/// state transitions show up immediately: counter-like fields are zeroed
/// and `paused ⊂ running` holds.
pub fn paused_sample(meta: &SampleMeta<'_>, now: DateTime<Utc>) -> Sample {
    Sample {
        host_id: meta.host_id.to_string(),
        host_name: meta.host_name.to_string(),
        container_id: meta.container_id.to_string(),
        container_name: meta.container_name.to_string(),
        timestamp: now,
        cpu_percent: 0.0,
        memory_bytes: 0,
        memory_percent: 0.0,
        network_rx_bytes: 0,
        network_tx_bytes: 0,
        disk_read_bytes: 0,
        disk_write_bytes: 0,
        uptime_seconds: 0,
        is_running: true,
        is_paused: true,
        is_unhealthy: meta.is_unhealthy,
        cpu_pressure: None,
        memory_pressure: None,
        io_pressure: None,
    }
}

/// CPU percentage across two stats documents, normalized to #CPUs × 100.
///
/// Formula: `(Δcpu_total / Δsystem_cpu) × n_cpus × 100` where `n_cpus` is
/// `online_cpus` when present, else the per-cpu usage vector length, else 1.
/// A non-positive system delta or a negative cpu delta yields 0.
pub fn cpu_percent(prev: Option<&ContainerStatsResponse>, curr: &ContainerStatsResponse) -> f64 {
    let cpu_stats = match &curr.cpu_stats {
        Some(cpu) => cpu,
        None => return 0.0,
    };

    // Previous totals come from the prior document when we have one, else
    // from the daemon-populated precpu block of the current document.
    let prev_cpu_stats = match prev {
        Some(p) => p.cpu_stats.as_ref(),
        None => curr.precpu_stats.as_ref(),
    };
    let prev_cpu_stats = match prev_cpu_stats {
        Some(p) => p,
        None => return 0.0,
    };

    let cpu_total = cpu_stats
        .cpu_usage
        .as_ref()
        .and_then(|u| u.total_usage)
        .unwrap_or(0);
    let prev_total = prev_cpu_stats
        .cpu_usage
        .as_ref()
        .and_then(|u| u.total_usage)
        .unwrap_or(0);

    let cpu_delta = cpu_total.saturating_sub(prev_total) as f64;

    let sys_current = cpu_stats.system_cpu_usage.unwrap_or(0);
    let sys_previous = prev_cpu_stats.system_cpu_usage.unwrap_or(0);
    let system_delta = sys_current.saturating_sub(sys_previous) as f64;

    if system_delta > 0.0 && cpu_delta > 0.0 {
        let num_cpus = cpu_stats
            .online_cpus
            .filter(|&n| n > 0)
            .map(|n| n as f64)
            .or_else(|| {
                cpu_stats
                    .cpu_usage
                    .as_ref()
                    .and_then(|u| u.percpu_usage.as_ref())
                    .filter(|v| !v.is_empty())
                    .map(|v| v.len() as f64)
            })
            .unwrap_or(1.0);
        let pct = (cpu_delta / system_delta) * num_cpus * 100.0;
        if pct.is_finite() {
            pct
        } else {
            0.0
        }
    } else {
        0.0
    }
}

fn memory_usage(curr: &ContainerStatsResponse) -> (u64, f64) {
    let mem = match &curr.memory_stats {
        Some(m) => m,
        None => return (0, 0.0),
    };
    let usage = mem.usage.unwrap_or(0);
    let limit = mem.limit.unwrap_or(0);
    let percent = if limit > 0 {
        (usage as f64 / limit as f64) * 100.0
    } else {
        0.0
    };
    (usage, percent)
}

fn network_totals(curr: &ContainerStatsResponse) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;
    if let Some(networks) = &curr.networks {
        for net in networks.values() {
            rx += net.rx_bytes.unwrap_or(0);
            tx += net.tx_bytes.unwrap_or(0);
        }
    }
    (rx, tx)
}

fn blkio_totals(curr: &ContainerStatsResponse) -> (u64, u64) {
    let mut read = 0u64;
    let mut write = 0u64;
    if let Some(blkio) = &curr.blkio_stats {
        if let Some(entries) = &blkio.io_service_bytes_recursive {
            for entry in entries {
                let value = entry.value.unwrap_or(0);
                match entry.op.as_deref().map(|op| op.to_ascii_lowercase()) {
                    Some(op) if op == "read" => read += value,
                    Some(op) if op == "write" => write += value,
                    _ => {}
                }
            }
        }
    }
    (read, write)
}

/// Adjacent-pair rates over a monotonic counter series, in KB/s.
///
/// For each pair `(i, i+1)`: `max(0, Δv) / Δt / 1024`. A negative value
/// delta clamps to 0 (absorbs counter resets); a non-positive time delta
/// drops the point. The result is one element shorter than the input.
pub fn counter_rates(points: &[(DateTime<Utc>, u64)]) -> Vec<(DateTime<Utc>, f64)> {
    let mut rates = Vec::with_capacity(points.len().saturating_sub(1));
    for pair in points.windows(2) {
        let (t0, v0) = pair[0];
        let (t1, v1) = pair[1];
        let dt = (t1 - t0).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 {
            continue;
        }
        let delta = v1.saturating_sub(v0) as f64;
        rates.push((t1, delta / dt / 1024.0));
    }
    rates
}
