//! Engine — resolves selections against the store and shapes frames.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::registry::Host;
use crate::stats::model::{
    field_display_name, field_is_bytes, field_value, Sample, ALL_FIELDS,
};
use crate::store::MetricsStore;

use super::model::{
    ContainersFrame, FabricQuery, Frame, FrameLabels, HostSelection, SelectionMode,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("no enabled hosts configured")]
    NoHosts,
    #[error("no metrics selected")]
    NoMetrics,
}

pub struct QueryEngine {
    store: Arc<MetricsStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<MetricsStore>) -> Self {
        Self { store }
    }

    /// Metrics query: one frame per (container, selected field) pair.
    /// Byte-valued fields convert to MB; frames with no points are omitted.
    pub fn metrics(&self, query: &FabricQuery, hosts: &[Host]) -> Result<Vec<Frame>, QueryError> {
        let selections = resolve_selections(query, hosts)?;
        let pattern = compile_pattern(query.container_name_pattern.as_deref());
        let (from, to) = match query.time_range {
            Some(range) => (Some(range.from), Some(range.to)),
            None => (None, None),
        };

        let mut frames = Vec::new();
        for (host, selection) in &selections {
            let samples = self.store.query(Some(&host.id), None, from, to);

            // Group by container, preserving a stable order.
            let mut by_container: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
            for sample in &samples {
                by_container
                    .entry(sample.container_id.as_str())
                    .or_default()
                    .push(sample);
            }

            for (container_id, series) in by_container {
                let included = match selection.mode {
                    SelectionMode::Whitelist => {
                        selection.container_ids.iter().any(|c| c == container_id)
                    }
                    SelectionMode::Blacklist => {
                        !selection.container_ids.iter().any(|c| c == container_id)
                    }
                };
                if !included {
                    continue;
                }
                if let Some(pattern) = &pattern {
                    if !pattern.is_match(&series[0].container_name) {
                        continue;
                    }
                }

                for field_key in selected_fields(selection, container_id) {
                    if let Some(frame) = build_frame(&series, &field_key) {
                        frames.push(frame);
                    }
                }
            }
        }
        Ok(frames)
    }

    /// Containers query: one frame of parallel columns over the latest
    /// known record per key.
    pub fn containers(
        &self,
        query: &FabricQuery,
        hosts: &[Host],
    ) -> Result<ContainersFrame, QueryError> {
        let selections = resolve_containers_hosts(query, hosts)?;

        let mut frame = ContainersFrame::default();
        for host in &selections {
            for record in self.store.list_containers(Some(&host.id)) {
                frame.container_id.push(record.container_id);
                frame.container_name.push(record.container_name);
                frame.host_id.push(record.host_id);
                frame.host_name.push(record.host_name);
                frame.state.push(record.state);
                frame.health_status.push(record.health_status);
                frame.is_running.push(record.is_running);
                frame.is_paused.push(record.is_paused);
                frame.is_unhealthy.push(record.is_unhealthy);
            }
        }
        Ok(frame)
    }
}

/// Resolve the query to (host, selection) pairs against the enabled hosts.
/// Selections naming unknown or disabled hosts are logged and skipped.
fn resolve_selections<'a>(
    query: &FabricQuery,
    hosts: &'a [Host],
) -> Result<Vec<(&'a Host, HostSelection)>, QueryError> {
    let enabled: Vec<&Host> = hosts.iter().filter(|h| h.enabled).collect();

    let resolved: Vec<(&Host, HostSelection)> = if !query.host_selections.is_empty() {
        query
            .host_selections
            .iter()
            .filter_map(|(host_id, selection)| {
                match enabled.iter().find(|h| &h.id == host_id) {
                    Some(host) => Some((*host, selection.clone())),
                    None => {
                        warn!(host_id, "query names an unknown or disabled host, skipping");
                        None
                    }
                }
            })
            .collect()
    } else {
        // Legacy shape: explicit metrics list, flat host and container ids.
        if query.metrics.is_empty() {
            return Err(QueryError::NoMetrics);
        }
        let selection = HostSelection {
            mode: if query.container_ids.is_empty() {
                SelectionMode::Blacklist
            } else {
                SelectionMode::Whitelist
            },
            container_ids: query.container_ids.clone(),
            container_metrics: Default::default(),
            metrics: query.metrics.clone(),
        };
        legacy_hosts(query, &enabled)
            .into_iter()
            .map(|host| (host, selection.clone()))
            .collect()
    };

    if resolved.is_empty() {
        return Err(QueryError::NoHosts);
    }
    Ok(resolved)
}

fn resolve_containers_hosts<'a>(
    query: &FabricQuery,
    hosts: &'a [Host],
) -> Result<Vec<&'a Host>, QueryError> {
    let enabled: Vec<&Host> = hosts.iter().filter(|h| h.enabled).collect();
    let resolved: Vec<&Host> = if !query.host_selections.is_empty() {
        enabled
            .iter()
            .filter(|h| query.host_selections.contains_key(&h.id))
            .copied()
            .collect()
    } else {
        legacy_hosts(query, &enabled)
    };
    if resolved.is_empty() {
        return Err(QueryError::NoHosts);
    }
    Ok(resolved)
}

fn legacy_hosts<'a>(query: &FabricQuery, enabled: &[&'a Host]) -> Vec<&'a Host> {
    if query.host_ids.is_empty() {
        enabled.to_vec()
    } else {
        enabled
            .iter()
            .filter(|h| query.host_ids.iter().any(|id| id == &h.id))
            .copied()
            .collect()
    }
}

/// Field set for one container under a selection, filtered to known keys.
fn selected_fields(selection: &HostSelection, container_id: &str) -> Vec<String> {
    let chosen: Vec<String> = match selection.mode {
        SelectionMode::Whitelist => match selection.container_metrics.get(container_id) {
            Some(fields) => fields.clone(),
            None => ALL_FIELDS.iter().map(|f| f.to_string()).collect(),
        },
        SelectionMode::Blacklist => {
            if selection.metrics.is_empty() {
                ALL_FIELDS.iter().map(|f| f.to_string()).collect()
            } else {
                selection.metrics.clone()
            }
        }
    };
    chosen
        .into_iter()
        .filter(|key| {
            let known = ALL_FIELDS.contains(&key.as_str());
            if !known {
                warn!(field = %key, "ignoring unknown metric field");
            }
            known
        })
        .collect()
}

/// Invalid legacy patterns are logged and ignored, never fail the query.
fn compile_pattern(pattern: Option<&str>) -> Option<Regex> {
    let pattern = pattern?;
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "invalid container name pattern, ignoring");
            None
        }
    }
}

fn build_frame(series: &[&Sample], field_key: &str) -> Option<Frame> {
    let mut times = Vec::new();
    let mut values = Vec::new();
    for sample in series {
        if let Some(raw) = field_value(sample, field_key) {
            times.push(sample.timestamp);
            values.push(if field_is_bytes(field_key) {
                raw / BYTES_PER_MB
            } else {
                raw
            });
        }
    }
    if times.is_empty() {
        return None;
    }
    let last = series.last()?;
    Some(Frame {
        name: field_display_name(field_key).to_string(),
        field_key: field_key.to_string(),
        labels: FrameLabels {
            container_id: last.container_id.clone(),
            container_name: last.container_name.clone(),
            host_name: last.host_name.clone(),
        },
        times,
        values,
    })
}
