//! Health — per-host poll outcome bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Outcome of the most recent poll attempt against one host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostHealth {
    pub last_checked: DateTime<Utc>,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Host id → latest health. Entries are replaced whole per poll and
/// evicted when the registry drops the host.
#[derive(Default)]
pub struct HealthBoard {
    inner: DashMap<String, HostHealth>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_ok(&self, host_id: &str) {
        self.inner.insert(
            host_id.to_string(),
            HostHealth {
                last_checked: Utc::now(),
                healthy: true,
                last_error: None,
            },
        );
    }

    pub fn report_err(&self, host_id: &str, error: impl ToString) {
        self.inner.insert(
            host_id.to_string(),
            HostHealth {
                last_checked: Utc::now(),
                healthy: false,
                last_error: Some(error.to_string()),
            },
        );
    }

    pub fn get(&self, host_id: &str) -> Option<HostHealth> {
        self.inner.get(host_id).map(|e| e.value().clone())
    }

    /// Snapshot copy of the whole board.
    pub fn snapshot(&self) -> HashMap<String, HostHealth> {
        self.inner
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn remove(&self, host_id: &str) {
        self.inner.remove(host_id);
    }

    pub fn healthy_count(&self) -> usize {
        self.inner.iter().filter(|e| e.value().healthy).count()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
