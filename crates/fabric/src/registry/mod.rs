//! Registry — ordered host configurations with CRUD, disk persistence,
//! and a change-notification channel.
//!
//! The registry is passive storage: the poll supervisor subscribes to its
//! change events but never owns it, so the loop's lifecycle is independent
//! of any single host. All mutations are atomic (lock → mutate → persist →
//! release) and the file write is brief enough to happen under the lock.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::docker::{ControlAction, RuntimeClient};

const REGISTRY_FILE_VERSION: u32 = 1;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One monitored host. Ids are unique and stable; URLs are normalized
/// (no trailing slash). An empty URL means the local daemon socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
}

/// Operator-tunable settings persisted next to the host list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    pub poll_interval_seconds: u64,
    pub retention_hours: u64,
    pub trim_interval_minutes: u64,
    pub enable_container_controls: bool,
    /// `None` allows every verb; an explicit list restricts them.
    pub allowed_control_actions: Option<Vec<ControlAction>>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            retention_hours: 24,
            trim_interval_minutes: 5,
            enable_container_controls: false,
            allowed_control_actions: None,
        }
    }
}

impl RegistrySettings {
    pub fn action_allowed(&self, action: ControlAction) -> bool {
        match &self.allowed_control_actions {
            None => true,
            Some(allowed) => allowed.contains(&action),
        }
    }
}

/// Fields of a host that may change after creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub enabled: Option<bool>,
}

/// One registry mutation, broadcast to subscribers in mutation order.
#[derive(Debug, Clone, Default)]
pub struct HostChange {
    pub added: Vec<Host>,
    pub removed: Vec<Host>,
    pub updated: Vec<HostUpdate>,
}

#[derive(Debug, Clone)]
pub struct HostUpdate {
    pub before: Host,
    pub after: Host,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("host id already exists: {0}")]
    DuplicateId(String),
    #[error("unknown host: {0}")]
    UnknownHost(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryDoc {
    version: u32,
    settings: RegistrySettings,
    hosts: Vec<Host>,
}

pub struct HostRegistry {
    doc: Mutex<RegistryDoc>,
    path: Option<PathBuf>,
    events: broadcast::Sender<HostChange>,
}

impl HostRegistry {
    /// Load the registry from disk, falling back to an empty registry with
    /// the given default settings on a missing or unreadable file.
    pub fn load(path: impl Into<PathBuf>, defaults: RegistrySettings) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RegistryDoc>(&contents) {
                Ok(mut doc) => {
                    for host in &mut doc.hosts {
                        host.url = normalize_url(&host.url);
                    }
                    info!(path = %path.display(), hosts = doc.hosts.len(), "loaded host registry");
                    doc
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "host registry file is malformed, starting empty");
                    RegistryDoc {
                        version: REGISTRY_FILE_VERSION,
                        settings: defaults,
                        hosts: Vec::new(),
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDoc {
                version: REGISTRY_FILE_VERSION,
                settings: defaults,
                hosts: Vec::new(),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read host registry file, starting empty");
                RegistryDoc {
                    version: REGISTRY_FILE_VERSION,
                    settings: defaults,
                    hosts: Vec::new(),
                }
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            doc: Mutex::new(doc),
            path: Some(path),
            events,
        }
    }

    /// Registry without a backing file, for the agent's implicit local host
    /// and for tests.
    pub fn in_memory(settings: RegistrySettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            doc: Mutex::new(RegistryDoc {
                version: REGISTRY_FILE_VERSION,
                settings,
                hosts: Vec::new(),
            }),
            path: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostChange> {
        self.events.subscribe()
    }

    pub fn list(&self) -> Vec<Host> {
        self.doc.lock().hosts.clone()
    }

    pub fn get(&self, id: &str) -> Option<Host> {
        self.doc.lock().hosts.iter().find(|h| h.id == id).cloned()
    }

    /// Lookup by normalized URL, for the HTTP surface's duplicate checks.
    pub fn find_by_url(&self, url: &str) -> Option<Host> {
        let url = normalize_url(url);
        self.doc.lock().hosts.iter().find(|h| h.url == url).cloned()
    }

    pub fn settings(&self) -> RegistrySettings {
        self.doc.lock().settings.clone()
    }

    pub fn add(&self, mut host: Host) -> Result<Host, RegistryError> {
        host.url = normalize_url(&host.url);
        let mut doc = self.doc.lock();
        if doc.hosts.iter().any(|h| h.id == host.id) {
            return Err(RegistryError::DuplicateId(host.id));
        }
        doc.hosts.push(host.clone());
        self.persist(&doc);
        self.emit(HostChange {
            added: vec![host.clone()],
            ..Default::default()
        });
        info!(host_id = %host.id, url = %host.url, "host added");
        Ok(host)
    }

    pub fn update(&self, id: &str, patch: HostPatch) -> Result<Host, RegistryError> {
        let mut doc = self.doc.lock();
        let host = doc
            .hosts
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| RegistryError::UnknownHost(id.to_string()))?;

        let before = host.clone();
        if let Some(name) = patch.name {
            host.name = name;
        }
        if let Some(url) = patch.url {
            host.url = normalize_url(&url);
        }
        if let Some(enabled) = patch.enabled {
            host.enabled = enabled;
        }
        let after = host.clone();
        self.persist(&doc);
        self.emit(HostChange {
            updated: vec![HostUpdate {
                before,
                after: after.clone(),
            }],
            ..Default::default()
        });
        info!(host_id = %id, "host updated");
        Ok(after)
    }

    pub fn remove(&self, id: &str) -> Result<Host, RegistryError> {
        let mut doc = self.doc.lock();
        let position = doc
            .hosts
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| RegistryError::UnknownHost(id.to_string()))?;
        let host = doc.hosts.remove(position);
        self.persist(&doc);
        self.emit(HostChange {
            removed: vec![host.clone()],
            ..Default::default()
        });
        info!(host_id = %id, "host removed");
        Ok(host)
    }

    /// First-start convenience: when the registry is empty, probe the local
    /// daemon and seed a default host if it answers within the ping
    /// deadline.
    pub async fn seed_local_if_empty(&self, host_name: &str) {
        if !self.list().is_empty() {
            return;
        }
        let client = match RuntimeClient::local("") {
            Ok(client) => client,
            Err(e) => {
                info!(error = %e, "local docker daemon not reachable, skipping default host");
                return;
            }
        };
        if client.ping().await.is_err() {
            info!("local docker daemon did not answer ping, skipping default host");
            return;
        }
        let host = Host {
            id: "local".to_string(),
            name: host_name.to_string(),
            url: String::new(),
            enabled: true,
        };
        if self.add(host).is_ok() {
            info!("seeded registry with local docker host");
        }
    }

    fn emit(&self, change: HostChange) {
        // No subscribers yet is fine.
        let _ = self.events.send(change);
    }

    /// Write-through while holding the registry lock. Temp file + rename
    /// keeps the document whole even if the process dies mid-write.
    fn persist(&self, doc: &RegistryDoc) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomically(path, doc) {
            warn!(path = %path.display(), error = %e, "failed to persist host registry");
        }
    }
}

fn write_atomically(path: &Path, doc: &RegistryDoc) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

pub fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
