use std::sync::Arc;

use fabric::docker::RuntimeClient;
use fabric::psi::PsiReader;
use fabric::store::MetricsStore;
use tokio::sync::watch;

use crate::config::AgentConfig;

pub struct AgentState {
    /// Client for the HTTP surface. The poll worker owns its own separate
    /// client.
    pub docker: RuntimeClient,
    pub store: Arc<MetricsStore>,
    pub psi: Arc<PsiReader>,
    pub config: AgentConfig,
    pub hostname: String,
    /// Watch channel for shutdown signaling: receivers always see the
    /// latest value even when they subscribe late.
    pub shutdown_tx: watch::Sender<bool>,
}

impl AgentState {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub type SharedState = Arc<AgentState>;
