use crate::storage::record::now_ms;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct ServerEntry {
    status: Option<String>,
    last_seen: u64,
}

/// Known worker identities and their free-text status. Observational only.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: DashMap<String, ServerEntry>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str) {
        let mut entry = self.servers.entry(name.to_string()).or_default();
        entry.last_seen = now_ms();
    }

    /// Known identities, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn set_status(&self, name: &str, status: impl Into<String>) {
        let status = status.into();
        debug!(worker = name, %status, "Server status updated");
        let mut entry = self.servers.entry(name.to_string()).or_default();
        entry.status = Some(status);
        entry.last_seen = now_ms();
    }

    pub fn status(&self, name: &str) -> Option<String> {
        self.servers.get(name).and_then(|e| e.status.clone())
    }

    pub fn last_seen(&self, name: &str) -> Option<u64> {
        self.servers.get(name).map(|e| e.last_seen)
    }

    /// Annotates a worker whose lease ran out.
    pub fn mark_dead(&self, name: &str) {
        if let Some(mut entry) = self.servers.get_mut(name) {
            entry.status = Some(format!("server {} is not alive", name));
        }
    }
}
