use crate::error::StoreError;
use crate::storage::record::{now_ms, TaskId};
use crate::storage::registry::ServerRegistry;
use crate::storage::store::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Background sweep returning expired `Working` tasks to `NotReady`.
pub struct LeaseReclaimer {
    store: Arc<TaskStore>,
    registry: Arc<ServerRegistry>,
    interval: Duration,
}

impl LeaseReclaimer {
    pub fn new(store: Arc<TaskStore>, registry: Arc<ServerRegistry>, interval: Duration) -> Self {
        Self {
            store,
            registry,
            interval,
        }
    }

    /// One pass over the store. Former owners are marked as presumed dead.
    pub async fn sweep_once(&self) -> Result<Vec<TaskId>, StoreError> {
        let reclaimed = self.store.reclaim_expired(now_ms()).await?;
        for (id, owner) in &reclaimed {
            self.registry.mark_dead(owner);
            info!(task_id = %id, worker = %owner, "Server presumed dead");
        }
        Ok(reclaimed.into_iter().map(|(id, _)| id).collect())
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            info!(interval = ?self.interval, "Lease reclaimer started");
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    error!(error = %e, "Lease sweep failed");
                }
            }
        })
    }
}
