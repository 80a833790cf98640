//! Coordinator-side service: the logical operations workers and clients call,
//! on top of the task store, the server registry and the operator timings.

use crate::config::CoordinatorConfig;
use crate::error::{CalcError, StoreError};
use crate::runtime::exec_time::{SharedExecTimes, TimingMap};
use crate::storage::persistence::TaskPersistence;
use crate::storage::reclaimer::LeaseReclaimer;
use crate::storage::record::{TaskId, TaskOutcome, TaskRecord};
use crate::storage::registry::ServerRegistry;
use crate::storage::store::TaskStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// The coordinator as seen by a calculation server. A remote transport
/// implements this too and reports its failures as
/// [`StoreError::Unavailable`].
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_pending(&self) -> Result<Vec<TaskRecord>, StoreError>;
    async fn claim(&self, id: TaskId, worker: &str) -> Result<bool, StoreError>;
    async fn heartbeat(&self, id: TaskId, worker: &str, status: &str) -> Result<(), StoreError>;
    async fn report_result(&self, id: TaskId, worker: &str, outcome: TaskOutcome) -> Result<(), StoreError>;
    async fn operator_timings(&self) -> Result<TimingMap, StoreError>;
}

/// Per-worker observability row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputingPower {
    pub server_name: String,
    pub task_ids: Vec<TaskId>,
    pub status: String,
}

pub struct Coordinator {
    store: Arc<TaskStore>,
    registry: Arc<ServerRegistry>,
    timings: SharedExecTimes,
}

impl Coordinator {
    pub fn new(store: Arc<TaskStore>, timings: SharedExecTimes) -> Self {
        Self {
            store,
            registry: Arc::new(ServerRegistry::new()),
            timings,
        }
    }

    /// Opens the store on `persistence` with the configured lease and
    /// default timings.
    pub async fn open(persistence: Arc<dyn TaskPersistence>, config: &CoordinatorConfig) -> anyhow::Result<Self> {
        let timings = SharedExecTimes::new(config.exec_times()?);
        let store = TaskStore::open(persistence, config.lease()).await?;
        Ok(Self::new(Arc::new(store), timings))
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub async fn submit(&self, text: &str, user_id: i64) -> Result<TaskId, StoreError> {
        self.store.submit(text, user_id).await
    }

    pub fn get(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.store.get(id)
    }

    pub fn get_for_user(&self, user_id: i64, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.store.get_for_user(user_id, id)
    }

    pub fn list_for_user(&self, user_id: i64) -> Vec<TaskRecord> {
        self.store.list_for_user(user_id)
    }

    pub fn list_by_owner(&self, worker: &str) -> Vec<TaskRecord> {
        self.store.list_by_server(worker)
    }

    /// Like [`Coordinator::list_by_owner`], restricted to one user's tasks.
    pub fn list_by_owner_for_user(&self, user_id: i64, worker: &str) -> Vec<TaskRecord> {
        self.store.list_by_server_for_user(user_id, worker)
    }

    pub async fn delete(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.store.delete(id).await
    }

    /// Partial update; unnamed operators keep their timing.
    pub async fn set_operator_timings(&self, timings: &TimingMap) -> Result<(), CalcError> {
        self.timings.apply(timings).await?;
        info!(?timings, "Operator timings updated");
        Ok(())
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn computing_powers(&self) -> Vec<ComputingPower> {
        self.registry
            .list()
            .into_iter()
            .map(|server_name| ComputingPower {
                task_ids: self.store.list_by_server(&server_name).iter().map(|r| r.id).collect(),
                status: self
                    .registry
                    .status(&server_name)
                    .unwrap_or_else(|| "unknown".to_string()),
                server_name,
            })
            .collect()
    }

    pub fn spawn_reclaimer(&self, interval: Duration) -> JoinHandle<()> {
        LeaseReclaimer::new(self.store.clone(), self.registry.clone(), interval).spawn()
    }
}

#[async_trait]
impl TaskSource for Coordinator {
    async fn list_pending(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.store.list_pending())
    }

    async fn claim(&self, id: TaskId, worker: &str) -> Result<bool, StoreError> {
        let claimed = self.store.claim(id, worker).await?;
        if claimed {
            self.registry.register(worker);
        }
        Ok(claimed)
    }

    async fn heartbeat(&self, id: TaskId, worker: &str, status: &str) -> Result<(), StoreError> {
        self.store.heartbeat(id, worker).await?;
        self.registry.set_status(worker, status);
        Ok(())
    }

    async fn report_result(&self, id: TaskId, worker: &str, outcome: TaskOutcome) -> Result<(), StoreError> {
        let record = self.store.report_result(id, worker, outcome).await?;
        self.registry.register(worker);
        self.registry.set_status(
            worker,
            format!("server {} finished calculating {}", worker, record.text),
        );
        Ok(())
    }

    async fn operator_timings(&self) -> Result<TimingMap, StoreError> {
        Ok(self.timings.snapshot().await.to_millis_map())
    }
}
