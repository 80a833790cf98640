use crate::error::StoreError;
use crate::storage::persistence::TaskPersistence;
use crate::storage::record::{now_ms, TaskId, TaskOutcome, TaskRecord, TaskStatus};
use anyhow::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// In-memory task map guarded by the lease state machine, mirrored into a
/// [`TaskPersistence`] backend.
///
/// Every status check-and-transition happens while the record's map entry
/// is locked, so two callers can never both observe `NotReady` and move the
/// same task to `Working`. Each mutation also holds the task's write lock
/// from transition until its backend write returns, so writes for one task
/// reach the backend in the order they were applied in memory.
pub struct TaskStore {
    records: DashMap<TaskId, TaskRecord>,
    write_locks: DashMap<TaskId, Arc<Mutex<()>>>,
    persistence: Arc<dyn TaskPersistence>,
    next_id: AtomicU64,
    lease: Duration,
}

impl TaskStore {
    /// Opens the store and warms it from the backend.
    pub async fn open(persistence: Arc<dyn TaskPersistence>, lease: Duration) -> Result<Self> {
        let loaded = persistence.load_all().await?;
        let records = DashMap::new();
        let mut max_id = 0;
        for record in loaded {
            max_id = max_id.max(record.id.0);
            records.insert(record.id, record);
        }
        info!(tasks = records.len(), "Task store loaded");

        Ok(Self {
            records,
            write_locks: DashMap::new(),
            persistence,
            next_id: AtomicU64::new(max_id + 1),
            lease,
        })
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub async fn submit(&self, text: &str, user_id: i64) -> Result<TaskId, StoreError> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = TaskRecord::new(id, text, user_id);
        let lock = self.write_lock(id);
        let _write = lock.lock().await;
        self.records.insert(id, record.clone());
        self.persist(&record).await?;
        info!(task_id = %id, user_id, expression = text, "Task submitted");
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Another user's task is reported as missing.
    pub fn get_for_user(&self, user_id: i64, id: TaskId) -> Result<TaskRecord, StoreError> {
        match self.get(id) {
            Ok(record) if record.user_id == user_id => Ok(record),
            _ => Err(StoreError::NotFound(id)),
        }
    }

    /// `NotReady` tasks in id order.
    pub fn list_pending(&self) -> Vec<TaskRecord> {
        self.collect_sorted(|r| r.status == TaskStatus::NotReady)
    }

    pub fn list_for_user(&self, user_id: i64) -> Vec<TaskRecord> {
        self.collect_sorted(|r| r.user_id == user_id)
    }

    /// Tasks the worker holds now or held last.
    pub fn list_by_server(&self, worker: &str) -> Vec<TaskRecord> {
        self.collect_sorted(|r| r.server_name.as_deref() == Some(worker))
    }

    pub fn list_by_server_for_user(&self, user_id: i64, worker: &str) -> Vec<TaskRecord> {
        self.collect_sorted(|r| r.user_id == user_id && r.server_name.as_deref() == Some(worker))
    }

    pub fn list_all(&self) -> Vec<TaskRecord> {
        self.collect_sorted(|_| true)
    }

    pub async fn delete(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        let lock = self.write_lock(id);
        let _write = lock.lock().await;
        let (_, record) = self.records.remove(&id).ok_or(StoreError::NotFound(id))?;
        let deleted = self.persistence.delete(id).await;
        self.write_locks.remove(&id);
        deleted.map_err(|e| {
            error!(task_id = %id, error = %e, "Failed to delete task from persistence");
            StoreError::Persistence(e)
        })?;
        info!(task_id = %id, "Task deleted");
        Ok(record)
    }

    /// Atomically moves a `NotReady` task to `Working` under `worker`.
    /// `Ok(false)` means someone else got there first or the task is done.
    pub async fn claim(&self, id: TaskId, worker: &str) -> Result<bool, StoreError> {
        let lock = self.write_lock(id);
        let _write = lock.lock().await;
        let claimed = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if entry.status != TaskStatus::NotReady {
                debug!(task_id = %id, worker, status = ?entry.status, "Claim lost");
                return Ok(false);
            }
            entry.status = TaskStatus::Working;
            entry.lease_owner = Some(worker.to_string());
            entry.server_name = Some(worker.to_string());
            entry.lease_expires_at = Some(self.lease_deadline());
            entry.clone()
        };

        self.persist(&claimed).await?;
        info!(task_id = %id, worker, "Task claimed");
        Ok(true)
    }

    /// Extends the lease of a task `worker` currently owns. Returns the new
    /// expiry.
    pub async fn heartbeat(&self, id: TaskId, worker: &str) -> Result<u64, StoreError> {
        let lock = self.write_lock(id);
        let _write = lock.lock().await;
        let extended = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if !entry.is_owned_by(worker) {
                warn!(task_id = %id, worker, status = ?entry.status, "Stale heartbeat rejected");
                return Err(StoreError::Stale { id, status: entry.status });
            }
            entry.lease_expires_at = Some(self.lease_deadline());
            entry.clone()
        };

        self.persist(&extended).await?;
        debug!(task_id = %id, worker, "Lease extended");
        Ok(extended.lease_expires_at.unwrap_or_default())
    }

    /// Records the terminal outcome of a task `worker` currently owns.
    pub async fn report_result(&self, id: TaskId, worker: &str, outcome: TaskOutcome) -> Result<TaskRecord, StoreError> {
        let lock = self.write_lock(id);
        let _write = lock.lock().await;
        let finished = {
            let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if !entry.is_owned_by(worker) {
                warn!(task_id = %id, worker, status = ?entry.status, "Stale result rejected");
                return Err(StoreError::Stale { id, status: entry.status });
            }
            entry.status = outcome.status();
            match outcome {
                TaskOutcome::Ready { answer, log } => {
                    entry.answer = answer;
                    entry.log = log;
                }
                TaskOutcome::Error { log } => entry.log = log,
            }
            entry.lease_owner = None;
            entry.lease_expires_at = None;
            entry.completed_at = Some(now_ms());
            entry.clone()
        };

        self.persist(&finished).await?;
        info!(task_id = %id, worker, status = ?finished.status, answer = finished.answer, "Result recorded");
        Ok(finished)
    }

    /// Returns every `Working` task whose lease ended at or before `now` to
    /// `NotReady`. Yields the reclaimed ids with their former owners.
    pub async fn reclaim_expired(&self, now: u64) -> Result<Vec<(TaskId, String)>, StoreError> {
        let mut candidates: Vec<TaskId> = self
            .records
            .iter()
            .filter(|r| r.lease_expired(now))
            .map(|r| *r.key())
            .collect();
        candidates.sort();

        let mut reclaimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            let lock = self.write_lock(id);
            let _write = lock.lock().await;

            // Re-checked under the lock: a heartbeat or report may have won.
            let (record, owner) = {
                let Some(mut entry) = self.records.get_mut(&id) else {
                    continue;
                };
                if !entry.lease_expired(now) {
                    continue;
                }
                let owner = entry.lease_owner.take().unwrap_or_default();
                entry.status = TaskStatus::NotReady;
                entry.lease_expires_at = None;
                (entry.clone(), owner)
            };

            self.persist(&record).await?;
            warn!(task_id = %id, worker = %owner, "Lease expired, task reclaimed");
            reclaimed.push((id, owner));
        }
        Ok(reclaimed)
    }

    fn write_lock(&self, id: TaskId) -> Arc<Mutex<()>> {
        self.write_locks.entry(id).or_default().value().clone()
    }

    fn lease_deadline(&self) -> u64 {
        now_ms() + self.lease.as_millis() as u64
    }

    fn collect_sorted(&self, filter: impl Fn(&TaskRecord) -> bool) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .records
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    async fn persist(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.persistence.upsert(record).await.map_err(|e| {
            error!(task_id = %record.id, error = %e, "Failed to persist task");
            StoreError::Persistence(e)
        })
    }
}
