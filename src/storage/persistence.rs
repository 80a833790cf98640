use crate::storage::record::{TaskId, TaskRecord};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// --- Interface ---

/// Durable backend behind the task store. Called on every mutation so memory
/// and storage stay in step.
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    async fn load_all(&self) -> Result<Vec<TaskRecord>>;
    async fn upsert(&self, record: &TaskRecord) -> Result<()>;
    async fn delete(&self, id: TaskId) -> Result<()>;
}

// --- In-Memory Implementation ---

pub struct InMemoryPersistence {
    records: DashMap<TaskId, TaskRecord>,
    writes: AtomicUsize,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Pre-populated backend, for warm-start scenarios.
    pub fn with_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        let persistence = Self::new();
        for record in records {
            persistence.records.insert(record.id, record);
        }
        persistence
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Number of upserts and deletes seen so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskPersistence for InMemoryPersistence {
    async fn load_all(&self) -> Result<Vec<TaskRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn upsert(&self, record: &TaskRecord) -> Result<()> {
        self.records.insert(record.id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        self.records.remove(&id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
