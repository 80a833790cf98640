use crate::storage::persistence::TaskPersistence;
use crate::storage::record::{TaskId, TaskRecord};
use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::warn;

/// Stores every record as JSON under one Redis hash, keyed by task id.
pub struct RedisPersistence {
    client: redis::Client,
    key: String,
}

impl RedisPersistence {
    pub fn new(client: redis::Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    pub fn open(url: &str, key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(redis::Client::open(url)?, key))
    }
}

#[async_trait]
impl TaskPersistence for RedisPersistence {
    async fn load_all(&self) -> Result<Vec<TaskRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: HashMap<String, String> = conn.hgetall(&self.key).await?;

        let mut records = Vec::with_capacity(raw.len());
        for (field, json) in raw {
            match serde_json::from_str::<TaskRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %self.key, %field, error = %e, "Skipping unreadable task record"),
            }
        }
        Ok(records)
    }

    async fn upsert(&self, record: &TaskRecord) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(record)?;
        let _: () = conn.hset(&self.key, record.id.0, json).await?;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.hdel(&self.key, id.0).await?;
        Ok(())
    }
}
