use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Coordinator-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    NotReady,
    Working,
    Ready,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Error)
    }
}

/// One submitted expression and its lease state.
///
/// `lease_expires_at` and `lease_owner` are only set while the task is
/// `Working`. `server_name` remembers the last worker that claimed the task
/// and survives both completion and reclamation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub text: String,
    pub answer: f64,
    pub log: String,
    pub status: TaskStatus,
    pub lease_expires_at: Option<u64>,
    pub lease_owner: Option<String>,
    pub server_name: Option<String>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
    pub user_id: i64,
}

impl TaskRecord {
    pub fn new(id: TaskId, text: impl Into<String>, user_id: i64) -> Self {
        Self {
            id,
            text: text.into(),
            answer: 0.0,
            log: String::new(),
            status: TaskStatus::NotReady,
            lease_expires_at: None,
            lease_owner: None,
            server_name: None,
            created_at: now_ms(),
            completed_at: None,
            user_id,
        }
    }

    pub fn is_owned_by(&self, worker: &str) -> bool {
        self.status == TaskStatus::Working && self.lease_owner.as_deref() == Some(worker)
    }

    pub fn lease_expired(&self, now: u64) -> bool {
        self.status == TaskStatus::Working && self.lease_expires_at.is_some_and(|expires| expires <= now)
    }
}

/// What a worker reports when it finishes a claimed task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Ready { answer: f64, log: String },
    Error { log: String },
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Ready { .. } => TaskStatus::Ready,
            TaskOutcome::Error { .. } => TaskStatus::Error,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
