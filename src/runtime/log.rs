use std::sync::Arc;
use tokio::sync::Mutex;

/// Append-only execution log shared by the pool tasks of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct ExpressionLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl ExpressionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, line: impl Into<String>) {
        self.lines.lock().await.push(line.into());
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    /// Lines joined in append order, one per line.
    pub async fn text(&self) -> String {
        self.lines.lock().await.join("\n")
    }
}
