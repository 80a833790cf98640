use crate::storage::record::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors raised while compiling or evaluating a single expression, plus
/// configuration validation failures.
///
/// Everything except `Config` is local to one evaluation: the worker turns it
/// into the task's terminal `Error` outcome instead of crashing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("{message}, pos: {position}")]
    Parse { position: usize, message: String },

    #[error("not enough arguments for operator, pos: {position} (need 2 numbers for an operator)")]
    Arity { position: usize },

    #[error("malformed expression: {dangling} operands left unconsumed")]
    MalformedRpn { dangling: usize },

    #[error("division by zero in operation {index}")]
    DivisionByZero { index: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("evaluation aborted: {0}")]
    Aborted(String),
}

impl CalcError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the task lease protocol.
///
/// `Stale` and `NotFound` are recoverable control flow for the caller.
/// `Unavailable` marks a transient failure of whatever transport sits between
/// a worker and the coordinator and is worth retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} is {status:?}, request rejected as stale")]
    Stale { id: TaskId, status: TaskStatus },

    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
