use thiserror::Error;

use crate::core::TaskStatus;

/// Errors surfaced by the task layer. Engine failures are never reported
/// through this type; they end up on the task record instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("invalid task id: {0}")]
    NotFound(String),

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}
