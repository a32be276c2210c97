//! Error types for Consilium

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid case: {0}")]
    Validation(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("submission failed for task {task_id}: {message}")]
    Submission { task_id: String, message: String },

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("poll timeout: task {task_id} not terminal after {attempts} attempts")]
    PollTimeout { task_id: String, attempts: u32 },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("executor error: {0}")]
    Executor(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn submission(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Submission {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Timeouts and missing tasks are caller-side conditions; the task itself is unaffected.
    pub fn is_caller_side(&self) -> bool {
        matches!(self, Self::TaskNotFound(_) | Self::PollTimeout { .. })
    }
}
