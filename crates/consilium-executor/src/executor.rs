//! External executor boundary

use consilium_core::{CaseSignals, TaskId, TaskKind, WorkerInstruction, WorkerStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Executor error types
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Submission refused synchronously (e.g. invalid task shape). Fatal for the task.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("unknown executor task: {0}")]
    TaskUnknown(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("executor fatal error: {0}")]
    Fatal(String),
}

impl From<ExecutorError> for consilium_core::Error {
    fn from(e: ExecutorError) -> Self {
        consilium_core::Error::Executor(e.to_string())
    }
}

/// Executor-assigned identity of a submitted task.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorTaskId(pub String);

impl ExecutorTaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutorTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the executor needs beyond the task description to run the workers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionContext {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub instructions: Vec<WorkerInstruction>,
    pub case: CaseSignals,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub task_description: String,
    pub max_workers: usize,
    pub timeout_ms: u64,
    pub context: SubmissionContext,
}

/// Overall state of a submitted task on the executor side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Running,
    Finished,
    /// Executor-reported fatal error; the whole task is lost.
    Failed,
}

/// One worker's progress as reported by the executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerProgress {
    pub agent_id: String,
    pub instance_id: String,
    pub status: WorkerStatus,
    pub progress: f64,
    /// Raw result payload, present once the worker completed.
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorTaskStatus {
    pub state: ExecutorState,
    pub workers: Vec<WorkerProgress>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutorTaskStatus {
    pub fn any_started(&self) -> bool {
        self.workers.iter().any(|w| w.status.has_started())
    }

    pub fn all_terminal(&self) -> bool {
        self.workers.iter().all(|w| w.status.is_terminal())
    }
}

/// The external system that actually runs workers.
///
/// Implementations must tolerate concurrent calls; every call may suspend on I/O.
#[async_trait::async_trait]
pub trait ExternalExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Dispatch the worker set. Returns the executor's task identity.
    async fn submit(&self, submission: Submission) -> ExecutorResult<ExecutorTaskId>;

    /// Per-worker progress and, for finished workers, raw result payloads.
    async fn status(&self, id: &ExecutorTaskId) -> ExecutorResult<ExecutorTaskStatus>;
}
