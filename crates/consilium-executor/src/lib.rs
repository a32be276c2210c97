//! Consilium Executor - External executor boundary, payload parsing and a scripted executor

pub mod executor;
pub mod payload;
pub mod scripted;

pub use executor::{
    ExecutorError, ExecutorResult, ExecutorState, ExecutorTaskId, ExecutorTaskStatus,
    ExternalExecutor, Submission, SubmissionContext, WorkerProgress,
};
pub use payload::{parse_worker_output, PayloadError};
pub use scripted::{ScriptFile, ScriptedExecutor, WorkerScript};
