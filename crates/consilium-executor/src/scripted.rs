//! ScriptedExecutor — deterministic in-process executor
//!
//! Every `status` call advances the task by one tick. Each agent follows its
//! script: succeed or fail after N ticks, or never finish. Used by tests and by
//! the CLI's offline `consult` command.

use crate::executor::{
    ExecutorError, ExecutorResult, ExecutorState, ExecutorTaskId, ExecutorTaskStatus,
    ExternalExecutor, Submission, WorkerProgress,
};
use consilium_core::{WorkerResult, WorkerStatus};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// How one agent behaves.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerScript {
    /// Complete after `ticks` status calls with the given raw payload.
    Succeed { ticks: u32, output: Value },
    /// Fail after `ticks` status calls.
    Fail { ticks: u32, error: String },
    /// Never finish.
    Hang,
}

impl WorkerScript {
    pub fn succeed(ticks: u32, result: &WorkerResult) -> Self {
        Self::Succeed {
            ticks,
            output: serde_json::to_value(result).unwrap_or(Value::Null),
        }
    }

    pub fn fail(ticks: u32, error: impl Into<String>) -> Self {
        Self::Fail {
            ticks,
            error: error.into(),
        }
    }

    fn progress_at(&self, tick: u32) -> (WorkerStatus, f64, Option<Value>, Option<String>) {
        match self {
            _ if tick == 0 => (WorkerStatus::Spawning, 0.0, None, None),
            Self::Hang => (WorkerStatus::Active, 0.0, None, None),
            Self::Succeed { ticks, output } if tick >= *ticks => {
                (WorkerStatus::Completed, 1.0, Some(output.clone()), None)
            }
            Self::Fail { ticks, error } if tick >= *ticks => {
                (WorkerStatus::Failed, 1.0, None, Some(error.clone()))
            }
            Self::Succeed { ticks, .. } | Self::Fail { ticks, .. } => {
                (WorkerStatus::Analyzing, tick as f64 / *ticks as f64, None, None)
            }
        }
    }
}

/// Scripts file format: a default plus per-agent overrides.
#[derive(Debug, Deserialize)]
pub struct ScriptFile {
    #[serde(default)]
    pub default: Option<WorkerScript>,
    #[serde(default)]
    pub agents: HashMap<String, WorkerScript>,
}

struct ScriptedTask {
    agents: Vec<String>,
    tick: u32,
}

pub struct ScriptedExecutor {
    scripts: HashMap<String, WorkerScript>,
    default_script: WorkerScript,
    reject_with: Option<String>,
    fatal_after: Option<u32>,
    tasks: Mutex<HashMap<ExecutorTaskId, ScriptedTask>>,
    submissions: Mutex<Vec<Submission>>,
    status_calls: Mutex<usize>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    /// Agents without a script hang.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            default_script: WorkerScript::Hang,
            reject_with: None,
            fatal_after: None,
            tasks: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            status_calls: Mutex::new(0),
        }
    }

    pub fn from_script_file(file: ScriptFile) -> Self {
        let mut executor = Self::new();
        executor.scripts = file.agents;
        if let Some(default) = file.default {
            executor.default_script = default;
        }
        executor
    }

    pub fn with_script(mut self, agent_id: impl Into<String>, script: WorkerScript) -> Self {
        self.scripts.insert(agent_id.into(), script);
        self
    }

    pub fn with_default(mut self, script: WorkerScript) -> Self {
        self.default_script = script;
        self
    }

    /// Refuse every submission synchronously.
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject_with = Some(reason.into());
        self
    }

    /// Report a fatal executor error once a task has seen `ticks` status calls.
    pub fn fatal_after(mut self, ticks: u32) -> Self {
        self.fatal_after = Some(ticks);
        self
    }

    pub async fn submit_count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    pub async fn status_count(&self) -> usize {
        *self.status_calls.lock().await
    }

    /// Everything submitted so far, in order.
    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }

    fn script_for(&self, agent_id: &str) -> &WorkerScript {
        self.scripts.get(agent_id).unwrap_or(&self.default_script)
    }
}

#[async_trait::async_trait]
impl ExternalExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, submission: Submission) -> ExecutorResult<ExecutorTaskId> {
        let agents: Vec<String> = submission
            .context
            .instructions
            .iter()
            .map(|i| i.agent_id.clone())
            .collect();
        self.submissions.lock().await.push(submission);

        if let Some(reason) = &self.reject_with {
            return Err(ExecutorError::Rejected(reason.clone()));
        }
        if agents.is_empty() {
            return Err(ExecutorError::Rejected("no workers in submission".into()));
        }

        let id = ExecutorTaskId(format!("exec-{}", uuid::Uuid::new_v4()));
        debug!(executor_task = %id, workers = agents.len(), "Scripted submission accepted");
        self.tasks
            .lock()
            .await
            .insert(id.clone(), ScriptedTask { agents, tick: 0 });
        Ok(id)
    }

    async fn status(&self, id: &ExecutorTaskId) -> ExecutorResult<ExecutorTaskStatus> {
        *self.status_calls.lock().await += 1;

        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| ExecutorError::TaskUnknown(id.to_string()))?;
        task.tick += 1;

        if let Some(limit) = self.fatal_after {
            if task.tick >= limit {
                return Ok(ExecutorTaskStatus {
                    state: ExecutorState::Failed,
                    workers: Vec::new(),
                    error: Some("executor lost the task".into()),
                });
            }
        }

        let workers: Vec<WorkerProgress> = task
            .agents
            .iter()
            .enumerate()
            .map(|(i, agent_id)| {
                let (status, progress, output, error) =
                    self.script_for(agent_id).progress_at(task.tick);
                WorkerProgress {
                    agent_id: agent_id.clone(),
                    instance_id: format!("{id}-w{i}"),
                    status,
                    progress,
                    output,
                    error,
                }
            })
            .collect();

        let state = if workers.iter().all(|w| w.status.is_terminal()) {
            ExecutorState::Finished
        } else {
            ExecutorState::Running
        };
        Ok(ExecutorTaskStatus {
            state,
            workers,
            error: None,
        })
    }
}
