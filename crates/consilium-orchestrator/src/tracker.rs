//! Task tracker — owns every OrchestrationTask.
//!
//! Records live in a `DashMap`; readers get owned snapshots taken under the shard
//! lock, so they never observe a half-applied update. Advancing a task (which
//! awaits the executor) is serialized per task by an async gate.

use crate::task::{OrchestrationTask, TaskSnapshot};
use chrono::Utc;
use consilium_core::{Error, Result, TaskId};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
pub struct TaskTracker {
    tasks: DashMap<TaskId, OrchestrationTask>,
    gates: DashMap<TaskId, Arc<Mutex<()>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task. The record lands before its gate so `gc` never sees a gate
    /// without a task.
    pub fn insert(&self, task: OrchestrationTask) {
        let id = task.id.clone();
        debug!(task_id = %id, "Task tracked");
        self.tasks.insert(id.clone(), task);
        self.gates.entry(id).or_default();
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn snapshot(&self, id: &TaskId) -> Result<TaskSnapshot> {
        self.tasks
            .get(id)
            .map(|t| t.snapshot())
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Owned copy of the full record.
    pub fn get(&self, id: &TaskId) -> Result<OrchestrationTask> {
        self.tasks
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Apply a mutation under the shard lock. `f` must not block.
    pub fn update<R>(&self, id: &TaskId, f: impl FnOnce(&mut OrchestrationTask) -> R) -> Result<R> {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        Ok(f(entry.value_mut()))
    }

    /// Per-task advance gate. Hold it across the whole read-query-apply cycle.
    /// Created on demand for a tracked task whose gate is not in place yet.
    pub fn gate(&self, id: &TaskId) -> Result<Arc<Mutex<()>>> {
        if let Some(gate) = self.gates.get(id) {
            return Ok(Arc::clone(&gate));
        }
        if !self.tasks.contains_key(id) {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        Ok(Arc::clone(&self.gates.entry(id.clone()).or_default()))
    }

    /// Snapshots of every task, newest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self.tasks.iter().map(|t| t.snapshot()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Remove terminal tasks finished more than `max_age` ago. Returns how many were removed.
    pub fn gc(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let before = self.tasks.len();
        self.tasks.retain(|_, task| match task.completed_at {
            Some(done) if task.is_terminal() => now.signed_duration_since(done) < max_age,
            _ => true,
        });
        self.gates.retain(|id, _| self.tasks.contains_key(id));
        let removed = before.saturating_sub(self.tasks.len());
        if removed > 0 {
            info!(removed, "Expired tasks removed");
        }
        removed
    }
}
