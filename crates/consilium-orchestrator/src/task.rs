//! OrchestrationTask — the lifecycle record of one consultation.
//!
//! Every mutation goes through a transition method that checks the current
//! state first. Illegal transitions are rejected, never applied.

use crate::consensus::ContributingResult;
use chrono::{DateTime, Utc};
use consilium_core::{
    CaseSignals, ComplexityScore, ConsensusResult, Error, Result, TaskId, TaskKind, TaskStatus,
    WorkerInstruction, WorkerResult, WorkerStatus,
};
use consilium_executor::{parse_worker_output, ExecutorTaskId, ExecutorTaskStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// One dispatched worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub agent_id: String,
    /// Executor-assigned instance, known once the executor reports the worker.
    pub instance_id: Option<String>,
    pub status: WorkerStatus,
    pub progress: f64,
    #[serde(skip)]
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    fn new(instruction: &WorkerInstruction) -> Self {
        Self {
            agent_id: instruction.agent_id.clone(),
            instance_id: None,
            status: WorkerStatus::Spawning,
            progress: 0.0,
            weight: instruction.confidence_weight,
            result: None,
            error: None,
            finished_at: None,
        }
    }

    fn finish_failed(&mut self, error: impl Into<String>) {
        self.status = WorkerStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone)]
pub struct OrchestrationTask {
    pub id: TaskId,
    pub kind: TaskKind,
    status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
    pub signals: CaseSignals,
    pub complexity: ComplexityScore,
    pub executor_task: Option<ExecutorTaskId>,
    workers: Vec<WorkerRecord>,
    consensus: Option<ConsensusResult>,
    error: Option<String>,
}

impl OrchestrationTask {
    pub fn new(
        id: TaskId,
        signals: CaseSignals,
        complexity: ComplexityScore,
        instructions: &[WorkerInstruction],
        timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        let kind = if signals.urgency == consilium_core::Urgency::Emergent {
            TaskKind::EmergencyConsultation
        } else {
            TaskKind::Consultation
        };
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            deadline: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
            signals,
            complexity,
            executor_task: None,
            workers: instructions.iter().map(WorkerRecord::new).collect(),
            consensus: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn workers(&self) -> &[WorkerRecord] {
        &self.workers
    }

    pub fn consensus(&self) -> Option<&ConsensusResult> {
        self.consensus.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    pub fn spawned_count(&self) -> usize {
        self.workers.len()
    }

    pub fn completed_count(&self) -> usize {
        self.count(WorkerStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(WorkerStatus::Failed)
    }

    fn count(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    /// Completed workers over total workers.
    pub fn progress(&self) -> f64 {
        if self.workers.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.workers.len() as f64
    }

    pub fn all_workers_terminal(&self) -> bool {
        self.workers.iter().all(|w| w.status.is_terminal())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_transition(self.status, next));
        }
        info!(task_id = %self.id, from = %self.status, to = %next, "Task transition");
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// `pending → spawning_agents`, recording the executor's task identity.
    pub fn mark_dispatched(&mut self, executor_task: ExecutorTaskId) -> Result<()> {
        self.transition(TaskStatus::SpawningAgents)?;
        self.executor_task = Some(executor_task);
        Ok(())
    }

    /// `spawning_agents → analyzing`.
    pub fn begin_analysis(&mut self) -> Result<()> {
        self.transition(TaskStatus::Analyzing)
    }

    /// `analyzing → building_consensus`.
    pub fn begin_consensus(&mut self) -> Result<()> {
        self.transition(TaskStatus::BuildingConsensus)
    }

    /// `building_consensus → completed`.
    pub fn complete(&mut self, consensus: ConsensusResult) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.consensus = Some(consensus);
        Ok(())
    }

    /// Any non-terminal state `→ failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        self.transition(TaskStatus::Failed)?;
        warn!(task_id = %self.id, error = %error, "Task failed");
        self.error = Some(error);
        Ok(())
    }

    /// Merge an executor status report into the worker records.
    ///
    /// Terminal worker records never change again. A completed worker whose payload
    /// cannot be parsed is recorded as failed.
    pub fn apply_progress(&mut self, report: &ExecutorTaskStatus) {
        let task_id = self.id.clone();
        for progress in &report.workers {
            let Some(record) = self
                .workers
                .iter_mut()
                .find(|w| w.agent_id == progress.agent_id && !w.status.is_terminal())
            else {
                continue;
            };
            record.instance_id = Some(progress.instance_id.clone());
            record.progress = progress.progress.clamp(0.0, 1.0);

            match progress.status {
                WorkerStatus::Completed => {
                    let parsed = progress
                        .output
                        .as_ref()
                        .ok_or_else(|| "completed without a result payload".to_string())
                        .and_then(|raw| parse_worker_output(raw).map_err(|e| e.to_string()));
                    match parsed {
                        Ok(result) => {
                            record.status = WorkerStatus::Completed;
                            record.result = Some(result);
                            record.finished_at = Some(Utc::now());
                            info!(task_id = %task_id, agent = %record.agent_id, "Worker completed");
                        }
                        Err(e) => {
                            warn!(task_id = %task_id, agent = %record.agent_id, error = %e, "Unparseable worker output");
                            record.finish_failed(format!("unparseable output: {e}"));
                        }
                    }
                }
                WorkerStatus::Failed => {
                    let error = progress
                        .error
                        .clone()
                        .unwrap_or_else(|| "worker failed".to_string());
                    warn!(task_id = %task_id, agent = %record.agent_id, error = %error, "Worker failed");
                    record.finish_failed(error);
                }
                status => record.status = status,
            }
        }
        self.updated_at = Utc::now();
    }

    /// Fail every worker still running. Returns how many were cut off.
    pub fn expire_running_workers(&mut self, reason: &str) -> usize {
        let mut expired = 0;
        for record in self.workers.iter_mut().filter(|w| !w.status.is_terminal()) {
            record.finish_failed(reason);
            expired += 1;
        }
        if expired > 0 {
            warn!(task_id = %self.id, expired, reason, "Workers expired");
            self.updated_at = Utc::now();
        }
        expired
    }

    /// Results of completed workers, weighted by their agent's base weight.
    pub fn contributing_results(&self) -> Vec<ContributingResult> {
        self.workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Completed)
            .filter_map(|w| {
                w.result.as_ref().map(|result| ContributingResult {
                    agent_id: w.agent_id.clone(),
                    weight: w.weight,
                    result: result.clone(),
                })
            })
            .collect()
    }

    /// Remaining time from the complexity estimate; zero once terminal or overdue.
    pub fn estimated_remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        if self.is_terminal() {
            return 0;
        }
        let elapsed = (now - self.created_at).num_milliseconds().max(0) as u64;
        self.complexity.estimated_processing_ms.saturating_sub(elapsed)
    }

    /// Consistent, owned view for callers.
    pub fn snapshot(&self) -> TaskSnapshot {
        let now = Utc::now();
        TaskSnapshot {
            task_id: self.id.clone(),
            kind: self.kind,
            status: self.status,
            step: self.status.step_label().to_string(),
            progress: self.progress(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            estimated_remaining_ms: self.estimated_remaining_ms(now),
            spawned_workers: self.spawned_count(),
            completed_workers: self.completed_count(),
            failed_workers: self.failed_count(),
            complexity: self.complexity.clone(),
            workers: self.workers.clone(),
            consensus: self.consensus.clone(),
            error: self.error.clone(),
        }
    }
}

/// Point-in-time copy of a task, safe to hand out while the task keeps advancing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub step: String,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_remaining_ms: u64,
    pub spawned_workers: usize,
    pub completed_workers: usize,
    pub failed_workers: usize,
    pub complexity: ComplexityScore,
    pub workers: Vec<WorkerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consilium_core::{ExpectedOutput, Urgency, WorkerRole};
    use consilium_executor::{ExecutorState, WorkerProgress};

    fn instruction(agent_id: &str) -> WorkerInstruction {
        WorkerInstruction {
            agent_id: agent_id.into(),
            role: WorkerRole::SpecialistConsultant,
            task: String::new(),
            focus_areas: vec![],
            expected_output: ExpectedOutput {
                format: "json".into(),
                required_fields: vec![],
                specialty_notes_field: "specialty_notes".into(),
            },
            confidence_weight: 0.8,
        }
    }

    fn task(agents: &[&str]) -> OrchestrationTask {
        let signals = CaseSignals::new(Urgency::Routine, ["cough"]);
        let complexity = consilium_agents::ComplexityScorer::default().score(&signals);
        let instructions: Vec<_> = agents.iter().map(|a| instruction(a)).collect();
        OrchestrationTask::new(
            TaskId::new("consult-t"),
            signals,
            complexity,
            &instructions,
            Duration::from_secs(60),
        )
    }

    fn progress(agent: &str, status: WorkerStatus, output: Option<serde_json::Value>) -> WorkerProgress {
        WorkerProgress {
            agent_id: agent.into(),
            instance_id: format!("{agent}-1"),
            status,
            progress: 1.0,
            output,
            error: None,
        }
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut t = task(&["a"]);
        t.fail("boom").unwrap();
        assert!(t.fail("again").is_err());
        assert!(t.begin_analysis().is_err());
        assert_eq!(t.status(), TaskStatus::Failed);
        assert_eq!(t.error(), Some("boom"));
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut t = task(&["a"]);
        assert!(matches!(t.begin_consensus(), Err(Error::InvalidTransition { .. })));
        assert_eq!(t.status(), TaskStatus::Pending);
    }

    #[test]
    fn test_apply_progress_parses_and_freezes_terminal_workers() {
        let mut t = task(&["a", "b"]);
        let ok = serde_json::to_value(WorkerResult::diagnosis("X", 0.9)).unwrap();
        t.apply_progress(&ExecutorTaskStatus {
            state: ExecutorState::Running,
            workers: vec![
                progress("a", WorkerStatus::Completed, Some(ok)),
                progress("b", WorkerStatus::Completed, Some(serde_json::json!("garbage"))),
            ],
            error: None,
        });
        assert_eq!(t.completed_count(), 1);
        assert_eq!(t.failed_count(), 1);
        assert_eq!(t.progress(), 0.5);

        // Later reports cannot resurrect a terminal worker.
        t.apply_progress(&ExecutorTaskStatus {
            state: ExecutorState::Running,
            workers: vec![progress("b", WorkerStatus::Analyzing, None)],
            error: None,
        });
        assert_eq!(t.workers()[1].status, WorkerStatus::Failed);
        assert_eq!(t.contributing_results().len(), 1);
    }

    #[test]
    fn test_expire_running_workers() {
        let mut t = task(&["a", "b"]);
        assert_eq!(t.expire_running_workers("deadline exceeded"), 2);
        assert!(t.all_workers_terminal());
        assert_eq!(t.workers()[0].error.as_deref(), Some("deadline exceeded"));
    }

    #[test]
    fn test_emergent_case_kind() {
        let signals = CaseSignals::new(Urgency::Emergent, ["chest pain"]);
        let complexity = consilium_agents::ComplexityScorer::default().score(&signals);
        let t = OrchestrationTask::new(
            TaskId::generate(),
            signals,
            complexity,
            &[],
            Duration::from_secs(1),
        );
        assert_eq!(t.kind, TaskKind::EmergencyConsultation);
    }
}
