//! ConsultationService — the caller-facing pipeline.
//!
//! score → select → instruct → submit, then track the executor until every worker
//! is terminal (or the deadline passes) and merge the results.

use crate::config::ConsiliumConfig;
use crate::consensus::ConsensusAggregator;
use crate::task::{OrchestrationTask, TaskSnapshot};
use crate::tracker::TaskTracker;
use chrono::Utc;
use consilium_agents::{
    AgentCatalog, ComplexityScorer, InstructionBuilder, SelectionPolicy, SelectionRequest,
};
use consilium_core::{
    CaseSignals, ComplexityScore, Error, Result, SpawnDecision, TaskId, TaskStatus,
};
use consilium_executor::{
    ExecutorError, ExecutorState, ExternalExecutor, Submission, SubmissionContext,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Returned by `start_consultation`.
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationTicket {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub poll_url: String,
    pub estimated_duration_ms: u64,
    pub worker_count: usize,
    pub complexity_score: ComplexityScore,
}

/// Offline evaluation of a case: score, selection and per-agent decisions.
#[derive(Debug, Clone, Serialize)]
pub struct CaseAssessment {
    pub complexity: ComplexityScore,
    pub selected: Vec<String>,
    pub decisions: Vec<SpawnDecision>,
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

struct Inner {
    config: ConsiliumConfig,
    scorer: ComplexityScorer,
    selection: SelectionPolicy,
    instructions: InstructionBuilder,
    aggregator: ConsensusAggregator,
    executor: Arc<dyn ExternalExecutor>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Cheap to clone; clones share the same tracker and executor.
#[derive(Clone)]
pub struct ConsultationService {
    inner: Arc<Inner>,
}

impl ConsultationService {
    pub fn new(
        config: ConsiliumConfig,
        catalog: Arc<AgentCatalog>,
        executor: Arc<dyn ExternalExecutor>,
    ) -> Self {
        let inner = Inner {
            scorer: ComplexityScorer::new(config.scoring.clone()),
            selection: SelectionPolicy::new(catalog, config.selection.clone()),
            instructions: InstructionBuilder::new(config.instructions.clone()),
            aggregator: ConsensusAggregator::new(config.consensus.clone()),
            executor,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &ConsiliumConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    pub fn default_poll_options(&self) -> PollOptions {
        let t = &self.inner.config.tracker;
        PollOptions {
            max_attempts: t.default_max_attempts,
            interval: Duration::from_millis(t.default_poll_interval_ms),
        }
    }

    /// Score and select without dispatching anything.
    pub fn assess(&self, signals: &CaseSignals) -> Result<CaseAssessment> {
        signals.validate()?;
        let complexity = self.inner.scorer.score(signals);
        let request = SelectionRequest::new(signals, &complexity);
        let selected = self
            .inner
            .selection
            .select_agents(&request)
            .into_iter()
            .map(|a| a.id)
            .collect();
        let decisions = self.inner.selection.decide_all(&request);
        Ok(CaseAssessment {
            complexity,
            selected,
            decisions,
        })
    }

    /// Validate, score, select, build instructions and submit. Returns immediately
    /// after dispatch; the task advances through `refresh`, polling and the deadline watcher.
    pub async fn start_consultation(&self, signals: CaseSignals) -> Result<ConsultationTicket> {
        signals.validate()?;
        let inner = &self.inner;

        let complexity = inner.scorer.score(&signals);
        let agents = inner
            .selection
            .select_agents(&SelectionRequest::new(&signals, &complexity));
        if agents.is_empty() {
            return Err(Error::validation("no agents selected for this case"));
        }
        let instructions = inner.instructions.build_all(&agents, &signals);
        let timeout = inner
            .instructions
            .compute_timeout(complexity.recommended_workers);

        let task_id = TaskId::generate();
        let task = OrchestrationTask::new(
            task_id.clone(),
            signals.clone(),
            complexity.clone(),
            &instructions,
            timeout,
        );
        let kind = task.kind;
        inner.tracker.insert(task);
        info!(
            task_id = %task_id,
            %kind,
            urgency = %signals.urgency,
            workers = agents.len(),
            complexity = complexity.normalized,
            "Consultation started"
        );

        let submission = Submission {
            task_description: format!(
                "{kind} for {} case: {}",
                signals.urgency,
                signals
                    .chief_complaint
                    .clone()
                    .unwrap_or_else(|| signals.symptom_texts().collect::<Vec<_>>().join(", "))
            ),
            max_workers: agents.len(),
            timeout_ms: timeout.as_millis() as u64,
            context: SubmissionContext {
                task_id: task_id.clone(),
                kind,
                instructions,
                case: signals,
            },
        };

        match inner.executor.submit(submission).await {
            Ok(executor_task) => {
                debug!(task_id = %task_id, executor_task = %executor_task, "Submission accepted");
                inner
                    .tracker
                    .update(&task_id, |t| t.mark_dispatched(executor_task))??;
            }
            Err(e) => {
                let message = e.to_string();
                inner.tracker.update(&task_id, |t| t.fail(message.clone()))??;
                return Err(Error::submission(task_id.as_str(), message));
            }
        }

        self.spawn_deadline_watcher(task_id.clone(), timeout);

        Ok(ConsultationTicket {
            poll_url: inner.config.tracker.poll_url(task_id.as_str()),
            task_id,
            status: TaskStatus::SpawningAgents,
            estimated_duration_ms: complexity.estimated_processing_ms,
            worker_count: agents.len(),
            complexity_score: complexity,
        })
    }

    /// Non-blocking status query.
    pub fn get_status(&self, task_id: &TaskId) -> Result<TaskSnapshot> {
        self.inner.tracker.snapshot(task_id)
    }

    /// Query the executor once and advance the task as far as the report allows.
    pub async fn refresh(&self, task_id: &TaskId) -> Result<TaskSnapshot> {
        let inner = &self.inner;
        let gate = inner.tracker.gate(task_id)?;
        let _guard = gate.lock().await;

        let task = inner.tracker.get(task_id)?;
        if task.is_terminal() {
            return Ok(task.snapshot());
        }
        let Some(executor_task) = task.executor_task.clone() else {
            return Ok(task.snapshot());
        };

        let report = match inner.executor.status(&executor_task).await {
            Ok(report) => Some(report),
            Err(e @ (ExecutorError::TaskUnknown(_) | ExecutorError::Fatal(_))) => {
                inner.tracker.update(task_id, |t| t.fail(e.to_string()))??;
                return inner.tracker.snapshot(task_id);
            }
            Err(e) if task.deadline_passed(Utc::now()) => {
                warn!(task_id = %task_id, error = %e, "Status query failed past deadline");
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(report) = &report {
            if report.state == ExecutorState::Failed {
                let message = report
                    .error
                    .clone()
                    .unwrap_or_else(|| "executor reported a fatal error".into());
                inner.tracker.update(task_id, |t| t.fail(message))??;
                return inner.tracker.snapshot(task_id);
            }
        }

        let ready = inner.tracker.update(task_id, |t| -> Result<bool> {
            if let Some(report) = &report {
                t.apply_progress(report);
            }
            let overdue = t.deadline_passed(Utc::now());
            let started = report.as_ref().is_some_and(|r| r.any_started());

            if t.status() == TaskStatus::SpawningAgents
                && (started || overdue || t.all_workers_terminal())
            {
                t.begin_analysis()?;
            }
            if t.status() == TaskStatus::Analyzing {
                if overdue && !t.all_workers_terminal() {
                    t.expire_running_workers("deadline exceeded");
                }
                if t.all_workers_terminal() {
                    if t.completed_count() == 0 {
                        let reason = if overdue {
                            "deadline exceeded with zero completed workers".to_string()
                        } else {
                            format!("all {} workers failed", t.spawned_count())
                        };
                        t.fail(reason)?;
                        return Ok(false);
                    }
                    t.begin_consensus()?;
                    return Ok(true);
                }
            }
            Ok(false)
        })??;

        if ready {
            self.build_consensus(task_id)?;
        }
        inner.tracker.snapshot(task_id)
    }

    /// `building_consensus → completed`, or `failed` on an aggregation error.
    fn build_consensus(&self, task_id: &TaskId) -> Result<()> {
        let inner = &self.inner;
        let task = inner.tracker.get(task_id)?;
        let results = task.contributing_results();
        match inner.aggregator.aggregate(&results, task.spawned_count()) {
            Ok(consensus) => {
                info!(
                    task_id = %task_id,
                    primary = %consensus.primary_diagnosis.condition,
                    quality = %consensus.quality,
                    contributing = consensus.contributing_workers,
                    dispatched = consensus.dispatched_workers,
                    "Consultation completed"
                );
                inner.tracker.update(task_id, |t| t.complete(consensus))?
            }
            Err(e) => inner.tracker.update(task_id, |t| t.fail(e.to_string()))?,
        }
    }

    /// Poll until terminal or until `max_attempts` queries have been spent.
    ///
    /// Exhausting the budget leaves the task running; it can still complete and be
    /// read later through `get_status`.
    pub async fn poll_until_complete(
        &self,
        task_id: &TaskId,
        options: PollOptions,
    ) -> Result<TaskSnapshot> {
        let mut snapshot = self.get_status(task_id)?;
        for attempt in 1..=options.max_attempts {
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            if attempt > 1 && !options.interval.is_zero() {
                tokio::time::sleep(options.interval).await;
            }
            snapshot = self.refresh(task_id).await?;
            debug!(task_id = %task_id, attempt, status = %snapshot.status, "Polled");
        }
        if snapshot.is_terminal() {
            return Ok(snapshot);
        }
        Err(Error::PollTimeout {
            task_id: task_id.to_string(),
            attempts: options.max_attempts,
        })
    }

    /// Remove terminal tasks older than the configured retention.
    pub fn gc(&self) -> usize {
        self.inner.tracker.gc(self.inner.config.tracker.retention())
    }

    /// Periodically run `gc` until shutdown. No-op when the sweep interval is 0.
    pub fn spawn_retention_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let every = self.inner.config.tracker.sweep_interval_secs;
        if every == 0 {
            return None;
        }
        let service = self.clone();
        let shutdown = self.inner.shutdown.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(every));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        service.gc();
                    }
                }
            }
            debug!("Retention sweeper stopped");
        }))
    }

    /// Enforce the submission deadline even if nobody polls.
    fn spawn_deadline_watcher(&self, task_id: TaskId, timeout: Duration) {
        let service = self.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }
            // One refresh past the deadline settles the task. Transport errors get
            // one more try per watch interval until the task is terminal.
            let retry = Duration::from_millis(service.inner.config.tracker.watch_interval_ms);
            loop {
                match service.refresh(&task_id).await {
                    Ok(snapshot) if snapshot.is_terminal() => {
                        debug!(task_id = %task_id, status = %snapshot.status, "Deadline watcher done");
                        return;
                    }
                    Err(Error::TaskNotFound(_)) => return,
                    Ok(_) => {}
                    Err(e) => warn!(task_id = %task_id, error = %e, "Deadline refresh failed"),
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(retry) => {}
                }
            }
        });
    }

    /// Stop background watchers and the sweeper. Tasks keep their current state.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}
