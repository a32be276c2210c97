//! Consilium Orchestrator — consultation lifecycle
//!
//! Flow:
//! - Score the case, select agents, build one instruction per agent
//! - Submit the batch to an `ExternalExecutor`
//! - Track the task: spawning_agents → analyzing → building_consensus → completed
//! - Merge completed worker results into a single consensus
//!
//! A task that runs past its deadline is settled with whatever workers finished;
//! a task with zero completed workers fails.

pub mod config;
pub mod consensus;
pub mod service;
pub mod task;
pub mod tracker;

pub use config::{ConsiliumConfig, TrackerConfig};
pub use consensus::{
    CompletionCaps, ConsensusAggregator, ConsensusConfig, ContributingResult,
    FailedWorkerPolicy, QualityThresholds, StrengthThresholds,
};
pub use service::{CaseAssessment, ConsultationService, ConsultationTicket, PollOptions};
pub use task::{OrchestrationTask, TaskSnapshot, WorkerRecord};
pub use tracker::TaskTracker;
