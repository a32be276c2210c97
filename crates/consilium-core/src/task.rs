//! Task identity and lifecycle states

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Orchestration task identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self::new(format!("consult-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Lifecycle of an orchestration task.
///
/// `pending → spawning_agents → analyzing → building_consensus → completed`,
/// with `failed` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    SpawningAgents,
    Analyzing,
    BuildingConsensus,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, SpawningAgents)
            | (SpawningAgents, Analyzing)
            | (Analyzing, BuildingConsensus)
            | (BuildingConsensus, Completed) => true,
            _ => false,
        }
    }

    /// Human-readable step label shown in status snapshots.
    pub fn step_label(&self) -> &'static str {
        match self {
            Self::Pending => "Queued for dispatch",
            Self::SpawningAgents => "Dispatching specialist agents",
            Self::Analyzing => "Agents analyzing case",
            Self::BuildingConsensus => "Building consensus",
            Self::Completed => "Consultation complete",
            Self::Failed => "Consultation failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::SpawningAgents => "spawning_agents",
            Self::Analyzing => "analyzing",
            Self::BuildingConsensus => "building_consensus",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-worker state as reported by the executor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Spawning,
    Active,
    Analyzing,
    Completed,
    Failed,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The worker has begun producing output.
    pub fn has_started(&self) -> bool {
        !matches!(self, Self::Spawning)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawning => write!(f, "spawning"),
            Self::Active => write!(f, "active"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Consultation,
    EmergencyConsultation,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consultation => write!(f, "consultation"),
            Self::EmergencyConsultation => write!(f, "emergency_consultation"),
        }
    }
}
