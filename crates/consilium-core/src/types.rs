//! Agent, scoring and instruction types shared across the pipeline

use serde::{Deserialize, Serialize};

/// When an agent activates. Each variant carries only the data its rule needs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationRule {
    Always,
    HighUrgency,
    Keyword { keywords: Vec<String> },
    ImagingNeeded,
    LabNeeded,
    DrugQuery,
    SurgicalCandidate,
    ComplexCase,
    RareDiseaseSuspected,
}

impl ActivationRule {
    pub fn kind(&self) -> ActivationKind {
        match self {
            Self::Always => ActivationKind::Always,
            Self::HighUrgency => ActivationKind::HighUrgency,
            Self::Keyword { .. } => ActivationKind::Keyword,
            Self::ImagingNeeded => ActivationKind::ImagingNeeded,
            Self::LabNeeded => ActivationKind::LabNeeded,
            Self::DrugQuery => ActivationKind::DrugQuery,
            Self::SurgicalCandidate => ActivationKind::SurgicalCandidate,
            Self::ComplexCase => ActivationKind::ComplexCase,
            Self::RareDiseaseSuspected => ActivationKind::RareDiseaseSuspected,
        }
    }

    /// Trigger keywords; empty for every rule except `Keyword`.
    pub fn keywords(&self) -> &[String] {
        match self {
            Self::Keyword { keywords } => keywords,
            _ => &[],
        }
    }
}

/// Data-less discriminant of [`ActivationRule`], used for catalog lookups and tier ordering.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    Always,
    HighUrgency,
    Keyword,
    ImagingNeeded,
    LabNeeded,
    DrugQuery,
    SurgicalCandidate,
    RareDiseaseSuspected,
    ComplexCase,
}

impl ActivationKind {
    /// Kinds in selection order. Tier-4 data kinds keep this relative order.
    pub const SELECTION_ORDER: [ActivationKind; 9] = [
        Self::Always,
        Self::HighUrgency,
        Self::Keyword,
        Self::ImagingNeeded,
        Self::LabNeeded,
        Self::DrugQuery,
        Self::SurgicalCandidate,
        Self::RareDiseaseSuspected,
        Self::ComplexCase,
    ];

    /// Selection tier, 1 (highest) through 6. Specialty hints fill tier 7.
    pub fn tier(&self) -> u8 {
        match self {
            Self::Always => 1,
            Self::HighUrgency => 2,
            Self::Keyword => 3,
            Self::ImagingNeeded | Self::LabNeeded | Self::DrugQuery | Self::SurgicalCandidate => 4,
            Self::RareDiseaseSuspected => 5,
            Self::ComplexCase => 6,
        }
    }
}

impl std::fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Always => "always",
            Self::HighUrgency => "high_urgency",
            Self::Keyword => "keyword",
            Self::ImagingNeeded => "imaging_needed",
            Self::LabNeeded => "lab_needed",
            Self::DrugQuery => "drug_query",
            Self::SurgicalCandidate => "surgical_candidate",
            Self::RareDiseaseSuspected => "rare_disease_suspected",
            Self::ComplexCase => "complex_case",
        };
        write!(f, "{}", s)
    }
}

/// Case data an agent expects to receive.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataTag {
    Vitals,
    Labs,
    Imaging,
    Medications,
    History,
}

impl std::fmt::Display for DataTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vitals => write!(f, "vitals"),
            Self::Labs => write!(f, "labs"),
            Self::Imaging => write!(f, "imaging"),
            Self::Medications => write!(f, "medications"),
            Self::History => write!(f, "history"),
        }
    }
}

/// A worker type in the catalog. Immutable after load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    /// Unique across the catalog (e.g. "cardiology-specialist").
    pub id: String,
    pub name: String,
    /// Specialty tag (e.g. "cardiology").
    pub specialty: String,
    pub rule: ActivationRule,
    #[serde(default)]
    pub required_data: Vec<DataTag>,
    /// Base confidence weight in [0, 1]; weights this agent's vote during consensus.
    pub base_weight: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl AgentDescriptor {
    pub fn kind(&self) -> ActivationKind {
        self.rule.kind()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(capability))
    }
}

/// Per-dimension complexity breakdown, each in [0, 1].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DimensionScores {
    pub symptom: f64,
    pub clinical_data: f64,
    pub patient: f64,
    pub diagnostic: f64,
    pub urgency: f64,
}

/// Derived once from [`CaseSignals`](crate::CaseSignals); never mutated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplexityScore {
    /// Weighted mean of the four content dimensions.
    pub overall: f64,
    pub breakdown: DimensionScores,
    /// `overall` after the urgency multiplier, clamped to [0, 1]. Drives selection.
    pub normalized: f64,
    pub recommended_workers: usize,
    pub estimated_processing_ms: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Verdict for one agent. Audit only; selection does not consume it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpawnDecision {
    pub agent_id: String,
    pub should_spawn: bool,
    pub reason: String,
    pub priority: PriorityTier,
    pub estimated_completion_ms: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    PrimaryCoordinator,
    EmergencySpecialist,
    SpecialistConsultant,
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryCoordinator => write!(f, "primary coordinator"),
            Self::EmergencySpecialist => write!(f, "emergency specialist"),
            Self::SpecialistConsultant => write!(f, "specialist consultant"),
        }
    }
}

/// Shape every worker must return so results can be merged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExpectedOutput {
    pub format: String,
    pub required_fields: Vec<String>,
    /// Field holding specialty-specific notes.
    pub specialty_notes_field: String,
}

/// Self-contained task for one worker. Carries no orchestration state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkerInstruction {
    pub agent_id: String,
    pub role: WorkerRole,
    pub task: String,
    pub focus_areas: Vec<String>,
    pub expected_output: ExpectedOutput,
    pub confidence_weight: f64,
}
