//! Worker results as returned by the executor, and the merged consensus.

use crate::types::PriorityTier;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub condition: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DifferentialEntry {
    pub condition: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    DiagnosticTest,
    Treatment,
    Referral,
    Monitoring,
    Lifestyle,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    #[serde(rename = "type", default = "default_recommendation_kind")]
    pub kind: RecommendationKind,
    pub text: String,
    #[serde(default = "default_priority")]
    pub priority: PriorityTier,
}

fn default_recommendation_kind() -> RecommendationKind {
    RecommendationKind::Other
}

fn default_priority() -> PriorityTier {
    PriorityTier::Medium
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Moderate,
    High,
    Critical,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub prognosis: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// One worker's opinion. Opaque input to the aggregator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkerResult {
    pub primary_diagnosis: Diagnosis,
    #[serde(default)]
    pub differentials: Vec<DifferentialEntry>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub risk: RiskAssessment,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub processing_ms: u64,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub specialty_notes: Option<String>,
}

impl WorkerResult {
    /// Minimal result with a single diagnosis. Convenient for tests and scripted executors.
    pub fn diagnosis(condition: impl Into<String>, confidence: f64) -> Self {
        Self {
            primary_diagnosis: Diagnosis {
                condition: condition.into(),
                code: None,
                confidence,
                evidence: Vec::new(),
            },
            differentials: Vec::new(),
            recommendations: Vec::new(),
            risk: RiskAssessment::default(),
            findings: Vec::new(),
            concerns: Vec::new(),
            confidence,
            processing_ms: 0,
            usage: Usage::default(),
            specialty_notes: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl std::fmt::Display for ConsensusQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poor => write!(f, "poor"),
            Self::Fair => write!(f, "fair"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConsensusDiagnosis {
    pub condition: String,
    pub code: Option<String>,
    /// Fraction of contributing workers supporting this diagnosis.
    pub agreement: f64,
    pub confidence: f64,
    pub evidence_strength: EvidenceStrength,
    pub supporting_agents: Vec<String>,
    pub evidence: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConsensusRecommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub text: String,
    pub priority: PriorityTier,
    pub agreement: f64,
    pub supporting_agents: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    MajorityVote,
    EvidenceBased,
    ManualReview,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConflictCandidate {
    pub condition: String,
    pub agreement: f64,
    pub confidence: f64,
    pub supporting_agents: Vec<String>,
}

/// Diagnoses whose top scores could not be told apart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub candidates: Vec<ConflictCandidate>,
    pub resolution: ResolutionMethod,
    /// Condition chosen as primary; `None` when flagged for manual review.
    pub resolved_to: Option<String>,
}

/// Merged opinion across all completed workers. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    pub primary_diagnosis: ConsensusDiagnosis,
    pub differentials: Vec<ConsensusDiagnosis>,
    pub recommendations: Vec<ConsensusRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<Conflict>>,
    pub red_flags: Vec<String>,
    pub overall_confidence: f64,
    pub quality: ConsensusQuality,
    pub contributing_workers: usize,
    pub dispatched_workers: usize,
}
