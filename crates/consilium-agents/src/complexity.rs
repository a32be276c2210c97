//! Complexity Scorer — turns raw case signals into a normalized score and a worker count.
//!
//! Pure and deterministic: the same signals and config always yield the same score.
//! The score gates agent selection and the number of billable workers.

use consilium_core::{
    CaseSignals, ComplexityScore, DimensionScores, Error, Result, Severity, Urgency,
};
use serde::{Deserialize, Serialize};

/// Relative weights of the four content dimensions. Need not sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DimensionWeights {
    pub symptom: f64,
    pub clinical_data: f64,
    pub patient: f64,
    pub diagnostic: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            symptom: 0.25,
            clinical_data: 0.25,
            patient: 0.2,
            diagnostic: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UrgencyMultipliers {
    pub routine: f64,
    pub urgent: f64,
    pub emergent: f64,
}

impl Default for UrgencyMultipliers {
    fn default() -> Self {
        Self {
            routine: 1.0,
            urgent: 1.2,
            emergent: 1.4,
        }
    }
}

impl UrgencyMultipliers {
    pub fn for_urgency(&self, urgency: Urgency) -> f64 {
        match urgency {
            Urgency::Routine => self.routine,
            Urgency::Urgent => self.urgent,
            Urgency::Emergent => self.emergent,
        }
    }
}

/// Normalized score at or above `min_score` recommends at least `workers` workers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WorkerStep {
    pub min_score: f64,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: DimensionWeights,
    pub urgency_multipliers: UrgencyMultipliers,
    pub worker_steps: Vec<WorkerStep>,
    /// Hard cap on the recommended worker count.
    pub max_workers: usize,
    pub base_processing_ms: u64,
    pub per_worker_processing_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            urgency_multipliers: UrgencyMultipliers::default(),
            worker_steps: vec![
                WorkerStep { min_score: 0.0, workers: 2 },
                WorkerStep { min_score: 0.2, workers: 3 },
                WorkerStep { min_score: 0.4, workers: 5 },
                WorkerStep { min_score: 0.6, workers: 7 },
                WorkerStep { min_score: 0.8, workers: 10 },
            ],
            max_workers: 15,
            base_processing_ms: 30_000,
            per_worker_processing_ms: 15_000,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let all = [w.symptom, w.clinical_data, w.patient, w.diagnostic];
        if all.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::Config("scoring weights must be non-negative".into()));
        }
        let m = &self.urgency_multipliers;
        if [m.routine, m.urgent, m.emergent]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(Error::Config("urgency multipliers must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }
        if self
            .worker_steps
            .windows(2)
            .any(|p| p[1].min_score <= p[0].min_score || p[1].workers < p[0].workers)
        {
            return Err(Error::Config(
                "worker_steps must ascend in min_score and never decrease in workers".into(),
            ));
        }
        Ok(())
    }
}

/// Stateless scorer over an explicit config; construct one per config.
#[derive(Debug, Clone, Default)]
pub struct ComplexityScorer {
    config: ScoringConfig,
}

impl ComplexityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, signals: &CaseSignals) -> ComplexityScore {
        let breakdown = DimensionScores {
            symptom: symptom_complexity(signals),
            clinical_data: clinical_data_complexity(signals),
            patient: patient_complexity(signals),
            diagnostic: diagnostic_complexity(signals),
            urgency: urgency_score(signals.urgency),
        };

        let w = &self.config.weights;
        let weighted = [
            (breakdown.symptom, w.symptom),
            (breakdown.clinical_data, w.clinical_data),
            (breakdown.patient, w.patient),
            (breakdown.diagnostic, w.diagnostic),
        ];
        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        // All-zero weights fall back to an unweighted mean.
        let overall = if total_weight > 0.0 {
            weighted.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
        } else {
            weighted.iter().map(|(s, _)| s).sum::<f64>() / weighted.len() as f64
        }
        .clamp(0.0, 1.0);

        let multiplier = self
            .config
            .urgency_multipliers
            .for_urgency(signals.urgency);
        let normalized = (overall * multiplier).clamp(0.0, 1.0);
        let recommended_workers = self.recommended_workers(normalized);
        let estimated_processing_ms = self.config.base_processing_ms
            + self.config.per_worker_processing_ms * recommended_workers as u64;

        ComplexityScore {
            overall,
            breakdown,
            normalized,
            recommended_workers,
            estimated_processing_ms,
        }
    }

    /// Step function of the normalized score, non-decreasing, within `[1, max_workers]`.
    pub fn recommended_workers(&self, normalized: f64) -> usize {
        self.config
            .worker_steps
            .iter()
            .filter(|step| normalized >= step.min_score)
            .map(|step| step.workers)
            .max()
            .unwrap_or(1)
            .clamp(1, self.config.max_workers)
    }
}

fn ratio(count: usize, saturation: usize) -> f64 {
    (count as f64 / saturation as f64).min(1.0)
}

fn severity_value(severity: Severity) -> f64 {
    match severity {
        Severity::Mild => 0.2,
        Severity::Moderate => 0.5,
        Severity::Severe => 1.0,
    }
}

fn duration_value(days: Option<u32>) -> f64 {
    match days {
        Some(d) if d > 30 => 1.0,
        Some(d) if d > 7 => 0.6,
        _ => 0.3,
    }
}

fn symptom_complexity(signals: &CaseSignals) -> f64 {
    let symptoms = &signals.symptoms;
    if symptoms.is_empty() {
        return 0.0;
    }
    let n = symptoms.len() as f64;
    let count = ratio(symptoms.len(), 8);
    let severity = symptoms.iter().map(|s| severity_value(s.severity)).sum::<f64>() / n;
    let duration = symptoms
        .iter()
        .map(|s| duration_value(s.duration_days))
        .fold(0.0, f64::max);
    count * 0.4 + severity * 0.4 + duration * 0.2
}

fn clinical_data_complexity(signals: &CaseSignals) -> f64 {
    let vitals = signals
        .vitals
        .as_ref()
        .and_then(|v| v.abnormal_fraction())
        .unwrap_or(0.0);
    let labs = signals.abnormal_lab_fraction().unwrap_or(0.0);
    let imaging = if signals.has_imaging() { 1.0 } else { 0.0 };
    vitals * 0.4 + labs * 0.4 + imaging * 0.2
}

fn patient_complexity(signals: &CaseSignals) -> f64 {
    let age = match signals.age {
        Some(a) if a < 2 || a >= 75 => 1.0,
        Some(a) if a >= 65 => 0.7,
        Some(a) if a < 18 => 0.5,
        Some(_) => 0.2,
        None => 0.3,
    };
    let h = &signals.history;
    age * 0.3
        + ratio(h.conditions.len(), 5) * 0.3
        + ratio(h.medications.len(), 10) * 0.25
        + ratio(h.allergies.len(), 5) * 0.15
}

fn diagnostic_complexity(signals: &CaseSignals) -> f64 {
    let breadth = ratio(signals.suspected_conditions.len(), 6);
    let rare = signals.rare_disease_suspicion.clamp(0.0, 1.0);
    let multi_system = match signals.body_system_count() {
        0 | 1 => 0.0,
        2 => 0.5,
        _ => 1.0,
    };
    breadth * 0.4 + rare * 0.35 + multi_system * 0.25
}

fn urgency_score(urgency: Urgency) -> f64 {
    match urgency {
        Urgency::Routine => 0.2,
        Urgency::Urgent => 0.6,
        Urgency::Emergent => 1.0,
    }
}
