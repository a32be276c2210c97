//! Case signals: everything the pipeline knows about an incoming case.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Urgency tier of a case.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Routine,
    Urgent,
    Emergent,
}

impl Urgency {
    /// Urgent and emergent cases pull in high-urgency agents and escalation clauses.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Urgent | Self::Emergent)
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Routine => write!(f, "routine"),
            Self::Urgent => write!(f, "urgent"),
            Self::Emergent => write!(f, "emergent"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    #[default]
    Moderate,
    Severe,
}

/// A reported symptom. A bare JSON string deserializes as a symptom with defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "SymptomRepr")]
pub struct Symptom {
    pub description: String,
    pub severity: Severity,
    pub duration_days: Option<u32>,
    /// Organ system the symptom belongs to (e.g. "cardiovascular").
    pub body_system: Option<String>,
}

impl Symptom {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            severity: Severity::default(),
            duration_days: None,
            body_system: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duration_days = Some(days);
        self
    }

    pub fn with_body_system(mut self, system: impl Into<String>) -> Self {
        self.body_system = Some(system.into());
        self
    }
}

impl From<&str> for Symptom {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symptom {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SymptomRepr {
    Text(String),
    Full {
        description: String,
        #[serde(default)]
        severity: Severity,
        #[serde(default)]
        duration_days: Option<u32>,
        #[serde(default)]
        body_system: Option<String>,
    },
}

impl From<SymptomRepr> for Symptom {
    fn from(repr: SymptomRepr) -> Self {
        match repr {
            SymptomRepr::Text(description) => Symptom::new(description),
            SymptomRepr::Full {
                description,
                severity,
                duration_days,
                body_system,
            } => Symptom {
                description,
                severity,
                duration_days,
                body_system,
            },
        }
    }
}

/// Measured vital signs. Every field is optional; unmeasured values are ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VitalSigns {
    pub heart_rate: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub temperature_c: Option<f64>,
    pub oxygen_saturation: Option<f64>,
}

// (value, normal low, normal high, plausible low, plausible high)
type VitalRange = (Option<f64>, f64, f64, f64, f64);

impl VitalSigns {
    fn ranges(&self) -> [(&'static str, VitalRange); 6] {
        [
            ("heart_rate", (self.heart_rate, 60.0, 100.0, 20.0, 300.0)),
            ("systolic_bp", (self.systolic_bp, 90.0, 140.0, 40.0, 300.0)),
            ("diastolic_bp", (self.diastolic_bp, 60.0, 90.0, 20.0, 200.0)),
            ("respiratory_rate", (self.respiratory_rate, 12.0, 20.0, 4.0, 80.0)),
            ("temperature_c", (self.temperature_c, 36.1, 37.8, 25.0, 45.0)),
            ("oxygen_saturation", (self.oxygen_saturation, 95.0, 100.0, 0.0, 100.0)),
        ]
    }

    pub fn measured_count(&self) -> usize {
        self.ranges().iter().filter(|(_, r)| r.0.is_some()).count()
    }

    /// Fraction of measured vitals outside the adult reference range, or `None` if nothing was measured.
    pub fn abnormal_fraction(&self) -> Option<f64> {
        let measured = self.measured_count();
        if measured == 0 {
            return None;
        }
        let abnormal = self
            .ranges()
            .iter()
            .filter_map(|(_, (value, lo, hi, _, _))| value.map(|v| v < *lo || v > *hi))
            .filter(|abnormal| *abnormal)
            .count();
        Some(abnormal as f64 / measured as f64)
    }

    fn validate(&self) -> Result<()> {
        for (name, (value, _, _, min, max)) in self.ranges() {
            if let Some(v) = value {
                if !v.is_finite() || v < min || v > max {
                    return Err(Error::validation(format!(
                        "vital {name}={v} outside plausible range [{min}, {max}]"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabResult {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub abnormal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImagingStudy {
    pub modality: String,
    #[serde(default)]
    pub finding: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MedicalHistory {
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub allergies: Vec<String>,
    pub surgeries: Vec<String>,
}

/// Raw signals for one case. Immutable once submitted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaseSignals {
    pub case_id: Option<String>,
    pub chief_complaint: Option<String>,
    pub urgency: Urgency,
    pub symptoms: Vec<Symptom>,
    pub age: Option<u32>,
    pub vitals: Option<VitalSigns>,
    pub labs: Vec<LabResult>,
    pub labs_required: bool,
    pub imaging: Vec<ImagingStudy>,
    pub imaging_required: bool,
    pub history: MedicalHistory,
    /// Suspicion of a rare disease, in [0, 1].
    pub rare_disease_suspicion: f64,
    /// Conditions already on the table; drives differential breadth.
    pub suspected_conditions: Vec<String>,
    /// Explicit specialty requests (agent id or specialty tag).
    pub specialty_hints: Vec<String>,
    pub medication_review_required: bool,
    pub surgical_candidate: bool,
}

impl CaseSignals {
    pub fn new<S: Into<Symptom>>(urgency: Urgency, symptoms: impl IntoIterator<Item = S>) -> Self {
        Self {
            urgency,
            symptoms: symptoms.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Reject malformed signals before they reach the scorer.
    pub fn validate(&self) -> Result<()> {
        if self.symptoms.is_empty() {
            return Err(Error::validation("at least one symptom is required"));
        }
        if self
            .symptoms
            .iter()
            .any(|s| s.description.trim().is_empty())
        {
            return Err(Error::validation("symptom description must not be blank"));
        }
        if !self.rare_disease_suspicion.is_finite()
            || !(0.0..=1.0).contains(&self.rare_disease_suspicion)
        {
            return Err(Error::validation(format!(
                "rare_disease_suspicion must be in [0, 1], got {}",
                self.rare_disease_suspicion
            )));
        }
        if let Some(age) = self.age {
            if age > 130 {
                return Err(Error::validation(format!("implausible age {age}")));
            }
        }
        if let Some(vitals) = &self.vitals {
            vitals.validate()?;
        }
        Ok(())
    }

    pub fn symptom_texts(&self) -> impl Iterator<Item = &str> {
        self.symptoms.iter().map(|s| s.description.as_str())
    }

    pub fn has_imaging(&self) -> bool {
        self.imaging_required || !self.imaging.is_empty()
    }

    pub fn has_labs(&self) -> bool {
        self.labs_required || !self.labs.is_empty()
    }

    pub fn has_medications(&self) -> bool {
        !self.history.medications.is_empty()
    }

    /// Explicit flag, or a medication list at or above the polypharmacy threshold.
    pub fn requires_medication_review(&self, polypharmacy_threshold: usize) -> bool {
        self.medication_review_required
            || (polypharmacy_threshold > 0 && self.history.medications.len() >= polypharmacy_threshold)
    }

    /// Fraction of reported labs flagged abnormal, or `None` without labs.
    pub fn abnormal_lab_fraction(&self) -> Option<f64> {
        if self.labs.is_empty() {
            return None;
        }
        let abnormal = self.labs.iter().filter(|l| l.abnormal).count();
        Some(abnormal as f64 / self.labs.len() as f64)
    }

    /// Distinct body systems named across symptoms (case-insensitive).
    pub fn body_system_count(&self) -> usize {
        self.symptoms
            .iter()
            .filter_map(|s| s.body_system.as_deref())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .len()
    }
}
