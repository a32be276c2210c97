//! Instruction Builder — turns a selected agent plus case data into a self-contained task.
//!
//! Instructions carry no orchestration state: an agent sees its role, the case,
//! its focus areas, data directives and the output shape it must return.

use crate::catalog::keywords_match;
use consilium_core::{
    ActivationKind, AgentDescriptor, CaseSignals, DataTag, Error, ExpectedOutput, Result,
    WorkerInstruction, WorkerRole,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fields every worker must return, named after the result payload keys.
pub const REQUIRED_OUTPUT_FIELDS: [&str; 9] = [
    "primary_diagnosis.condition",
    "primary_diagnosis.code",
    "primary_diagnosis.confidence",
    "differentials",
    "concerns",
    "recommendations[type=diagnostic_test]",
    "recommendations[type=treatment]",
    "risk",
    "specialty_notes",
];

const OUTPUT_TEMPLATE: &str = "\
Respond with a single JSON object:
{
  \"primary_diagnosis\": {\"condition\": str, \"code\": str|null, \"confidence\": 0..1, \"evidence\": [str]},
  \"differentials\": [{\"condition\": str, \"code\": str|null, \"probability\": 0..1, \"reasoning\": str}],
  \"concerns\": [str],            // red flags
  \"findings\": [str],
  \"recommendations\": [{\"type\": \"diagnostic_test\"|\"treatment\"|\"referral\"|\"monitoring\"|\"lifestyle\", \"text\": str, \"priority\": \"low\"|\"medium\"|\"high\"|\"critical\"}],
  \"risk\": {\"level\": \"low\"|\"moderate\"|\"high\"|\"critical\", \"factors\": [str], \"prognosis\": str},
  \"confidence\": 0..1,
  \"specialty_notes\": str
}";

/// Capability → focus area every agent with that capability receives.
const CAPABILITY_FOCUS: [(&str, &str); 9] = [
    ("differential-diagnosis", "differential diagnosis"),
    ("risk-stratification", "risk stratification"),
    ("coordination", "care coordination"),
    ("stabilization", "acute stabilization priorities"),
    ("imaging-interpretation", "imaging interpretation"),
    ("lab-interpretation", "laboratory interpretation"),
    ("drug-interactions", "drug interaction screening"),
    ("surgical-assessment", "surgical candidacy assessment"),
    ("genetic-evaluation", "genetic and rare disease evaluation"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstructionConfig {
    pub base_timeout_ms: u64,
    pub per_worker_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            base_timeout_ms: 120_000,
            per_worker_timeout_ms: 30_000,
            max_timeout_ms: 600_000,
        }
    }
}

impl InstructionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_timeout_ms < self.base_timeout_ms {
            return Err(Error::Config(
                "instructions.max_timeout_ms must be >= base_timeout_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructionBuilder {
    config: InstructionConfig,
}

impl InstructionBuilder {
    pub fn new(config: InstructionConfig) -> Self {
        Self { config }
    }

    /// Submission deadline: `min(base + per_worker * count, max)`.
    pub fn compute_timeout(&self, recommended_workers: usize) -> Duration {
        let ms = self
            .config
            .base_timeout_ms
            .saturating_add(
                self.config
                    .per_worker_timeout_ms
                    .saturating_mul(recommended_workers as u64),
            )
            .min(self.config.max_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn build_all(
        &self,
        agents: &[AgentDescriptor],
        signals: &CaseSignals,
    ) -> Vec<WorkerInstruction> {
        agents
            .iter()
            .map(|agent| self.build_instruction(agent, signals))
            .collect()
    }

    pub fn build_instruction(
        &self,
        agent: &AgentDescriptor,
        signals: &CaseSignals,
    ) -> WorkerInstruction {
        let role = role_for(agent);
        let focus_areas = focus_areas(agent, signals);

        let mut task = format!(
            "You are the {} acting as {} in a multi-specialist case review. Specialty: {}.\n",
            agent.name, role, agent.specialty
        );

        task.push_str("\nCase summary:\n");
        task.push_str(&case_summary(signals));

        if !focus_areas.is_empty() {
            task.push_str("\nFocus areas:\n");
            for area in &focus_areas {
                task.push_str(&format!("- {area}\n"));
            }
        }

        let directives = directives(agent, signals);
        if !directives.is_empty() {
            task.push_str("\nDirectives:\n");
            for d in &directives {
                task.push_str(&format!("- {d}\n"));
            }
        }

        if signals.urgency.is_elevated() {
            task.push_str(&format!(
                "\nURGENT: this case is {}. Address life-threatening conditions and immediate \
                 interventions first, and flag anything that cannot wait.\n",
                signals.urgency
            ));
        }

        task.push('\n');
        task.push_str(OUTPUT_TEMPLATE);
        task.push('\n');

        WorkerInstruction {
            agent_id: agent.id.clone(),
            role,
            task,
            focus_areas,
            expected_output: expected_output(),
            confidence_weight: agent.base_weight,
        }
    }
}

pub fn expected_output() -> ExpectedOutput {
    ExpectedOutput {
        format: "json".into(),
        required_fields: REQUIRED_OUTPUT_FIELDS.iter().map(|f| f.to_string()).collect(),
        specialty_notes_field: "specialty_notes".into(),
    }
}

fn role_for(agent: &AgentDescriptor) -> WorkerRole {
    if agent.kind() == ActivationKind::Always && agent.has_capability("coordination") {
        WorkerRole::PrimaryCoordinator
    } else if agent.kind() == ActivationKind::HighUrgency {
        WorkerRole::EmergencySpecialist
    } else {
        WorkerRole::SpecialistConsultant
    }
}

/// Symptoms matching the agent's triggers, then capability-driven focus hints. Deduplicated.
fn focus_areas(agent: &AgentDescriptor, signals: &CaseSignals) -> Vec<String> {
    let mut areas: Vec<String> = Vec::new();
    let mut push = |area: String| {
        if !areas.iter().any(|a| a.eq_ignore_ascii_case(&area)) {
            areas.push(area);
        }
    };

    for symptom in signals.symptom_texts() {
        if agent
            .rule
            .keywords()
            .iter()
            .any(|k| keywords_match(symptom, k))
        {
            push(symptom.trim().to_string());
        }
    }
    for (capability, focus) in CAPABILITY_FOCUS {
        if agent.has_capability(capability) {
            push(focus.to_string());
        }
    }
    areas
}

fn directives(agent: &AgentDescriptor, signals: &CaseSignals) -> Vec<String> {
    let mut out = Vec::new();

    if !signals.imaging.is_empty() {
        let studies: Vec<String> = signals
            .imaging
            .iter()
            .map(|s| match &s.finding {
                Some(f) => format!("{} ({f})", s.modality),
                None => s.modality.clone(),
            })
            .collect();
        out.push(format!("Review imaging: {}.", studies.join("; ")));
    } else if signals.imaging_required {
        out.push("Review imaging needs: imaging is required but not yet available.".into());
    }

    if !signals.labs.is_empty() {
        let labs: Vec<String> = signals
            .labs
            .iter()
            .map(|l| {
                let value = l.value.as_deref().unwrap_or("pending");
                let flag = if l.abnormal { ", abnormal" } else { "" };
                format!("{} = {value}{flag}", l.name)
            })
            .collect();
        out.push(format!("Analyze labs: {}.", labs.join("; ")));
    } else if signals.labs_required {
        out.push("Analyze labs: laboratory workup is required; recommend the panel.".into());
    }

    if signals.has_medications() && agent.kind() == ActivationKind::DrugQuery {
        out.push(format!(
            "Review medication list for interactions, contraindications and dosing: {}.",
            signals.history.medications.join(", ")
        ));
    }

    for tag in &agent.required_data {
        if !has_data(*tag, signals) {
            out.push(format!("Expected {tag} data was not supplied; state how that limits your assessment."));
        }
    }
    out
}

fn has_data(tag: DataTag, signals: &CaseSignals) -> bool {
    match tag {
        DataTag::Vitals => signals
            .vitals
            .as_ref()
            .is_some_and(|v| v.measured_count() > 0),
        DataTag::Labs => !signals.labs.is_empty(),
        DataTag::Imaging => !signals.imaging.is_empty(),
        DataTag::Medications => signals.has_medications(),
        DataTag::History => {
            let h = &signals.history;
            !(h.conditions.is_empty() && h.surgeries.is_empty() && h.allergies.is_empty())
        }
    }
}

fn case_summary(signals: &CaseSignals) -> String {
    let mut s = format!("- Urgency: {}\n", signals.urgency);
    if let Some(cc) = &signals.chief_complaint {
        s.push_str(&format!("- Chief complaint: {cc}\n"));
    }
    if let Some(age) = signals.age {
        s.push_str(&format!("- Age: {age}\n"));
    }
    let symptoms: Vec<String> = signals
        .symptoms
        .iter()
        .map(|sym| {
            let severity = format!("{:?}", sym.severity).to_lowercase();
            let mut d = format!("{} ({severity}", sym.description);
            if let Some(days) = sym.duration_days {
                d.push_str(&format!(", {days} day(s)"));
            }
            d.push(')');
            d
        })
        .collect();
    s.push_str(&format!("- Symptoms: {}\n", symptoms.join("; ")));

    if let Some(v) = &signals.vitals {
        let mut parts = Vec::new();
        let fields = [
            ("HR", v.heart_rate),
            ("SBP", v.systolic_bp),
            ("DBP", v.diastolic_bp),
            ("RR", v.respiratory_rate),
            ("Temp", v.temperature_c),
            ("SpO2", v.oxygen_saturation),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                parts.push(format!("{label} {value}"));
            }
        }
        if !parts.is_empty() {
            s.push_str(&format!("- Vitals: {}\n", parts.join(", ")));
        }
    }

    let h = &signals.history;
    for (label, list) in [
        ("Conditions", &h.conditions),
        ("Medications", &h.medications),
        ("Allergies", &h.allergies),
        ("Surgeries", &h.surgeries),
    ] {
        if !list.is_empty() {
            s.push_str(&format!("- {label}: {}\n", list.join(", ")));
        }
    }
    if !signals.suspected_conditions.is_empty() {
        s.push_str(&format!(
            "- Under consideration: {}\n",
            signals.suspected_conditions.join(", ")
        ));
    }
    s
}
