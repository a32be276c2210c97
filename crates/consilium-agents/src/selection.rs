//! Selection Policy — decides which agents to invoke for a case, in strict priority tiers.
//!
//! 1. always-active, 2. high-urgency, 3. keyword-triggered, 4. data requirements
//! (imaging, labs, drug therapy, surgical), 5. rare disease, 6. complex case,
//! 7. explicit specialty hints (only up to the recommended worker count).
//!
//! Each tier only adds agents not already present. When the list exceeds the
//! configured maximum it is truncated in insertion order, so later tiers lose
//! capacity contention to earlier ones.

use crate::catalog::{keywords_match, AgentCatalog};
use consilium_core::{
    ActivationKind, ActivationRule, AgentDescriptor, CaseSignals, ComplexityScore, Error,
    PriorityTier, Result, SpawnDecision, Urgency,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Upper bound on selected agents, regardless of tier.
    pub max_agents: usize,
    /// Rare-disease specialist joins when suspicion exceeds this.
    pub rare_disease_threshold: f64,
    /// Complex-case specialist joins when the normalized score exceeds this.
    pub complexity_threshold: f64,
    /// Medication count that implies a medication review. 0 disables.
    pub polypharmacy_threshold: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_agents: 10,
            rare_disease_threshold: 0.5,
            complexity_threshold: 0.6,
            polypharmacy_threshold: 5,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_agents == 0 {
            return Err(Error::Config("selection.max_agents must be at least 1".into()));
        }
        for (name, v) in [
            ("rare_disease_threshold", self.rare_disease_threshold),
            ("complexity_threshold", self.complexity_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!("selection.{name} must be in [0, 1]")));
            }
        }
        Ok(())
    }
}

/// Inputs to one selection pass.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub signals: &'a CaseSignals,
    pub complexity: &'a ComplexityScore,
}

impl<'a> SelectionRequest<'a> {
    pub fn new(signals: &'a CaseSignals, complexity: &'a ComplexityScore) -> Self {
        Self { signals, complexity }
    }
}

pub struct SelectionPolicy {
    catalog: Arc<AgentCatalog>,
    config: SelectionConfig,
}

impl SelectionPolicy {
    pub fn new(catalog: Arc<AgentCatalog>, config: SelectionConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Arc<AgentCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Ordered, deduplicated agent list, capped at `max_agents`.
    pub fn select_agents(&self, request: &SelectionRequest<'_>) -> Vec<AgentDescriptor> {
        let mut selected: Vec<&AgentDescriptor> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for kind in ActivationKind::SELECTION_ORDER {
            for agent in self.catalog.find_by_kind(kind) {
                if seen.contains(agent.id.as_str()) {
                    continue;
                }
                if let Some(reason) = self.activation_reason(agent, request) {
                    debug!(agent = %agent.id, tier = kind.tier(), reason = %reason, "Agent selected");
                    seen.insert(agent.id.as_str());
                    selected.push(agent);
                }
            }
        }

        // Tier 7: hints only fill up to the recommended count.
        let target = request
            .complexity
            .recommended_workers
            .min(self.config.max_agents);
        for hint in &request.signals.specialty_hints {
            if selected.len() >= target {
                break;
            }
            match self.resolve_hint(hint) {
                Ok(agent) if !seen.contains(agent.id.as_str()) => {
                    debug!(agent = %agent.id, hint = %hint, "Agent selected from specialty hint");
                    seen.insert(agent.id.as_str());
                    selected.push(agent);
                }
                Ok(_) => {}
                Err(e) => warn!(hint = %hint, error = %e, "Skipping specialty hint"),
            }
        }

        if selected.len() > self.config.max_agents {
            let dropped: Vec<&str> = selected[self.config.max_agents..]
                .iter()
                .map(|a| a.id.as_str())
                .collect();
            debug!(max = self.config.max_agents, ?dropped, "Selection truncated");
            selected.truncate(self.config.max_agents);
        }

        selected.into_iter().cloned().collect()
    }

    /// Evaluate one agent's activation rule in isolation. Reports eligibility, not
    /// capacity: an eligible agent can still be truncated from the bulk selection.
    pub fn decide(&self, agent: &AgentDescriptor, request: &SelectionRequest<'_>) -> SpawnDecision {
        let urgency = request.signals.urgency;
        let (should_spawn, reason, priority) = match self.activation_reason(agent, request) {
            Some(reason) => (true, reason, rule_priority(&agent.rule, urgency)),
            None if self.is_hinted(agent, request.signals) => (
                true,
                "explicitly requested specialty; fills remaining capacity".to_string(),
                PriorityTier::Low,
            ),
            None => (
                false,
                self.inactive_reason(agent, request),
                rule_priority(&agent.rule, urgency),
            ),
        };
        SpawnDecision {
            agent_id: agent.id.clone(),
            should_spawn,
            reason,
            priority,
            estimated_completion_ms: if should_spawn {
                request.complexity.estimated_processing_ms
            } else {
                0
            },
        }
    }

    /// Decisions for every catalog agent, in catalog order.
    pub fn decide_all(&self, request: &SelectionRequest<'_>) -> Vec<SpawnDecision> {
        self.catalog
            .list_all()
            .iter()
            .map(|agent| self.decide(agent, request))
            .collect()
    }

    fn resolve_hint(&self, hint: &str) -> Result<&AgentDescriptor> {
        self.catalog
            .find_by_specialty(hint)
            .ok_or_else(|| Error::UnknownAgent(hint.to_string()))
    }

    fn is_hinted(&self, agent: &AgentDescriptor, signals: &CaseSignals) -> bool {
        signals
            .specialty_hints
            .iter()
            .filter_map(|h| self.catalog.find_by_specialty(h))
            .any(|a| a.id == agent.id)
    }

    /// `Some(reason)` when the agent's rule fires for this request.
    fn activation_reason(
        &self,
        agent: &AgentDescriptor,
        request: &SelectionRequest<'_>,
    ) -> Option<String> {
        let signals = request.signals;
        match &agent.rule {
            ActivationRule::Always => Some("always-active agent".into()),
            ActivationRule::HighUrgency => signals
                .urgency
                .is_elevated()
                .then(|| format!("case urgency is {}", signals.urgency)),
            ActivationRule::Keyword { keywords } => signals.symptom_texts().find_map(|symptom| {
                keywords
                    .iter()
                    .find(|k| keywords_match(symptom, k))
                    .map(|k| format!("symptom '{symptom}' matches trigger '{k}'"))
            }),
            ActivationRule::ImagingNeeded => signals.has_imaging().then(|| {
                if signals.imaging.is_empty() {
                    "imaging required".to_string()
                } else {
                    format!("{} imaging stud(ies) present", signals.imaging.len())
                }
            }),
            ActivationRule::LabNeeded => signals.has_labs().then(|| {
                if signals.labs.is_empty() {
                    "laboratory workup required".to_string()
                } else {
                    format!("{} lab result(s) present", signals.labs.len())
                }
            }),
            ActivationRule::DrugQuery => signals
                .requires_medication_review(self.config.polypharmacy_threshold)
                .then(|| {
                    format!(
                        "medication review required ({} medication(s))",
                        signals.history.medications.len()
                    )
                }),
            ActivationRule::SurgicalCandidate => signals
                .surgical_candidate
                .then(|| "surgical candidacy flagged".to_string()),
            ActivationRule::RareDiseaseSuspected => (signals.rare_disease_suspicion
                > self.config.rare_disease_threshold)
                .then(|| {
                    format!(
                        "rare disease suspicion {:.2} > {:.2}",
                        signals.rare_disease_suspicion, self.config.rare_disease_threshold
                    )
                }),
            ActivationRule::ComplexCase => (request.complexity.normalized
                > self.config.complexity_threshold)
                .then(|| {
                    format!(
                        "normalized complexity {:.2} > {:.2}",
                        request.complexity.normalized, self.config.complexity_threshold
                    )
                }),
        }
    }

    fn inactive_reason(&self, agent: &AgentDescriptor, request: &SelectionRequest<'_>) -> String {
        let signals = request.signals;
        match &agent.rule {
            ActivationRule::Always => "always-active agent".into(),
            ActivationRule::HighUrgency => format!("case urgency is {}", signals.urgency),
            ActivationRule::Keyword { .. } => "no symptom matches trigger keywords".into(),
            ActivationRule::ImagingNeeded => "no imaging present or required".into(),
            ActivationRule::LabNeeded => "no labs present or required".into(),
            ActivationRule::DrugQuery => "no medication review required".into(),
            ActivationRule::SurgicalCandidate => "not a surgical candidate".into(),
            ActivationRule::RareDiseaseSuspected => format!(
                "rare disease suspicion {:.2} <= {:.2}",
                signals.rare_disease_suspicion, self.config.rare_disease_threshold
            ),
            ActivationRule::ComplexCase => format!(
                "normalized complexity {:.2} <= {:.2}",
                request.complexity.normalized, self.config.complexity_threshold
            ),
        }
    }
}

fn rule_priority(rule: &ActivationRule, urgency: Urgency) -> PriorityTier {
    match rule {
        ActivationRule::HighUrgency => PriorityTier::Critical,
        ActivationRule::Always if urgency == Urgency::Emergent => PriorityTier::Critical,
        ActivationRule::Always | ActivationRule::Keyword { .. } => PriorityTier::High,
        _ => PriorityTier::Medium,
    }
}
