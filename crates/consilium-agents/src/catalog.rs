//! Agent Catalog — static directory of worker types and their activation rules.
//!
//! Loaded once at startup (built-in set or a TOML file) and read-only afterwards,
//! so it can be shared behind an `Arc` without synchronization.

use consilium_core::{ActivationKind, ActivationRule, AgentDescriptor, DataTag, Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Bidirectional, case-insensitive substring match between a symptom and a trigger keyword.
///
/// "Chest Pain" matches both "chest pain" and "pain"; "pain" also matches "chest pain".
/// Deliberately lenient: recall over precision. Blank strings never match.
pub fn keywords_match(symptom: &str, keyword: &str) -> bool {
    let symptom = symptom.trim().to_lowercase();
    let keyword = keyword.trim().to_lowercase();
    if symptom.is_empty() || keyword.is_empty() {
        return false;
    }
    symptom.contains(&keyword) || keyword.contains(&symptom)
}

/// The catalog: holds all agent descriptors in declaration order and resolves them by id.
#[derive(Clone, Debug)]
pub struct AgentCatalog {
    agents: Vec<AgentDescriptor>,
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct CatalogFile {
    agents: Vec<AgentDescriptor>,
}

impl AgentCatalog {
    /// Build a catalog, rejecting duplicate identities and out-of-range weights.
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if agent.id.trim().is_empty() {
                return Err(Error::Config("agent id must not be empty".into()));
            }
            if !(0.0..=1.0).contains(&agent.base_weight) {
                return Err(Error::Config(format!(
                    "agent '{}' base_weight {} outside [0, 1]",
                    agent.id, agent.base_weight
                )));
            }
            if let ActivationRule::Keyword { keywords } = &agent.rule {
                if keywords.iter().all(|k| k.trim().is_empty()) {
                    return Err(Error::Config(format!(
                        "keyword agent '{}' has no trigger keywords",
                        agent.id
                    )));
                }
            }
            if index.insert(agent.id.clone(), i).is_some() {
                return Err(Error::Config(format!("duplicate agent id '{}'", agent.id)));
            }
        }
        Ok(Self { agents, index })
    }

    /// Load a catalog from TOML (`[[agents]]` tables).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| Error::Config(format!("catalog: {e}")))?;
        Self::new(file.agents)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn list_all(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    pub fn find_by_id(&self, id: &str) -> Option<&AgentDescriptor> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    /// Agents with the given activation kind, in catalog order.
    pub fn find_by_kind(&self, kind: ActivationKind) -> Vec<&AgentDescriptor> {
        self.agents.iter().filter(|a| a.kind() == kind).collect()
    }

    /// Keyword-triggered agents whose triggers match any of the given keywords.
    pub fn find_by_keywords<S: AsRef<str>>(&self, keywords: &[S]) -> Vec<&AgentDescriptor> {
        self.agents
            .iter()
            .filter(|a| {
                a.rule.keywords().iter().any(|trigger| {
                    keywords
                        .iter()
                        .any(|k| keywords_match(k.as_ref(), trigger))
                })
            })
            .collect()
    }

    /// Resolve a specialty hint: exact id first, then specialty tag (case-insensitive).
    pub fn find_by_specialty(&self, hint: &str) -> Option<&AgentDescriptor> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        self.find_by_id(hint).or_else(|| {
            self.agents
                .iter()
                .find(|a| a.specialty.eq_ignore_ascii_case(hint) || a.id.eq_ignore_ascii_case(hint))
        })
    }

    /// The built-in catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        // Ids are distinct literals; construction cannot fail.
        let agents = builtin_agents();
        let index = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        Self { agents, index }
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn agent(
    id: &str,
    name: &str,
    specialty: &str,
    rule: ActivationRule,
    required_data: &[DataTag],
    base_weight: f64,
    capabilities: &[&str],
) -> AgentDescriptor {
    AgentDescriptor {
        id: id.into(),
        name: name.into(),
        specialty: specialty.into(),
        rule,
        required_data: required_data.to_vec(),
        base_weight,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
    }
}

fn keywords(words: &[&str]) -> ActivationRule {
    ActivationRule::Keyword {
        keywords: words.iter().map(|w| w.to_string()).collect(),
    }
}

fn builtin_agents() -> Vec<AgentDescriptor> {
    use DataTag::*;

    vec![
        // ─── Always active ───
        agent(
            "primary-care-coordinator",
            "Primary Care Coordinator",
            "internal-medicine",
            ActivationRule::Always,
            &[History],
            0.85,
            &["coordination", "differential-diagnosis", "risk-stratification"],
        ),
        agent(
            "diagnostic-reasoning-agent",
            "Diagnostic Reasoning Agent",
            "diagnostics",
            ActivationRule::Always,
            &[],
            0.8,
            &["differential-diagnosis"],
        ),
        // ─── High urgency ───
        agent(
            "emergency-medicine-specialist",
            "Emergency Medicine Specialist",
            "emergency-medicine",
            ActivationRule::HighUrgency,
            &[Vitals],
            0.9,
            &["risk-stratification", "stabilization"],
        ),
        // ─── Keyword triggered ───
        agent(
            "cardiology-specialist",
            "Cardiology Specialist",
            "cardiology",
            keywords(&[
                "chest pain",
                "palpitations",
                "cardiac",
                "heart",
                "syncope",
                "hypertension",
                "edema",
            ]),
            &[Vitals],
            0.85,
            &["risk-stratification"],
        ),
        agent(
            "pulmonology-specialist",
            "Pulmonology Specialist",
            "pulmonology",
            keywords(&[
                "shortness of breath",
                "breath",
                "dyspnea",
                "cough",
                "wheezing",
                "hemoptysis",
            ]),
            &[Vitals],
            0.85,
            &[],
        ),
        agent(
            "neurology-specialist",
            "Neurology Specialist",
            "neurology",
            keywords(&[
                "headache",
                "seizure",
                "numbness",
                "dizziness",
                "confusion",
                "vision loss",
                "slurred speech",
            ]),
            &[],
            0.85,
            &[],
        ),
        agent(
            "gastroenterology-specialist",
            "Gastroenterology Specialist",
            "gastroenterology",
            keywords(&[
                "abdominal pain",
                "nausea",
                "vomiting",
                "diarrhea",
                "jaundice",
                "heartburn",
                "rectal bleeding",
            ]),
            &[],
            0.8,
            &[],
        ),
        agent(
            "infectious-disease-specialist",
            "Infectious Disease Specialist",
            "infectious-disease",
            keywords(&["fever", "chills", "night sweats", "infection"]),
            &[Labs],
            0.8,
            &[],
        ),
        agent(
            "dermatology-specialist",
            "Dermatology Specialist",
            "dermatology",
            keywords(&["rash", "skin lesion", "itching", "hives"]),
            &[],
            0.75,
            &[],
        ),
        agent(
            "endocrinology-specialist",
            "Endocrinology Specialist",
            "endocrinology",
            keywords(&["excessive thirst", "polyuria", "weight loss", "heat intolerance"]),
            &[Labs],
            0.8,
            &[],
        ),
        agent(
            "psychiatry-specialist",
            "Psychiatry Specialist",
            "psychiatry",
            keywords(&["anxiety", "depression", "insomnia", "hallucinations"]),
            &[History],
            0.75,
            &[],
        ),
        // ─── Data requirements ───
        agent(
            "radiology-specialist",
            "Radiology Specialist",
            "radiology",
            ActivationRule::ImagingNeeded,
            &[Imaging],
            0.8,
            &["imaging-interpretation"],
        ),
        agent(
            "laboratory-medicine-specialist",
            "Laboratory Medicine Specialist",
            "laboratory-medicine",
            ActivationRule::LabNeeded,
            &[Labs],
            0.8,
            &["lab-interpretation"],
        ),
        agent(
            "clinical-pharmacologist",
            "Clinical Pharmacologist",
            "pharmacology",
            ActivationRule::DrugQuery,
            &[Medications],
            0.8,
            &["drug-interactions"],
        ),
        agent(
            "general-surgery-specialist",
            "General Surgery Specialist",
            "general-surgery",
            ActivationRule::SurgicalCandidate,
            &[Imaging, Labs],
            0.8,
            &["surgical-assessment"],
        ),
        // ─── Escalation ───
        agent(
            "rare-disease-specialist",
            "Rare Disease Specialist",
            "medical-genetics",
            ActivationRule::RareDiseaseSuspected,
            &[History],
            0.75,
            &["differential-diagnosis", "genetic-evaluation"],
        ),
        agent(
            "complex-case-specialist",
            "Complex Case Specialist",
            "complex-care",
            ActivationRule::ComplexCase,
            &[History],
            0.8,
            &["differential-diagnosis", "coordination"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_match_bidirectional() {
        assert!(keywords_match("Chest Pain", "chest pain"));
        assert!(keywords_match("Chest Pain", "pain"));
        assert!(keywords_match("pain", "Chest Pain"));
        assert!(!keywords_match("cough", "chest pain"));
    }

    #[test]
    fn test_keywords_match_blank_never_matches() {
        assert!(!keywords_match("", "pain"));
        assert!(!keywords_match("pain", "   "));
    }

    #[test]
    fn test_builtin_ids_unique() {
        let catalog = AgentCatalog::builtin();
        let rebuilt = AgentCatalog::new(catalog.list_all().to_vec());
        assert!(rebuilt.is_ok());
        assert_eq!(rebuilt.unwrap().len(), catalog.len());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let catalog = AgentCatalog::builtin();
        let mut agents = catalog.list_all().to_vec();
        agents.push(agents[0].clone());
        let err = AgentCatalog::new(agents).unwrap_err();
        assert!(err.to_string().contains("duplicate agent id"));
    }
}
