//! Consensus Aggregator — merges completed worker results into one ranked opinion.
//!
//! Only completed workers contribute. A worker's primary diagnosis is a vote for
//! that condition; its differentials are mentions. Each worker backs a condition
//! at most once. Only voted conditions can become the primary diagnosis, ranked by
//! (agreement, confidence), then by the voters' summed base weight, then by first
//! appearance. Mention-only conditions rank after every voted one.

use consilium_core::{
    Conflict, ConflictCandidate, ConsensusDiagnosis, ConsensusQuality, ConsensusRecommendation,
    ConsensusResult, Error, EvidenceStrength, PriorityTier, RecommendationKind, ResolutionMethod,
    Result, WorkerResult,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How failed workers affect agreement denominators.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailedWorkerPolicy {
    /// Denominator is the number of completed workers.
    #[default]
    Exclude,
    /// Failed workers count as abstaining: denominator is every dispatched worker.
    CountAsAbstain,
}

/// Agreement at or above each bound reaches that tier; below `moderate` is weak.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrengthThresholds {
    pub moderate: f64,
    pub strong: f64,
    pub very_strong: f64,
}

impl Default for StrengthThresholds {
    fn default() -> Self {
        Self {
            moderate: 0.25,
            strong: 0.5,
            very_strong: 0.75,
        }
    }
}

/// Overall confidence at or above each bound reaches that quality; below `fair` is poor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    pub fair: f64,
    pub good: f64,
    pub excellent: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            fair: 0.5,
            good: 0.7,
            excellent: 0.85,
        }
    }
}

/// Completion fraction below each bound caps quality at that tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionCaps {
    pub poor_below: f64,
    pub fair_below: f64,
    pub good_below: f64,
}

impl Default for CompletionCaps {
    fn default() -> Self {
        Self {
            poor_below: 0.25,
            fair_below: 0.5,
            good_below: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    pub differential_top_n: usize,
    pub evidence_strength: StrengthThresholds,
    /// Groups whose agreement is within this of the leader conflict with it.
    pub conflict_epsilon: f64,
    /// Confidence lead needed for a less-supported group to win a conflict.
    pub evidence_override_margin: f64,
    pub quality: QualityThresholds,
    pub completion_caps: CompletionCaps,
    pub failed_worker_policy: FailedWorkerPolicy,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            differential_top_n: 5,
            evidence_strength: StrengthThresholds::default(),
            conflict_epsilon: 0.1,
            evidence_override_margin: 0.15,
            quality: QualityThresholds::default(),
            completion_caps: CompletionCaps::default(),
            failed_worker_policy: FailedWorkerPolicy::Exclude,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        let ascending = |name: &str, values: [f64; 3]| -> Result<()> {
            let in_range = values.iter().all(|v| (0.0..=1.0).contains(v));
            if !in_range || values[0] > values[1] || values[1] > values[2] {
                return Err(Error::Config(format!(
                    "consensus.{name} must ascend within [0, 1]"
                )));
            }
            Ok(())
        };
        let s = &self.evidence_strength;
        ascending("evidence_strength", [s.moderate, s.strong, s.very_strong])?;
        let q = &self.quality;
        ascending("quality", [q.fair, q.good, q.excellent])?;
        let c = &self.completion_caps;
        ascending("completion_caps", [c.poor_below, c.fair_below, c.good_below])?;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.conflict_epsilon) || !non_negative(self.evidence_override_margin) {
            return Err(Error::Config(
                "consensus.conflict_epsilon and evidence_override_margin must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// One completed worker's result with the weight of the agent that produced it.
#[derive(Debug, Clone)]
pub struct ContributingResult {
    pub agent_id: String,
    pub weight: f64,
    pub result: WorkerResult,
}

/// One worker's backing for a diagnosis group.
#[derive(Debug)]
struct Support {
    agent_id: String,
    weight: f64,
    confidence: f64,
}

/// Weight-averaged confidence; plain mean when every weight is zero.
fn weighted_confidence<'a>(supports: impl Iterator<Item = &'a Support> + Clone) -> f64 {
    let (weight, count) = supports
        .clone()
        .fold((0.0, 0usize), |(w, n), s| (w + s.weight, n + 1));
    if count == 0 {
        return 0.0;
    }
    if weight > 0.0 {
        supports.map(|s| s.weight * s.confidence).sum::<f64>() / weight
    } else {
        supports.map(|s| s.confidence).sum::<f64>() / count as f64
    }
}

#[derive(Debug)]
struct DiagnosisGroup {
    condition: String,
    code: Option<String>,
    aliases: HashSet<String>,
    /// Workers that named this as their primary diagnosis.
    voters: Vec<Support>,
    /// Workers that only listed it among their differentials.
    mentions: Vec<Support>,
    evidence: Vec<String>,
    first_seen: usize,
    /// Primary votes over the denominator.
    agreement: f64,
    /// Confidence of the primary votes.
    confidence: f64,
    /// Voters plus mentions over the denominator.
    support: f64,
    /// Confidence across voters and mentions.
    support_confidence: f64,
}

impl DiagnosisGroup {
    fn has_votes(&self) -> bool {
        !self.voters.is_empty()
    }

    fn vote_weight(&self) -> f64 {
        self.voters.iter().map(|s| s.weight).sum()
    }

    fn backs(&self, agent_id: &str) -> bool {
        self.voters
            .iter()
            .chain(&self.mentions)
            .any(|s| s.agent_id == agent_id)
    }

    fn finalize(&mut self, denominator: f64) {
        self.agreement = (self.voters.len() as f64 / denominator).min(1.0);
        self.confidence = weighted_confidence(self.voters.iter());
        let backers = self.voters.len() + self.mentions.len();
        self.support = (backers as f64 / denominator).min(1.0);
        self.support_confidence = weighted_confidence(self.voters.iter().chain(&self.mentions));
    }

    /// Voted groups first, by (agreement, confidence, vote weight, first seen).
    /// Differential-only groups follow, by (support, support confidence, first seen).
    fn rank(&self, other: &Self) -> Ordering {
        other.has_votes().cmp(&self.has_votes()).then_with(|| {
            if self.has_votes() {
                other
                    .agreement
                    .total_cmp(&self.agreement)
                    .then_with(|| other.confidence.total_cmp(&self.confidence))
                    .then_with(|| other.vote_weight().total_cmp(&self.vote_weight()))
                    .then_with(|| self.first_seen.cmp(&other.first_seen))
            } else {
                other
                    .support
                    .total_cmp(&self.support)
                    .then_with(|| other.support_confidence.total_cmp(&self.support_confidence))
                    .then_with(|| self.first_seen.cmp(&other.first_seen))
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    config: ConsensusConfig,
}

impl ConsensusAggregator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Merge completed results. `dispatched` is the total worker count, failed included.
    ///
    /// The primary diagnosis is chosen from primary votes only; its agreement is
    /// the share of workers that named it as primary. Differentials report the
    /// share of workers that named them anywhere.
    pub fn aggregate(
        &self,
        results: &[ContributingResult],
        dispatched: usize,
    ) -> Result<ConsensusResult> {
        if results.is_empty() {
            return Err(Error::Aggregation("no completed worker results".into()));
        }
        let completed = results.len();
        let dispatched = dispatched.max(completed);
        let denominator = match self.config.failed_worker_policy {
            FailedWorkerPolicy::Exclude => completed,
            FailedWorkerPolicy::CountAsAbstain => dispatched,
        } as f64;

        let mut groups = group_diagnoses(results);
        for g in &mut groups {
            g.finalize(denominator);
        }
        groups.sort_by(|a, b| a.rank(b));

        let conflicts = self.detect_conflict(&mut groups);
        let overall_confidence = overall_confidence(&groups);

        let mut ranked = groups.into_iter();
        let primary = ranked
            .next()
            .filter(DiagnosisGroup::has_votes)
            .ok_or_else(|| Error::Aggregation("no primary diagnoses reported".into()))?;
        let primary = self.primary_diagnosis(primary);
        let differentials: Vec<ConsensusDiagnosis> = ranked
            .take(self.config.differential_top_n)
            .map(|g| self.differential(g))
            .collect();

        let completion = completed as f64 / dispatched as f64;
        let quality = self.quality(overall_confidence, completion);

        debug!(
            primary = %primary.condition,
            agreement = primary.agreement,
            confidence = overall_confidence,
            %quality,
            completed,
            dispatched,
            "Consensus built"
        );

        Ok(ConsensusResult {
            primary_diagnosis: primary,
            differentials,
            recommendations: merge_recommendations(results, denominator),
            conflicts: (!conflicts.is_empty()).then_some(conflicts),
            red_flags: merge_red_flags(results),
            overall_confidence,
            quality,
            contributing_workers: completed,
            dispatched_workers: dispatched,
        })
    }

    /// Record a conflict when two or more voted groups are within epsilon of the
    /// leader's agreement.
    ///
    /// A contender with strictly more voters than the rest wins the vote, unless a
    /// contender with fewer voters beats every other contender's confidence by
    /// the override margin. When the vote is tied, that confidence lead alone
    /// decides. Anything else needs manual review. The winner is moved to the front.
    fn detect_conflict(&self, groups: &mut [DiagnosisGroup]) -> Vec<Conflict> {
        let Some(leader_agreement) = groups.first().map(|g| g.agreement) else {
            return Vec::new();
        };
        let contenders: Vec<usize> = groups
            .iter()
            .enumerate()
            .take_while(|(_, g)| {
                g.has_votes()
                    && (leader_agreement - g.agreement).abs() <= self.config.conflict_epsilon
            })
            .map(|(i, _)| i)
            .collect();
        if contenders.len() < 2 {
            return Vec::new();
        }

        let candidates: Vec<ConflictCandidate> = contenders
            .iter()
            .map(|&i| ConflictCandidate {
                condition: groups[i].condition.clone(),
                agreement: groups[i].agreement,
                confidence: groups[i].confidence,
                supporting_agents: groups[i].voters.iter().map(|s| s.agent_id.clone()).collect(),
            })
            .collect();

        let margin = self.config.evidence_override_margin;
        let evidence_winner = contenders.iter().copied().find(|&i| {
            contenders
                .iter()
                .filter(|&&j| j != i)
                .all(|&j| groups[i].confidence >= groups[j].confidence + margin)
        });
        let front = contenders[0];
        let majority_winner = contenders[1..]
            .iter()
            .all(|&j| groups[j].voters.len() < groups[front].voters.len())
            .then_some(front);

        let (resolution, winner) = match (majority_winner, evidence_winner) {
            (Some(m), Some(e)) if e != m => (ResolutionMethod::EvidenceBased, Some(e)),
            (Some(m), _) => (ResolutionMethod::MajorityVote, Some(m)),
            (None, Some(e)) => (ResolutionMethod::EvidenceBased, Some(e)),
            (None, None) => (ResolutionMethod::ManualReview, None),
        };
        let resolved_to = winner.map(|i| {
            groups[..=i].rotate_right(1);
            groups[0].condition.clone()
        });

        debug!(?resolution, candidates = contenders.len(), "Diagnosis conflict");
        vec![Conflict {
            candidates,
            resolution,
            resolved_to,
        }]
    }

    fn evidence_strength(&self, agreement: f64) -> EvidenceStrength {
        let t = &self.config.evidence_strength;
        if agreement >= t.very_strong {
            EvidenceStrength::VeryStrong
        } else if agreement >= t.strong {
            EvidenceStrength::Strong
        } else if agreement >= t.moderate {
            EvidenceStrength::Moderate
        } else {
            EvidenceStrength::Weak
        }
    }

    fn primary_diagnosis(&self, group: DiagnosisGroup) -> ConsensusDiagnosis {
        ConsensusDiagnosis {
            evidence_strength: self.evidence_strength(group.agreement),
            supporting_agents: group.voters.into_iter().map(|s| s.agent_id).collect(),
            condition: group.condition,
            code: group.code,
            agreement: group.agreement,
            confidence: group.confidence,
            evidence: group.evidence,
        }
    }

    fn differential(&self, group: DiagnosisGroup) -> ConsensusDiagnosis {
        ConsensusDiagnosis {
            evidence_strength: self.evidence_strength(group.support),
            supporting_agents: group
                .voters
                .into_iter()
                .chain(group.mentions)
                .map(|s| s.agent_id)
                .collect(),
            condition: group.condition,
            code: group.code,
            agreement: group.support,
            confidence: group.support_confidence,
            evidence: group.evidence,
        }
    }

    fn quality(&self, confidence: f64, completion: f64) -> ConsensusQuality {
        let q = &self.config.quality;
        let base = if confidence >= q.excellent {
            ConsensusQuality::Excellent
        } else if confidence >= q.good {
            ConsensusQuality::Good
        } else if confidence >= q.fair {
            ConsensusQuality::Fair
        } else {
            ConsensusQuality::Poor
        };
        let c = &self.config.completion_caps;
        let cap = if completion < c.poor_below {
            ConsensusQuality::Poor
        } else if completion < c.fair_below {
            ConsensusQuality::Fair
        } else if completion < c.good_below {
            ConsensusQuality::Good
        } else {
            ConsensusQuality::Excellent
        };
        base.min(cap)
    }
}

/// Case-insensitive, whitespace-collapsed label.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty())
}

const NO_EVIDENCE: &[String] = &[];

fn group_diagnoses(results: &[ContributingResult]) -> Vec<DiagnosisGroup> {
    let mut groups: Vec<DiagnosisGroup> = Vec::new();

    for contribution in results {
        let r = &contribution.result;
        let mut candidates: Vec<(&str, Option<&str>, f64, &[String], bool)> = vec![(
            r.primary_diagnosis.condition.as_str(),
            r.primary_diagnosis.code.as_deref(),
            r.primary_diagnosis.confidence,
            r.primary_diagnosis.evidence.as_slice(),
            true,
        )];
        for d in &r.differentials {
            candidates.push((
                d.condition.as_str(),
                d.code.as_deref(),
                d.probability,
                NO_EVIDENCE,
                false,
            ));
        }

        for (condition, code, confidence, evidence, is_primary) in candidates {
            let label = normalize(condition);
            if label.is_empty() {
                continue;
            }
            let code = normalize_code(code);
            let existing = groups.iter().position(|g| {
                g.aliases.contains(&label) || (code.is_some() && g.code.as_ref() == code.as_ref())
            });
            let idx = match existing {
                Some(i) => i,
                None => {
                    groups.push(DiagnosisGroup {
                        condition: condition.trim().to_string(),
                        code: code.clone(),
                        aliases: HashSet::new(),
                        voters: Vec::new(),
                        mentions: Vec::new(),
                        evidence: Vec::new(),
                        first_seen: groups.len(),
                        agreement: 0.0,
                        confidence: 0.0,
                        support: 0.0,
                        support_confidence: 0.0,
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[idx];
            group.aliases.insert(label);
            if group.code.is_none() {
                group.code = code;
            }
            if group.backs(&contribution.agent_id) {
                continue;
            }
            let support = Support {
                agent_id: contribution.agent_id.clone(),
                weight: contribution.weight,
                confidence: confidence.clamp(0.0, 1.0),
            };
            if is_primary {
                group.voters.push(support);
            } else {
                group.mentions.push(support);
            }
            for e in evidence {
                if !group.evidence.contains(e) {
                    group.evidence.push(e.clone());
                }
            }
        }
    }
    groups
}

/// Agreement-weighted mean confidence over the voted groups.
fn overall_confidence(groups: &[DiagnosisGroup]) -> f64 {
    let total: f64 = groups.iter().map(|g| g.agreement).sum();
    if total <= 0.0 {
        return 0.0;
    }
    groups.iter().map(|g| g.agreement * g.confidence).sum::<f64>() / total
}

fn merge_recommendations(
    results: &[ContributingResult],
    denominator: f64,
) -> Vec<ConsensusRecommendation> {
    struct Merged {
        kind: RecommendationKind,
        text: String,
        priority: PriorityTier,
        agents: Vec<String>,
        first_seen: usize,
    }

    let mut merged: Vec<Merged> = Vec::new();
    let mut index: HashMap<(RecommendationKind, String), usize> = HashMap::new();

    for contribution in results {
        for rec in &contribution.result.recommendations {
            let key = (rec.kind, normalize(&rec.text));
            if key.1.is_empty() {
                continue;
            }
            let i = *index.entry(key).or_insert_with(|| {
                merged.push(Merged {
                    kind: rec.kind,
                    text: rec.text.trim().to_string(),
                    priority: rec.priority,
                    agents: Vec::new(),
                    first_seen: merged.len(),
                });
                merged.len() - 1
            });
            let m = &mut merged[i];
            m.priority = m.priority.max(rec.priority);
            if !m.agents.contains(&contribution.agent_id) {
                m.agents.push(contribution.agent_id.clone());
            }
        }
    }

    merged.sort_by(|a, b| {
        b.agents
            .len()
            .cmp(&a.agents.len())
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });
    merged
        .into_iter()
        .map(|m| ConsensusRecommendation {
            kind: m.kind,
            text: m.text,
            priority: m.priority,
            agreement: (m.agents.len() as f64 / denominator).min(1.0),
            supporting_agents: m.agents,
        })
        .collect()
}

/// Union of worker concerns, first wording wins.
fn merge_red_flags(results: &[ContributingResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .flat_map(|c| c.result.concerns.iter())
        .filter(|flag| seen.insert(normalize(flag)))
        .map(|flag| flag.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(agent: &str, condition: &str, confidence: f64) -> ContributingResult {
        ContributingResult {
            agent_id: agent.into(),
            weight: 0.8,
            result: WorkerResult::diagnosis(condition, confidence),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Acute   Coronary Syndrome. "), "acute coronary syndrome");
    }

    #[test]
    fn test_grouping_by_code() {
        let mut a = contribution("a", "Myocardial infarction", 0.8);
        a.result.primary_diagnosis.code = Some("i21".into());
        let mut b = contribution("b", "Heart attack", 0.6);
        b.result.primary_diagnosis.code = Some("I21".into());
        let groups = group_diagnoses(&[a, b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].voters.len(), 2);
    }

    #[test]
    fn test_worker_supports_group_once() {
        let mut a = contribution("a", "Pneumonia", 0.8);
        a.result.differentials.push(consilium_core::DifferentialEntry {
            condition: "pneumonia".into(),
            code: None,
            probability: 0.3,
            reasoning: None,
        });
        let groups = group_diagnoses(&[a]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].voters.len(), 1);
        assert_eq!(groups[0].voters[0].confidence, 0.8);
        assert!(groups[0].mentions.is_empty());
    }

    #[test]
    fn test_differential_mentions_rank_after_votes() {
        let mut a = contribution("a", "Asthma", 0.5);
        let mut b = contribution("b", "Bronchitis", 0.5);
        for c in [&mut a, &mut b] {
            c.result.differentials.push(consilium_core::DifferentialEntry {
                condition: "Pneumonia".into(),
                code: None,
                probability: 0.9,
                reasoning: None,
            });
        }
        let mut groups = group_diagnoses(&[a, b]);
        for g in &mut groups {
            g.finalize(2.0);
        }
        groups.sort_by(|x, y| x.rank(y));

        assert_eq!(groups[2].condition, "Pneumonia");
        assert_eq!(groups[2].agreement, 0.0);
        assert_eq!(groups[2].support, 1.0);
        assert_eq!(groups[0].agreement, 0.5);
    }

    #[test]
    fn test_quality_capped_by_completion() {
        let agg = ConsensusAggregator::default();
        assert_eq!(agg.quality(0.95, 1.0), ConsensusQuality::Excellent);
        assert_eq!(agg.quality(0.95, 0.4), ConsensusQuality::Fair);
        assert_eq!(agg.quality(0.3, 1.0), ConsensusQuality::Poor);
    }
}
