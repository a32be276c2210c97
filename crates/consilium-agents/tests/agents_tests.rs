//! Tests for consilium-agents: AgentCatalog, ComplexityScorer, SelectionPolicy, InstructionBuilder

use consilium_agents::*;
use consilium_core::*;
use std::collections::HashSet;
use std::sync::Arc;

fn policy(config: SelectionConfig) -> SelectionPolicy {
    SelectionPolicy::new(Arc::new(AgentCatalog::builtin()), config)
}

fn ids(agents: &[AgentDescriptor]) -> Vec<&str> {
    agents.iter().map(|a| a.id.as_str()).collect()
}

fn busy_case() -> CaseSignals {
    let mut case = CaseSignals::new(
        Urgency::Emergent,
        [
            Symptom::new("chest pain")
                .with_severity(Severity::Severe)
                .with_body_system("cardiovascular"),
            Symptom::new("shortness of breath").with_body_system("respiratory"),
            Symptom::new("fever").with_duration_days(10),
            Symptom::new("headache").with_body_system("neurological"),
            Symptom::new("rash"),
        ],
    );
    case.age = Some(78);
    case.imaging_required = true;
    case.labs = vec![LabResult {
        name: "troponin".into(),
        value: Some("0.9".into()),
        abnormal: true,
    }];
    case.history.medications = (0..6).map(|i| format!("drug-{i}")).collect();
    case.history.conditions = vec!["diabetes".into(), "ckd".into()];
    case.rare_disease_suspicion = 0.7;
    case.suspected_conditions = vec!["acs".into(), "pe".into(), "pneumonia".into()];
    case
}

// ===========================================================================
// AgentCatalog
// ===========================================================================

#[test]
fn catalog_builtin_has_always_active_agents() {
    let catalog = AgentCatalog::builtin();
    let always = catalog.find_by_kind(ActivationKind::Always);
    assert_eq!(
        always.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
        vec!["primary-care-coordinator", "diagnostic-reasoning-agent"]
    );
}

#[test]
fn catalog_find_by_specialty_id_then_tag() {
    let catalog = AgentCatalog::builtin();
    assert_eq!(
        catalog.find_by_specialty("cardiology-specialist").map(|a| a.id.as_str()),
        Some("cardiology-specialist")
    );
    assert_eq!(
        catalog.find_by_specialty("Dermatology").map(|a| a.id.as_str()),
        Some("dermatology-specialist")
    );
    assert!(catalog.find_by_specialty("astrology").is_none());
}

#[test]
fn catalog_find_by_keywords() {
    let catalog = AgentCatalog::builtin();
    let found = catalog.find_by_keywords(&["Wheezing"]);
    let found: Vec<&str> = found.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(found, vec!["pulmonology-specialist"]);
}

#[test]
fn catalog_from_toml() {
    let toml = r#"
[[agents]]
id = "sleep-specialist"
name = "Sleep Specialist"
specialty = "sleep-medicine"
base_weight = 0.7
rule = { kind = "keyword", keywords = ["snoring", "insomnia"] }

[[agents]]
id = "generalist"
name = "Generalist"
specialty = "general"
base_weight = 0.8
rule = { kind = "always" }
required_data = ["history"]
"#;
    let catalog = AgentCatalog::from_toml_str(toml).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.find_by_id("generalist").unwrap().kind(), ActivationKind::Always);
    assert_eq!(
        catalog.find_by_id("sleep-specialist").unwrap().rule.keywords(),
        &["snoring".to_string(), "insomnia".to_string()]
    );
}

#[test]
fn catalog_rejects_weight_out_of_range() {
    let mut agents = AgentCatalog::builtin().list_all().to_vec();
    agents[0].base_weight = 1.5;
    assert!(matches!(AgentCatalog::new(agents), Err(Error::Config(_))));
}

// ===========================================================================
// ComplexityScorer
// ===========================================================================

#[test]
fn scorer_is_deterministic_and_bounded() {
    let scorer = ComplexityScorer::default();
    for case in [
        CaseSignals::new(Urgency::Routine, ["cough"]),
        busy_case(),
        CaseSignals::new(Urgency::Urgent, ["rash", "itching"]),
    ] {
        let a = scorer.score(&case);
        let b = scorer.score(&case);
        assert_eq!(a, b);
        for v in [
            a.overall,
            a.normalized,
            a.breakdown.symptom,
            a.breakdown.clinical_data,
            a.breakdown.patient,
            a.breakdown.diagnostic,
            a.breakdown.urgency,
        ] {
            assert!((0.0..=1.0).contains(&v), "score {v} out of range");
        }
        assert!(a.recommended_workers >= 1);
    }
}

#[test]
fn scorer_worker_count_monotonic() {
    let scorer = ComplexityScorer::default();
    let mut last = 0;
    for i in 0..=100 {
        let n = scorer.recommended_workers(i as f64 / 100.0);
        assert!(n >= last, "worker count decreased at {i}");
        last = n;
    }
}

#[test]
fn scorer_urgency_raises_normalized_score() {
    let scorer = ComplexityScorer::default();
    let mut case = busy_case();
    case.urgency = Urgency::Routine;
    let routine = scorer.score(&case);
    case.urgency = Urgency::Emergent;
    let emergent = scorer.score(&case);
    assert_eq!(routine.overall, emergent.overall);
    assert!(emergent.normalized >= routine.normalized);
    assert!(emergent.recommended_workers >= routine.recommended_workers);
}

#[test]
fn scorer_estimated_processing_time() {
    let scorer = ComplexityScorer::default();
    let score = scorer.score(&CaseSignals::new(Urgency::Routine, ["cough"]));
    assert_eq!(
        score.estimated_processing_ms,
        30_000 + 15_000 * score.recommended_workers as u64
    );
}

// ===========================================================================
// SelectionPolicy
// ===========================================================================

#[test]
fn selection_emergent_chest_pain_scenario() {
    let policy = policy(SelectionConfig::default());
    let case = CaseSignals::new(Urgency::Emergent, ["chest pain", "shortness of breath"]);
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert_eq!(
        ids(&selected),
        vec![
            "primary-care-coordinator",
            "diagnostic-reasoning-agent",
            "emergency-medicine-specialist",
            "cardiology-specialist",
            "pulmonology-specialist",
        ]
    );
}

#[test]
fn selection_routine_case_skips_emergency() {
    let policy = policy(SelectionConfig::default());
    let case = CaseSignals::new(Urgency::Routine, ["rash"]);
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert!(!ids(&selected).contains(&"emergency-medicine-specialist"));
    assert!(ids(&selected).contains(&"dermatology-specialist"));
}

#[test]
fn selection_keywords_case_insensitive() {
    let policy = policy(SelectionConfig::default());
    let case = CaseSignals::new(Urgency::Routine, ["CHEST PAIN"]);
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert!(ids(&selected).contains(&"cardiology-specialist"));
}

#[test]
fn selection_is_idempotent_and_unique() {
    let policy = policy(SelectionConfig {
        max_agents: 20,
        ..Default::default()
    });
    let case = busy_case();
    let score = ComplexityScorer::default().score(&case);
    let request = SelectionRequest::new(&case, &score);
    let first = policy.select_agents(&request);
    let second = policy.select_agents(&request);
    assert_eq!(first, second);

    let unique: HashSet<&str> = first.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(unique.len(), first.len());
}

#[test]
fn selection_truncation_keeps_always_active() {
    let policy = policy(SelectionConfig {
        max_agents: 3,
        ..Default::default()
    });
    let case = busy_case();
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert_eq!(
        ids(&selected),
        vec![
            "primary-care-coordinator",
            "diagnostic-reasoning-agent",
            "emergency-medicine-specialist",
        ]
    );
}

#[test]
fn selection_data_and_escalation_tiers() {
    let policy = policy(SelectionConfig {
        max_agents: 20,
        ..Default::default()
    });
    let case = busy_case();
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    let selected = ids(&selected);

    let pos = |id: &str| selected.iter().position(|s| *s == id).unwrap();
    assert!(pos("radiology-specialist") < pos("laboratory-medicine-specialist"));
    assert!(pos("laboratory-medicine-specialist") < pos("clinical-pharmacologist"));
    assert!(pos("clinical-pharmacologist") < pos("rare-disease-specialist"));
    assert!(pos("cardiology-specialist") < pos("radiology-specialist"));
}

#[test]
fn selection_hints_fill_only_to_recommended_count() {
    let policy = policy(SelectionConfig::default());
    let mut case = CaseSignals::new(Urgency::Routine, ["cough"]);
    case.specialty_hints = vec!["dermatology".into(), "no-such-specialty".into()];
    let score = ComplexityScorer::default().score(&case);

    // Two always-active plus pulmonology already meet the recommendation.
    assert!(score.recommended_workers <= 3);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert!(!ids(&selected).contains(&"dermatology-specialist"));

    let big = ComplexityScore {
        recommended_workers: 7,
        ..score.clone()
    };
    let selected = policy.select_agents(&SelectionRequest::new(&case, &big));
    assert_eq!(ids(&selected).last(), Some(&"dermatology-specialist"));
}

#[test]
fn decide_agrees_with_bulk_selection() {
    let policy = policy(SelectionConfig {
        max_agents: 20,
        ..Default::default()
    });
    for case in [busy_case(), CaseSignals::new(Urgency::Routine, ["cough"])] {
        let score = ComplexityScorer::default().score(&case);
        let request = SelectionRequest::new(&case, &score);
        let selected: HashSet<String> = policy
            .select_agents(&request)
            .into_iter()
            .map(|a| a.id)
            .collect();
        for decision in policy.decide_all(&request) {
            assert_eq!(
                decision.should_spawn,
                selected.contains(&decision.agent_id),
                "disagreement for {}: {}",
                decision.agent_id,
                decision.reason
            );
        }
    }
}

#[test]
fn decide_priority_and_reason() {
    let policy = policy(SelectionConfig::default());
    let case = CaseSignals::new(Urgency::Emergent, ["chest pain"]);
    let score = ComplexityScorer::default().score(&case);
    let request = SelectionRequest::new(&case, &score);
    let catalog = AgentCatalog::builtin();

    let em = policy.decide(catalog.find_by_id("emergency-medicine-specialist").unwrap(), &request);
    assert!(em.should_spawn);
    assert_eq!(em.priority, PriorityTier::Critical);
    assert_eq!(em.estimated_completion_ms, score.estimated_processing_ms);

    let derm = policy.decide(catalog.find_by_id("dermatology-specialist").unwrap(), &request);
    assert!(!derm.should_spawn);
    assert_eq!(derm.estimated_completion_ms, 0);
    assert!(!derm.reason.is_empty());
}

#[test]
fn polypharmacy_selects_pharmacologist() {
    let policy = policy(SelectionConfig::default());
    let mut case = CaseSignals::new(Urgency::Routine, ["fatigue"]);
    case.history.medications = (0..5).map(|i| format!("med-{i}")).collect();
    let score = ComplexityScorer::default().score(&case);
    let selected = policy.select_agents(&SelectionRequest::new(&case, &score));
    assert!(ids(&selected).contains(&"clinical-pharmacologist"));
}

// ===========================================================================
// InstructionBuilder
// ===========================================================================

#[test]
fn instruction_roles() {
    let builder = InstructionBuilder::default();
    let catalog = AgentCatalog::builtin();
    let case = CaseSignals::new(Urgency::Urgent, ["chest pain"]);

    let role = |id: &str| builder.build_instruction(catalog.find_by_id(id).unwrap(), &case).role;
    assert_eq!(role("primary-care-coordinator"), WorkerRole::PrimaryCoordinator);
    assert_eq!(role("emergency-medicine-specialist"), WorkerRole::EmergencySpecialist);
    assert_eq!(role("cardiology-specialist"), WorkerRole::SpecialistConsultant);
    assert_eq!(role("complex-case-specialist"), WorkerRole::SpecialistConsultant);
}

#[test]
fn instruction_focus_areas_and_directives() {
    let builder = InstructionBuilder::default();
    let catalog = AgentCatalog::builtin();
    let mut case = CaseSignals::new(Urgency::Routine, ["Chest Pain", "palpitations", "rash"]);
    case.imaging = vec![ImagingStudy {
        modality: "chest x-ray".into(),
        finding: Some("cardiomegaly".into()),
    }];
    case.history.medications = vec!["warfarin".into(), "amiodarone".into()];

    let cardio = builder.build_instruction(catalog.find_by_id("cardiology-specialist").unwrap(), &case);
    assert_eq!(cardio.focus_areas[0], "Chest Pain");
    assert_eq!(cardio.focus_areas[1], "palpitations");
    assert!(cardio.focus_areas.contains(&"risk stratification".to_string()));
    assert!(!cardio.focus_areas.contains(&"rash".to_string()));
    assert!(cardio.task.contains("Review imaging: chest x-ray (cardiomegaly)"));
    assert!(!cardio.task.contains("Review medication list"));
    assert!(!cardio.task.contains("URGENT"));
    assert_eq!(cardio.confidence_weight, 0.85);

    let pharm = builder.build_instruction(catalog.find_by_id("clinical-pharmacologist").unwrap(), &case);
    assert!(pharm.task.contains("warfarin, amiodarone"));
}

#[test]
fn instruction_urgency_clause_and_output_shape() {
    let builder = InstructionBuilder::default();
    let catalog = AgentCatalog::builtin();
    let case = CaseSignals::new(Urgency::Emergent, ["syncope"]);
    let inst = builder.build_instruction(catalog.find_by_id("cardiology-specialist").unwrap(), &case);
    assert!(inst.task.contains("URGENT: this case is emergent"));
    assert!(inst.task.contains("\"primary_diagnosis\""));
    assert_eq!(inst.expected_output.format, "json");
    assert_eq!(inst.expected_output.required_fields.len(), REQUIRED_OUTPUT_FIELDS.len());
    assert_eq!(inst.expected_output.specialty_notes_field, "specialty_notes");
}

#[test]
fn instruction_notes_missing_required_data() {
    let builder = InstructionBuilder::default();
    let catalog = AgentCatalog::builtin();
    let case = CaseSignals::new(Urgency::Routine, ["fever"]);
    let inst = builder.build_instruction(
        catalog.find_by_id("infectious-disease-specialist").unwrap(),
        &case,
    );
    assert!(inst.task.contains("Expected labs data was not supplied"));
}

#[test]
fn instruction_timeout_is_capped() {
    let builder = InstructionBuilder::default();
    assert_eq!(builder.compute_timeout(2).as_millis(), 180_000);
    assert_eq!(builder.compute_timeout(20).as_millis(), 600_000);

    let bad = InstructionConfig {
        base_timeout_ms: 10_000,
        max_timeout_ms: 5_000,
        ..Default::default()
    };
    assert!(bad.validate().is_err());
}
