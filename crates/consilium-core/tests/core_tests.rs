//! Tests for consilium-core: case signals, lifecycle states and wire formats

use consilium_core::*;

// ===========================================================================
// CaseSignals
// ===========================================================================

#[test]
fn case_requires_a_symptom() {
    let empty = CaseSignals::new(Urgency::Routine, Vec::<Symptom>::new());
    assert!(matches!(empty.validate(), Err(Error::Validation(_))));

    let blank = CaseSignals::new(Urgency::Routine, ["  "]);
    assert!(matches!(blank.validate(), Err(Error::Validation(_))));

    assert!(CaseSignals::new(Urgency::Routine, ["cough"]).validate().is_ok());
}

#[test]
fn case_rejects_out_of_range_values() {
    let mut case = CaseSignals::new(Urgency::Urgent, ["fever"]);
    case.rare_disease_suspicion = 1.5;
    assert!(case.validate().is_err());

    let mut case = CaseSignals::new(Urgency::Urgent, ["fever"]);
    case.rare_disease_suspicion = f64::NAN;
    assert!(case.validate().is_err());

    let mut case = CaseSignals::new(Urgency::Urgent, ["fever"]);
    case.age = Some(200);
    assert!(case.validate().is_err());

    let mut case = CaseSignals::new(Urgency::Urgent, ["fever"]);
    case.vitals = Some(VitalSigns {
        heart_rate: Some(900.0),
        ..Default::default()
    });
    let err = case.validate().unwrap_err();
    assert!(err.to_string().contains("heart_rate"));
}

#[test]
fn case_deserializes_from_minimal_json() {
    let case: CaseSignals = serde_json::from_str(
        r#"{
            "urgency": "emergent",
            "symptoms": ["chest pain", {"description": "dyspnea", "severity": "severe"}],
            "history": {"medications": ["aspirin"]}
        }"#,
    )
    .unwrap();

    assert_eq!(case.urgency, Urgency::Emergent);
    assert_eq!(case.symptoms.len(), 2);
    assert_eq!(case.symptoms[0].severity, Severity::Moderate);
    assert_eq!(case.symptoms[1].severity, Severity::Severe);
    assert!(case.has_medications());
    assert!(!case.has_labs());
    assert_eq!(case.rare_disease_suspicion, 0.0);
}

#[test]
fn case_derived_signals() {
    let mut case = CaseSignals::new(
        Urgency::Routine,
        [
            Symptom::new("palpitations").with_body_system("Cardiovascular"),
            Symptom::new("chest tightness").with_body_system("cardiovascular "),
            Symptom::new("wheeze").with_body_system("respiratory"),
        ],
    );
    case.labs = vec![
        LabResult { name: "bnp".into(), value: Some("900".into()), abnormal: true },
        LabResult { name: "sodium".into(), value: Some("139".into()), abnormal: false },
    ];
    case.history.medications = vec!["a".into(), "b".into(), "c".into()];

    assert_eq!(case.body_system_count(), 2);
    assert_eq!(case.abnormal_lab_fraction(), Some(0.5));
    assert!(case.requires_medication_review(3));
    assert!(!case.requires_medication_review(4));
    assert!(!case.requires_medication_review(0));
    case.medication_review_required = true;
    assert!(case.requires_medication_review(0));
}

#[test]
fn vitals_abnormal_fraction_ignores_unmeasured() {
    assert_eq!(VitalSigns::default().abnormal_fraction(), None);

    let vitals = VitalSigns {
        heart_rate: Some(130.0),
        oxygen_saturation: Some(98.0),
        ..Default::default()
    };
    assert_eq!(vitals.measured_count(), 2);
    assert_eq!(vitals.abnormal_fraction(), Some(0.5));
}

// ===========================================================================
// TaskStatus / TaskId
// ===========================================================================

#[test]
fn task_status_forward_only() {
    use TaskStatus::*;
    assert!(Pending.can_transition_to(SpawningAgents));
    assert!(SpawningAgents.can_transition_to(Analyzing));
    assert!(Analyzing.can_transition_to(BuildingConsensus));
    assert!(BuildingConsensus.can_transition_to(Completed));

    assert!(!Pending.can_transition_to(Analyzing));
    assert!(!Analyzing.can_transition_to(SpawningAgents));
    assert!(!SpawningAgents.can_transition_to(Completed));
}

#[test]
fn task_status_failed_from_any_live_state() {
    use TaskStatus::*;
    for status in [Pending, SpawningAgents, Analyzing, BuildingConsensus] {
        assert!(status.can_transition_to(Failed), "{status} -> failed");
        assert!(!status.is_terminal());
    }
    for status in [Completed, Failed] {
        assert!(status.is_terminal());
        for next in [Pending, SpawningAgents, Analyzing, BuildingConsensus, Completed, Failed] {
            assert!(!status.can_transition_to(next));
        }
    }
}

#[test]
fn task_status_wire_names() {
    assert_eq!(
        serde_json::to_string(&TaskStatus::BuildingConsensus).unwrap(),
        r#""building_consensus""#
    );
    assert_eq!(TaskStatus::SpawningAgents.to_string(), "spawning_agents");
    assert_eq!(TaskKind::EmergencyConsultation.to_string(), "emergency_consultation");
}

#[test]
fn task_id_serializes_as_string() {
    let id = TaskId::new("consult-42");
    assert_eq!(serde_json::to_string(&id).unwrap(), r#""consult-42""#);
    let back: TaskId = serde_json::from_str(r#""consult-42""#).unwrap();
    assert_eq!(back, id);
}

#[test]
fn task_id_generate_is_unique() {
    let a = TaskId::generate();
    let b = TaskId::generate();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("consult-"));
}

#[test]
fn worker_status_started() {
    assert!(!WorkerStatus::Spawning.has_started());
    assert!(WorkerStatus::Active.has_started());
    assert!(WorkerStatus::Failed.is_terminal());
    assert!(!WorkerStatus::Analyzing.is_terminal());
}

// ===========================================================================
// Results and errors
// ===========================================================================

#[test]
fn worker_result_fills_defaults() {
    let result: WorkerResult = serde_json::from_str(
        r#"{
            "primary_diagnosis": {"condition": "Asthma", "confidence": 0.7},
            "recommendations": [{"type": "treatment", "text": "Inhaled steroid"},
                                {"type": "acupuncture", "text": "n/a", "priority": "low"}]
        }"#,
    )
    .unwrap();

    assert_eq!(result.primary_diagnosis.condition, "Asthma");
    assert!(result.differentials.is_empty());
    assert_eq!(result.risk.level, RiskLevel::Moderate);
    assert_eq!(result.recommendations[0].kind, RecommendationKind::Treatment);
    assert_eq!(result.recommendations[0].priority, PriorityTier::Medium);
    assert_eq!(result.recommendations[1].kind, RecommendationKind::Other);
    assert_eq!(result.recommendations[1].priority, PriorityTier::Low);
}

#[test]
fn activation_rule_tagged_by_kind() {
    let rule: ActivationRule =
        serde_json::from_str(r#"{"kind": "keyword", "keywords": ["rash", "itch"]}"#).unwrap();
    assert_eq!(rule.kind(), ActivationKind::Keyword);
    assert_eq!(rule.keywords(), ["rash".to_string(), "itch".to_string()]);

    let always: ActivationRule = serde_json::from_str(r#"{"kind": "always"}"#).unwrap();
    assert!(always.keywords().is_empty());
    assert_eq!(always.kind().tier(), 1);
}

#[test]
fn error_caller_side_classification() {
    assert!(Error::TaskNotFound("x".into()).is_caller_side());
    assert!(Error::PollTimeout { task_id: "x".into(), attempts: 3 }.is_caller_side());
    assert!(!Error::submission("x", "queue full").is_caller_side());
    assert_eq!(
        Error::invalid_transition(TaskStatus::Completed, TaskStatus::Analyzing).to_string(),
        "invalid transition: completed -> analyzing"
    );
}
