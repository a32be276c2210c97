//! Tests for consilium-executor: ScriptedExecutor lifecycle and error reporting

use consilium_core::*;
use consilium_executor::*;

fn instruction(agent_id: &str) -> WorkerInstruction {
    WorkerInstruction {
        agent_id: agent_id.into(),
        role: WorkerRole::SpecialistConsultant,
        task: format!("analyze as {agent_id}"),
        focus_areas: vec![],
        expected_output: ExpectedOutput {
            format: "json".into(),
            required_fields: vec![],
            specialty_notes_field: "specialty_notes".into(),
        },
        confidence_weight: 0.8,
    }
}

fn submission(agents: &[&str]) -> Submission {
    Submission {
        task_description: "test consultation".into(),
        max_workers: agents.len(),
        timeout_ms: 60_000,
        context: SubmissionContext {
            task_id: TaskId::new("consult-test"),
            kind: TaskKind::Consultation,
            instructions: agents.iter().map(|a| instruction(a)).collect(),
            case: CaseSignals::new(Urgency::Routine, ["cough"]),
        },
    }
}

// ===========================================================================
// Submission
// ===========================================================================

#[tokio::test]
async fn submit_returns_distinct_ids() {
    let exec = ScriptedExecutor::new();
    let a = exec.submit(submission(&["a"])).await.unwrap();
    let b = exec.submit(submission(&["a"])).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(exec.submit_count().await, 2);
}

#[tokio::test]
async fn submit_rejected() {
    let exec = ScriptedExecutor::new().rejecting("invalid task shape");
    let err = exec.submit(submission(&["a"])).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Rejected(ref m) if m == "invalid task shape"));
}

#[tokio::test]
async fn submit_without_workers_rejected() {
    let exec = ScriptedExecutor::new();
    assert!(matches!(
        exec.submit(submission(&[])).await,
        Err(ExecutorError::Rejected(_))
    ));
}

// ===========================================================================
// Status progression
// ===========================================================================

#[tokio::test]
async fn status_progresses_through_ticks() {
    let exec = ScriptedExecutor::new()
        .with_script("a", WorkerScript::succeed(2, &WorkerResult::diagnosis("X", 0.9)))
        .with_script("b", WorkerScript::fail(1, "model overloaded"));
    let id = exec.submit(submission(&["a", "b"])).await.unwrap();

    let s1 = exec.status(&id).await.unwrap();
    assert_eq!(s1.state, ExecutorState::Running);
    assert_eq!(s1.workers[0].status, WorkerStatus::Analyzing);
    assert_eq!(s1.workers[0].progress, 0.5);
    assert_eq!(s1.workers[1].status, WorkerStatus::Failed);
    assert_eq!(s1.workers[1].error.as_deref(), Some("model overloaded"));
    assert!(s1.any_started());
    assert!(!s1.all_terminal());

    let s2 = exec.status(&id).await.unwrap();
    assert_eq!(s2.state, ExecutorState::Finished);
    assert!(s2.all_terminal());
    let output = s2.workers[0].output.as_ref().unwrap();
    let parsed = parse_worker_output(output).unwrap();
    assert_eq!(parsed.primary_diagnosis.condition, "X");
    assert_eq!(exec.status_count().await, 2);
}

#[tokio::test]
async fn unscripted_agents_hang() {
    let exec = ScriptedExecutor::new();
    let id = exec.submit(submission(&["a"])).await.unwrap();
    for _ in 0..5 {
        let s = exec.status(&id).await.unwrap();
        assert_eq!(s.state, ExecutorState::Running);
        assert_eq!(s.workers[0].status, WorkerStatus::Active);
    }
}

#[tokio::test]
async fn status_unknown_task() {
    let exec = ScriptedExecutor::new();
    let err = exec
        .status(&ExecutorTaskId("exec-missing".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::TaskUnknown(_)));
}

#[tokio::test]
async fn fatal_after_reports_failed_state() {
    let exec = ScriptedExecutor::new().fatal_after(2);
    let id = exec.submit(submission(&["a"])).await.unwrap();
    assert_eq!(exec.status(&id).await.unwrap().state, ExecutorState::Running);
    let s = exec.status(&id).await.unwrap();
    assert_eq!(s.state, ExecutorState::Failed);
    assert!(s.error.is_some());
}

#[test]
fn script_file_deserializes() {
    let json = r#"{
        "default": {"outcome": "fail", "ticks": 1, "error": "unavailable"},
        "agents": {
            "cardiology-specialist": {
                "outcome": "succeed",
                "ticks": 2,
                "output": {"primary_diagnosis": {"condition": "ACS", "confidence": 0.8}}
            },
            "radiology-specialist": {"outcome": "hang"}
        }
    }"#;
    let file: ScriptFile = serde_json::from_str(json).unwrap();
    assert_eq!(file.agents.len(), 2);
    assert!(matches!(file.default, Some(WorkerScript::Fail { ticks: 1, .. })));
}

#[test]
fn executor_error_converts_to_core_error() {
    let err: Error = ExecutorError::Transport("connection reset".into()).into();
    assert!(matches!(err, Error::Executor(ref m) if m.contains("connection reset")));
}
