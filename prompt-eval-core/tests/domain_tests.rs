use prompt_eval_core::domain::*;
use prompt_eval_core::CoreError;
use proptest::prelude::*;
use serde_json::json;
use ::test_case::test_case;

fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().unwrap()
}

// ===== Evaluation State Machine =====

#[test]
fn test_completed_evaluation_cannot_restart() {
    let mut evaluation = Evaluation::new(ProjectId(1), "prompt", EvaluationOptions::default());
    evaluation.start().unwrap();
    evaluation.complete().unwrap();

    let err = evaluation.start().unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    assert_eq!(evaluation.status, EvaluationStatus::Completed);
}

#[test]
fn test_pending_evaluation_cannot_complete() {
    let mut evaluation = Evaluation::new(ProjectId(1), "prompt", EvaluationOptions::default());
    assert!(evaluation.complete().is_err());
    assert_eq!(evaluation.status, EvaluationStatus::Pending);
}

#[test]
fn test_terminal_states() {
    assert!(EvaluationStatus::Completed.is_terminal());
    assert!(EvaluationStatus::Failed.is_terminal());
    assert!(!EvaluationStatus::Running.is_terminal());
    assert!(!EvaluationStatus::Pending.is_terminal());
}

// ===== Test Case Behaviour =====

#[test_case(TestCaseStatus::Passed, true ; "passed")]
#[test_case(TestCaseStatus::Failed, false ; "failed")]
#[test_case(TestCaseStatus::Error, false ; "error")]
#[test_case(TestCaseStatus::Pending, false ; "pending")]
fn test_is_passed(status: TestCaseStatus, expected: bool) {
    let mut case = TestCase::new("case", TestCaseCategory::Normal);
    case.status = status;
    assert_eq!(case.is_passed(), expected);
}

#[test]
fn test_record_result_marks_mode_and_time() {
    let mut case = TestCase::new("case", TestCaseCategory::EdgeCase);
    case.record_result(
        object(json!({"class": "positive"})),
        TestCaseStatus::Passed,
        1.4,
        ExecutionMode::Simulated,
    );

    assert!(case.is_simulated());
    assert_eq!(case.score, 1.0);
    assert!(case.executed_at.is_some());
    assert_eq!(
        extract_field(case.actual_output.as_ref().unwrap(), &CLASS_FIELDS),
        Some("positive".to_string())
    );
}

#[test]
fn test_sentiment_field_is_checked_against_classes() {
    let analysis = PromptAnalysis::new("Rate sentiment", TaskType::Classification)
        .with_classes(vec!["positive".into(), "negative".into()]);

    let valid = TestCase::new("ok", TestCaseCategory::Normal)
        .with_expected(object(json!({"sentiment": "negative"})));
    let invalid = TestCase::new("bad", TestCaseCategory::Normal)
        .with_expected(object(json!({"sentiment": "mixed"})));

    assert!(valid.validate(&analysis).is_ok());
    assert!(invalid.validate(&analysis).is_err());
}

#[test]
fn test_generator_option_defaults() {
    let options = GeneratorOptions::default();
    assert_eq!(options.normal_count, 15);
    assert_eq!(options.edge_count, 8);
    assert_eq!(options.adversarial_count, 5);
    assert_eq!(options.total(), 28);
}

proptest! {
    #[test]
    fn test_score_always_within_unit_interval(score in proptest::num::f64::ANY) {
        let mut case = TestCase::new("p", TestCaseCategory::Normal);
        case.set_score(score);
        prop_assert!((0.0..=1.0).contains(&case.score));
    }

    #[test]
    fn test_progress_is_monotonic(steps in proptest::collection::vec(0.0f64..150.0, 1..20)) {
        let mut evaluation = Evaluation::new(ProjectId(1), "p", EvaluationOptions::default());
        let mut last = evaluation.progress;
        for step in steps {
            evaluation.advance_progress(step);
            prop_assert!(evaluation.progress >= last);
            prop_assert!(evaluation.progress <= 100.0);
            last = evaluation.progress;
        }
    }
}
