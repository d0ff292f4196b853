use prompt_eval_core::domain::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

// ===== Enum Serialization Tests =====

#[rstest]
#[case(EvaluationStatus::Pending, "pending")]
#[case(EvaluationStatus::Running, "running")]
#[case(EvaluationStatus::Completed, "completed")]
#[case(EvaluationStatus::Failed, "failed")]
fn test_evaluation_status_serialization(#[case] status: EvaluationStatus, #[case] expected: &str) {
    let json = serde_json::to_string(&status).unwrap();
    assert_eq!(json, format!("\"{}\"", expected));

    let deserialized: EvaluationStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, status);
    assert_eq!(expected.parse::<EvaluationStatus>().unwrap(), status);
}

#[rstest]
#[case(TestCaseCategory::Normal, "normal")]
#[case(TestCaseCategory::EdgeCase, "edge_case")]
#[case(TestCaseCategory::Adversarial, "adversarial")]
fn test_category_serialization(#[case] category: TestCaseCategory, #[case] expected: &str) {
    assert_eq!(serde_json::to_value(category).unwrap(), json!(expected));
    assert_eq!(category.as_str(), expected);
}

#[rstest]
#[case(AggregationType::Average, "average")]
#[case(AggregationType::Median, "median")]
#[case(AggregationType::P95, "p95")]
#[case(AggregationType::P99, "p99")]
#[case(AggregationType::Count, "count")]
fn test_aggregation_serialization(#[case] aggregation: AggregationType, #[case] expected: &str) {
    assert_eq!(serde_json::to_value(aggregation).unwrap(), json!(expected));
}

#[test]
fn test_invalid_status_rejected_at_boundary() {
    let parsed: Result<EvaluationStatus, _> = serde_json::from_str("\"done\"");
    assert!(parsed.is_err());
    assert!("done".parse::<EvaluationStatus>().is_err());
}

#[test]
fn test_invalid_category_rejected_at_boundary() {
    let parsed: Result<TestCaseCategory, _> = serde_json::from_str("\"edge\"");
    assert!(parsed.is_err());
}

// ===== Document Round Trips =====

#[test]
fn test_evaluation_document_roundtrip() {
    let mut evaluation = Evaluation::new(
        ProjectId(9),
        "Summarize the article in two sentences.",
        EvaluationOptions {
            name: "summaries".to_string(),
            ..Default::default()
        },
    );
    evaluation.start().unwrap();
    evaluation.advance_progress(40.0);
    evaluation.test_cases.push(
        TestCase::new("short article", TestCaseCategory::Normal)
            .with_expected(json!({"summary": "a b"}).as_object().cloned().unwrap()),
    );

    let json = serde_json::to_string(&evaluation).unwrap();
    let deserialized: Evaluation = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized, evaluation);
}

#[test]
fn test_empty_collections_are_omitted() {
    let evaluation = Evaluation::new(ProjectId(1), "p", EvaluationOptions::default());
    let value = serde_json::to_value(&evaluation).unwrap();

    assert!(value.get("test_cases").is_none());
    assert!(value.get("metrics").is_none());
    assert!(value.get("suggestions").is_none());
    assert_eq!(value["status"], json!("pending"));
}

#[test]
fn test_metrics_document_shape() {
    let mut metrics = EvaluationMetrics::new(None);
    metrics.generation_metrics = Some(GenerationMetrics {
        rouge_1: 0.5,
        ..Default::default()
    });
    metrics.custom_metrics.insert("error_rate".to_string(), 0.25);

    let value = serde_json::to_value(&metrics).unwrap();
    assert!(value.get("classification_metrics").is_none());
    assert_eq!(value["generation_metrics"]["rouge_1"], json!(0.5));
    assert_eq!(value["custom_metrics"]["error_rate"], json!(0.25));
}

#[test]
fn test_suggestion_type_field_name() {
    let suggestion = OptimizationSuggestion::new(
        SuggestionType::Clarity,
        "Clarify the instructions",
        "State the expected output format explicitly",
        "old",
        SuggestionPriority::High,
    );
    let value = serde_json::to_value(&suggestion).unwrap();
    assert_eq!(value["type"], json!("clarity"));
    assert_eq!(value["priority"], json!("high"));
    assert_eq!(value["status"], json!("pending"));
}
