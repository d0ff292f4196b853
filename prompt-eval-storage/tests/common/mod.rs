#![allow(dead_code)]

use prompt_eval_core::domain::{
    AggregationType, CustomMetric, CustomMetricId, Evaluation, EvaluationOptions,
    EvaluationMetrics, MetricThresholds, MetricType, OptimizationSuggestion, ProjectId,
    SuggestionPriority, SuggestionType, TestCase, TestCaseCategory, ThresholdOperator,
};

/// A pending evaluation for the given project.
pub fn create_test_evaluation(project: i64) -> Evaluation {
    Evaluation::new(
        ProjectId(project),
        "Classify the sentiment of the review as positive or negative.",
        EvaluationOptions {
            name: format!("evaluation for project {}", project),
            ..Default::default()
        },
    )
}

pub fn create_test_cases(count: usize) -> Vec<TestCase> {
    (0..count)
        .map(|i| TestCase::new(format!("case {}", i), TestCaseCategory::Normal))
        .collect()
}

pub fn create_test_metrics(overall_score: f64) -> EvaluationMetrics {
    let mut metrics = EvaluationMetrics::new(None);
    metrics.overall_score = overall_score;
    metrics.pass_rate = overall_score;
    metrics
}

pub fn create_test_suggestion() -> OptimizationSuggestion {
    OptimizationSuggestion::new(
        SuggestionType::Examples,
        "Add examples",
        "Few-shot examples usually raise accuracy",
        "prompt",
        SuggestionPriority::Medium,
    )
}

pub fn create_test_metric(project: i64, name: &str) -> CustomMetric {
    CustomMetric::new(
        CustomMetricId(0),
        ProjectId(project),
        name,
        MetricType::Numeric,
        AggregationType::Average,
        MetricThresholds::new(ThresholdOperator::GreaterOrEqual, 0.5),
    )
}
