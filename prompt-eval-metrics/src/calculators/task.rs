//! Figures derived from test-case statuses and scores alone, used for task
//! types without a dedicated text or label comparison.

use prompt_eval_core::{TaskType, TestCase, TestCaseCategory, TestCaseStatus};
use std::collections::BTreeMap;

/// Fraction of cases in `category` that passed; 0 when there are none.
pub fn category_pass_rate(test_cases: &[TestCase], category: TestCaseCategory) -> f64 {
    let (total, passed) = test_cases
        .iter()
        .filter(|tc| tc.category == category)
        .fold((0usize, 0usize), |(total, passed), tc| {
            (total + 1, passed + usize::from(tc.is_passed()))
        });

    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}

/// Σ(score·weight)/Σweight, 0 when the weights sum to 0.
pub fn weighted_score(test_cases: &[TestCase]) -> f64 {
    let (score_sum, weight_sum) = test_cases
        .iter()
        .fold((0.0, 0.0), |(s, w), tc| (s + tc.score * tc.weight, w + tc.weight));

    if weight_sum > 0.0 {
        score_sum / weight_sum
    } else {
        0.0
    }
}

/// Share of cases that failed or errored.
pub fn error_rate(test_cases: &[TestCase]) -> f64 {
    if test_cases.is_empty() {
        return 0.0;
    }

    let errors = test_cases
        .iter()
        .filter(|tc| matches!(tc.status, TestCaseStatus::Failed | TestCaseStatus::Error))
        .count();

    errors as f64 / test_cases.len() as f64
}

/// Mean of the recorded execution durations.
pub fn average_execution_time_ms(test_cases: &[TestCase]) -> f64 {
    let durations: Vec<u64> = test_cases.iter().filter_map(|tc| tc.duration_ms).collect();
    if durations.is_empty() {
        return 0.0;
    }

    durations.iter().sum::<u64>() as f64 / durations.len() as f64
}

fn mean_score<'a>(test_cases: impl Iterator<Item = &'a TestCase>) -> f64 {
    let (sum, count) = test_cases.fold((0.0, 0usize), |(s, c), tc| (s + tc.score, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// Approximations for extraction, question answering and transformation
/// prompts. Other task types produce no entries.
pub fn task_specific_metrics(test_cases: &[TestCase], task_type: TaskType) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();

    match task_type {
        TaskType::Extraction => {
            let precision = category_pass_rate(test_cases, TestCaseCategory::Normal);
            let recall = category_pass_rate(test_cases, TestCaseCategory::EdgeCase);
            metrics.insert("extraction_precision".to_string(), precision);
            metrics.insert("extraction_recall".to_string(), recall);
            metrics.insert("extraction_f1".to_string(), harmonic_mean(precision, recall));
        }
        TaskType::QuestionAnswering => {
            metrics.insert(
                "answer_accuracy".to_string(),
                category_pass_rate(test_cases, TestCaseCategory::Normal),
            );
            metrics.insert(
                "answer_completeness".to_string(),
                mean_score(test_cases.iter().filter(|tc| tc.is_passed())),
            );
        }
        TaskType::Transformation => {
            let compliant = test_cases
                .iter()
                .filter(|tc| {
                    tc.status != TestCaseStatus::Error
                        && tc.actual_output.as_ref().is_some_and(|o| !o.is_empty())
                })
                .count();
            let compliance = if test_cases.is_empty() {
                0.0
            } else {
                compliant as f64 / test_cases.len() as f64
            };
            metrics.insert("format_compliance".to_string(), compliance);
            metrics.insert("content_preservation".to_string(), mean_score(test_cases.iter()));
        }
        _ => {}
    }

    metrics
}

/// Figures recorded for every evaluation regardless of task type.
pub fn basic_custom_metrics(test_cases: &[TestCase]) -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("avg_execution_time_ms".to_string(), average_execution_time_ms(test_cases)),
        ("error_rate".to_string(), error_rate(test_cases)),
        (
            "edge_case_performance".to_string(),
            category_pass_rate(test_cases, TestCaseCategory::EdgeCase),
        ),
        (
            "adversarial_performance".to_string(),
            category_pass_rate(test_cases, TestCaseCategory::Adversarial),
        ),
        ("weighted_score".to_string(), weighted_score(test_cases)),
    ])
}
