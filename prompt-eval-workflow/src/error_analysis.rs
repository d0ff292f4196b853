use async_trait::async_trait;
use prompt_eval_core::{
    ErrorAnalysis, ErrorAnalyzer, PromptAnalysis, Result, TestCase, TestCaseCategory,
    TestCaseStatus,
};

const ADVERSARIAL_FAILURE: &str = "adversarial_failure";
const EDGE_CASE_FAILURE: &str = "edge_case_failure";
const FORMAT_ERROR: &str = "format_error";

/// Builds an error analysis from test-case statuses alone.
///
/// Failed adversarial cases count as logic errors, failed edge cases as edge
/// failures and cases in `error` as format errors. Ratios are taken over all
/// cases. A case is inconsistent when its status and score disagree: passed
/// below 0.5, or failed at 0.5 and above.
pub fn heuristic_error_analysis(test_cases: &[TestCase]) -> ErrorAnalysis {
    let mut analysis = ErrorAnalysis::empty();
    analysis.heuristic = true;

    let total = test_cases.len();
    let mut failed = 0;
    let mut format_errors = 0;
    let mut logic_errors = 0;
    let mut inconsistent = 0;

    for test_case in test_cases {
        let (pattern, message) = match test_case.status {
            TestCaseStatus::Failed => {
                failed += 1;
                match test_case.category {
                    TestCaseCategory::Adversarial => {
                        logic_errors += 1;
                        (Some(ADVERSARIAL_FAILURE), "Failed on adversarial input")
                    }
                    TestCaseCategory::EdgeCase => (Some(EDGE_CASE_FAILURE), "Failed on edge case"),
                    TestCaseCategory::Normal => (None, ""),
                }
            }
            TestCaseStatus::Error => {
                format_errors += 1;
                (Some(FORMAT_ERROR), "Format or execution error")
            }
            _ => (None, ""),
        };

        if let Some(pattern) = pattern {
            *analysis.error_patterns.entry(pattern.to_string()).or_insert(0) += 1;
            if !analysis.common_errors.iter().any(|e| e == message) {
                analysis.common_errors.push(message.to_string());
            }
        }

        if is_inconsistent(test_case) {
            inconsistent += 1;
        }
    }

    analysis.ambiguous_cases = ratio(failed, total);
    analysis.format_errors = ratio(format_errors, total);
    analysis.logic_errors = ratio(logic_errors, total);
    analysis.inconsistent_cases = ratio(inconsistent, total);

    analysis
        .error_categories
        .insert("classification_errors".to_string(), analysis.logic_errors);
    analysis
        .error_categories
        .insert("format_errors".to_string(), analysis.format_errors);
    analysis
        .error_categories
        .insert("edge_case_errors".to_string(), analysis.ambiguous_cases);

    analysis
}

fn is_inconsistent(test_case: &TestCase) -> bool {
    match test_case.status {
        TestCaseStatus::Passed => test_case.score < 0.5,
        TestCaseStatus::Failed => test_case.score >= 0.5,
        _ => false,
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// [`ErrorAnalyzer`] backed by [`heuristic_error_analysis`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicErrorAnalyzer;

#[async_trait]
impl ErrorAnalyzer for HeuristicErrorAnalyzer {
    async fn analyze_errors(
        &self,
        test_cases: &[TestCase],
        _analysis: &PromptAnalysis,
    ) -> Result<ErrorAnalysis> {
        Ok(heuristic_error_analysis(test_cases))
    }
}
