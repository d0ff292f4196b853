use async_trait::async_trait;
use prompt_eval_core::{
    extract_field, extract_label, normalize_label, CoreError, EvaluationMetrics, MetricCalculator,
    PromptAnalysis, Result, TaskType, TestCase, TEXT_FIELDS,
};
use serde::{Deserialize, Serialize};

use crate::calculators::{
    basic_custom_metrics, task_specific_metrics, weighted_score, ClassificationCalculator,
    GenerationCalculator,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsInput {
    pub test_cases: Vec<TestCase>,
    pub analysis: PromptAnalysis,
}

/// Scores a finished set of test cases for one evaluation.
///
/// Pass rate and weighted overall score are computed for every task type;
/// classification prompts additionally get label metrics, generation and
/// summarization prompts text-similarity metrics, and the remaining task
/// types status-based approximations in `custom_metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationMetricsCalculator {
    classification: ClassificationCalculator,
    generation: GenerationCalculator,
}

impl EvaluationMetricsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calculate_metrics(
        &self,
        test_cases: &[TestCase],
        analysis: &PromptAnalysis,
    ) -> Result<EvaluationMetrics> {
        if test_cases.is_empty() {
            return Err(CoreError::Validation(
                "no test cases provided for metrics calculation".to_string(),
            ));
        }

        let mut metrics = EvaluationMetrics::new(test_cases[0].evaluation_id);

        let passed = test_cases.iter().filter(|tc| tc.is_passed()).count();
        metrics.test_cases_total = test_cases.len();
        metrics.test_cases_passed = passed;
        metrics.pass_rate = passed as f64 / test_cases.len() as f64;
        metrics.overall_score = weighted_score(test_cases);

        match analysis.task_type {
            TaskType::Classification => {
                metrics.classification_metrics =
                    Some(self.classification_from_test_cases(test_cases, analysis)?);
            }
            task_type if task_type.is_generative() => {
                metrics.generation_metrics = Some(self.generation_from_test_cases(test_cases)?);
            }
            task_type => {
                metrics
                    .custom_metrics
                    .extend(task_specific_metrics(test_cases, task_type));
            }
        }

        metrics.custom_metrics.extend(basic_custom_metrics(test_cases));

        tracing::debug!(
            "Calculated metrics: {} of {} passed, overall score {:.3}",
            metrics.test_cases_passed,
            metrics.test_cases_total,
            metrics.overall_score
        );

        Ok(metrics)
    }

    /// Pairs normalized predicted and expected labels; cases without both are
    /// skipped.
    fn classification_from_test_cases(
        &self,
        test_cases: &[TestCase],
        analysis: &PromptAnalysis,
    ) -> Result<prompt_eval_core::ClassificationMetrics> {
        let (predictions, ground_truth): (Vec<String>, Vec<String>) = test_cases
            .iter()
            .filter_map(|tc| {
                let actual = extract_label(tc.actual_output.as_ref()?)?;
                Some((actual, extract_label(&tc.expected_output)?))
            })
            .unzip();

        if predictions.is_empty() {
            return Err(CoreError::Validation(
                "no valid classification pairs found in test cases".to_string(),
            ));
        }

        let classes: Vec<String> = analysis.classes().iter().map(|c| normalize_label(c)).collect();
        self.classification.compute(&predictions, &ground_truth, &classes)
    }

    fn generation_from_test_cases(
        &self,
        test_cases: &[TestCase],
    ) -> Result<prompt_eval_core::GenerationMetrics> {
        let (predictions, references) = paired_fields(test_cases, &TEXT_FIELDS);

        if predictions.is_empty() {
            return Err(CoreError::Validation(
                "no valid generation pairs found in test cases".to_string(),
            ));
        }

        self.generation.compute(&predictions, &references)
    }
}

fn paired_fields(test_cases: &[TestCase], fields: &[&str]) -> (Vec<String>, Vec<String>) {
    test_cases
        .iter()
        .filter_map(|tc| {
            let actual = extract_field(tc.actual_output.as_ref()?, fields)?;
            let expected = extract_field(&tc.expected_output, fields)?;
            (!actual.is_empty() && !expected.is_empty()).then_some((actual, expected))
        })
        .unzip()
}

#[async_trait]
impl MetricCalculator for EvaluationMetricsCalculator {
    type Input = MetricsInput;
    type Output = EvaluationMetrics;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        self.calculate_metrics(&input.test_cases, &input.analysis)
    }
}
