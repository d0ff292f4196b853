use async_trait::async_trait;
use prompt_eval_core::{
    ErrorAnalysis, EvaluationMetrics, OptimizationSuggestion, PromptOptimizer, Result,
    SuggestionPriority, SuggestionType,
};

const EXAMPLE_MARKERS: [&str; 6] = ["example", "for instance", "such as", "e.g.", "input:", "output:"];

/// Rule thresholds for [`HeuristicOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerThresholds {
    pub clarity_overall: f64,
    pub accuracy_pass_rate: f64,
    pub consistency_inconsistent: f64,
    pub format_errors: f64,
    pub examples_overall: f64,
    pub weak_class_f1: f64,
    pub constraints_rouge_l: f64,
}

impl Default for OptimizerThresholds {
    fn default() -> Self {
        Self {
            clarity_overall: 0.8,
            accuracy_pass_rate: 0.7,
            consistency_inconsistent: 0.15,
            format_errors: 0.1,
            examples_overall: 0.85,
            weak_class_f1: 0.6,
            constraints_rouge_l: 0.5,
        }
    }
}

/// Rule-based [`PromptOptimizer`] that drafts suggestions from metrics and
/// error analysis without calling a model.
#[derive(Debug, Clone, Default)]
pub struct HeuristicOptimizer {
    thresholds: OptimizerThresholds,
}

impl HeuristicOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: OptimizerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn suggest(
        &self,
        prompt: &str,
        metrics: &EvaluationMetrics,
        error_analysis: &ErrorAnalysis,
    ) -> Vec<OptimizationSuggestion> {
        let t = &self.thresholds;
        let mut suggestions = Vec::new();

        if metrics.overall_score < t.clarity_overall {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::Clarity,
                    "Clarify the instructions",
                    "State the task, the expected output and the decision criteria explicitly",
                    prompt,
                    SuggestionPriority::High,
                )
                .with_new_prompt(format!(
                    "{}\n\nBe precise: follow the instructions exactly and answer only what is asked.",
                    prompt
                ))
                .with_impact(0.2, 0.7)
                .with_reasoning(format!(
                    "Overall score is {:.2}, below {:.2}",
                    metrics.overall_score, t.clarity_overall
                )),
            );
        }

        if metrics.pass_rate < t.accuracy_pass_rate {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::Accuracy,
                    "Improve answer accuracy",
                    "Ask the model to check its answer against the input before responding",
                    prompt,
                    SuggestionPriority::High,
                )
                .with_new_prompt(format!(
                    "{}\n\nBefore answering, verify that your answer is fully supported by the input.",
                    prompt
                ))
                .with_impact(0.15, 0.75)
                .with_reasoning(format!(
                    "{} of {} test cases passed ({:.0}%)",
                    metrics.test_cases_passed,
                    metrics.test_cases_total,
                    metrics.pass_rate * 100.0
                )),
            );
        }

        if error_analysis.inconsistent_cases > t.consistency_inconsistent {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::Consistency,
                    "Make responses consistent",
                    "Similar inputs produce diverging results; pin down the response rules",
                    prompt,
                    SuggestionPriority::Medium,
                )
                .with_new_prompt(format!(
                    "{}\n\nApply the same criteria to every input and respond in the same structure each time.",
                    prompt
                ))
                .with_impact(0.1, 0.65)
                .with_reasoning(format!(
                    "{:.0}% of cases have a status that disagrees with their score",
                    error_analysis.inconsistent_cases * 100.0
                )),
            );
        }

        if error_analysis.format_errors > t.format_errors {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::Format,
                    "Specify the output format",
                    "Describe the exact output structure the response must follow",
                    prompt,
                    SuggestionPriority::High,
                )
                .with_new_prompt(format!(
                    "{}\n\nRespond only with valid JSON matching the required fields. Do not add commentary.",
                    prompt
                ))
                .with_impact(0.15, 0.8)
                .with_reasoning(format!(
                    "{:.0}% of cases ended in a format or execution error",
                    error_analysis.format_errors * 100.0
                )),
            );
        }

        if !has_examples(prompt) && metrics.overall_score < t.examples_overall {
            suggestions.push(
                OptimizationSuggestion::new(
                    SuggestionType::Examples,
                    "Add few-shot examples",
                    "Show two to four input and output pairs covering normal and edge cases",
                    prompt,
                    SuggestionPriority::Medium,
                )
                .with_new_prompt(format!(
                    "{}\n\nExamples:\nInput: <example input>\nOutput: <expected output>",
                    prompt
                ))
                .with_impact(0.2, 0.8)
                .with_reasoning("The prompt contains no examples".to_string()),
            );
        }

        if let Some(classification) = &metrics.classification_metrics {
            for (class, f1) in &classification.f1_score {
                if *f1 < t.weak_class_f1 {
                    suggestions.push(
                        OptimizationSuggestion::new(
                            SuggestionType::Specificity,
                            format!("Define the '{}' class", class),
                            format!("Describe when an input belongs to '{}'", class),
                            prompt,
                            SuggestionPriority::Medium,
                        )
                        .with_new_prompt(format!(
                            "{}\n\nAssign '{}' only when: <criteria for {}>",
                            prompt, class, class
                        ))
                        .with_impact(0.1, 0.7)
                        .with_reasoning(format!("F1 for '{}' is {:.2}", class, f1)),
                    );
                }
            }
        }

        if let Some(generation) = &metrics.generation_metrics {
            if generation.rouge_l < t.constraints_rouge_l {
                suggestions.push(
                    OptimizationSuggestion::new(
                        SuggestionType::Constraints,
                        "Constrain the generated text",
                        "Outputs drift from the references; add length and content constraints",
                        prompt,
                        SuggestionPriority::Medium,
                    )
                    .with_new_prompt(format!(
                        "{}\n\nKeep the response close to the source content and within the expected length.",
                        prompt
                    ))
                    .with_impact(0.12, 0.7)
                    .with_reasoning(format!("ROUGE-L is {:.2}", generation.rouge_l)),
                );
            }
        }

        suggestions
    }
}

/// True when the prompt already carries few-shot examples.
pub fn has_examples(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    EXAMPLE_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[async_trait]
impl PromptOptimizer for HeuristicOptimizer {
    async fn suggest_improvements(
        &self,
        prompt: &str,
        metrics: &EvaluationMetrics,
        error_analysis: &ErrorAnalysis,
    ) -> Result<Vec<OptimizationSuggestion>> {
        let suggestions = self.suggest(prompt, metrics, error_analysis);
        tracing::debug!("Drafted {} optimization suggestions", suggestions.len());
        Ok(suggestions)
    }
}
