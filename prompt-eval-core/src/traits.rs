use async_trait::async_trait;

use crate::domain::{
    CustomMetric, CustomMetricId, ErrorAnalysis, Evaluation, EvaluationId, EvaluationMetrics,
    Example, ExecutorOptions, GeneratorOptions, JsonObject, ListOptions, OptimizationSuggestion,
    ProjectId, PromptAnalysis, TestCase,
};
use crate::error::Result;

/// Classifies a prompt's task type and schema.
///
/// Implementations must return a task type from [`crate::TaskType`] and, for
/// classification prompts, a non-empty class list.
#[async_trait]
pub trait PromptAnalyzer: Send + Sync {
    async fn analyze_prompt(&self, prompt: &str, examples: &[Example]) -> Result<PromptAnalysis>;
}

#[async_trait]
pub trait TestGenerator: Send + Sync {
    async fn generate_test_cases(
        &self,
        analysis: &PromptAnalysis,
        options: &GeneratorOptions,
    ) -> Result<Vec<TestCase>>;
}

/// Runs test cases against a prompt, returning each case with
/// `actual_output`, `status`, `score` and `executed_at` populated.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute_test_cases(
        &self,
        test_cases: Vec<TestCase>,
        prompt: &str,
        options: &ExecutorOptions,
    ) -> Result<Vec<TestCase>>;
}

#[async_trait]
pub trait ErrorAnalyzer: Send + Sync {
    async fn analyze_errors(
        &self,
        test_cases: &[TestCase],
        analysis: &PromptAnalysis,
    ) -> Result<ErrorAnalysis>;
}

#[async_trait]
pub trait PromptOptimizer: Send + Sync {
    async fn suggest_improvements(
        &self,
        prompt: &str,
        metrics: &EvaluationMetrics,
        error_analysis: &ErrorAnalysis,
    ) -> Result<Vec<OptimizationSuggestion>>;
}

/// The model completion seam: renders one test input through the prompt.
#[async_trait]
pub trait PromptRunner: Send + Sync {
    async fn run(&self, prompt: &str, input: &JsonObject) -> Result<JsonObject>;
}

/// Persistence for evaluation runs and their artifacts, all scoped by
/// evaluation id.
#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    async fn create_evaluation(&self, evaluation: &Evaluation) -> Result<()>;
    /// Fails with `CoreError::NotFound` for unknown ids.
    async fn get_evaluation(&self, id: EvaluationId) -> Result<Evaluation>;
    async fn update_evaluation(&self, evaluation: &Evaluation) -> Result<()>;
    async fn delete_evaluation(&self, id: EvaluationId) -> Result<()>;
    async fn list_evaluations(
        &self,
        project_id: ProjectId,
        options: &ListOptions,
    ) -> Result<Vec<Evaluation>>;

    async fn save_test_cases(&self, evaluation_id: EvaluationId, test_cases: &[TestCase]) -> Result<()>;
    async fn get_test_cases(&self, evaluation_id: EvaluationId) -> Result<Vec<TestCase>>;
    async fn update_test_case(&self, evaluation_id: EvaluationId, test_case: &TestCase) -> Result<()>;

    /// Insert or replace the metrics document of one evaluation.
    async fn save_metrics(&self, evaluation_id: EvaluationId, metrics: &EvaluationMetrics) -> Result<()>;
    async fn get_metrics(&self, evaluation_id: EvaluationId) -> Result<Option<EvaluationMetrics>>;

    async fn save_suggestions(
        &self,
        evaluation_id: EvaluationId,
        suggestions: &[OptimizationSuggestion],
    ) -> Result<()>;
    async fn get_suggestions(&self, evaluation_id: EvaluationId) -> Result<Vec<OptimizationSuggestion>>;
}

/// Source of custom metric definitions.
#[async_trait]
pub trait CustomMetricStore: Send + Sync {
    async fn enabled_metrics(&self, project_id: ProjectId) -> Result<Vec<CustomMetric>>;
    /// Persists the metric; an id of 0 asks the store to assign one.
    async fn save_metric(&self, metric: &CustomMetric) -> Result<CustomMetric>;
    async fn delete_metric(&self, project_id: ProjectId, metric_id: CustomMetricId) -> Result<()>;
}

#[async_trait]
pub trait MetricCalculator: Send + Sync {
    type Input;
    type Output;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output>;
}
