#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use prompt_eval_core::{
    CoreError, ErrorAnalysis, ErrorAnalyzer, Evaluation, EvaluationId, EvaluationMetrics,
    EvaluationRepository, Example, ExecutorOptions, GeneratorOptions, JsonObject, ListOptions,
    OptimizationSuggestion, ProjectId, PromptAnalysis, PromptAnalyzer, PromptOptimizer, Result,
    TaskType, TestCase, TestCaseCategory, TestExecutor, TestGenerator,
};
use prompt_eval_storage::InMemoryEvaluationRepository;
use serde_json::json;
use std::sync::Mutex;

mock! {
    pub Analyzer {}

    #[async_trait]
    impl PromptAnalyzer for Analyzer {
        async fn analyze_prompt(&self, prompt: &str, examples: &[Example]) -> Result<PromptAnalysis>;
    }
}

mock! {
    pub Generator {}

    #[async_trait]
    impl TestGenerator for Generator {
        async fn generate_test_cases(
            &self,
            analysis: &PromptAnalysis,
            options: &GeneratorOptions,
        ) -> Result<Vec<TestCase>>;
    }
}

mock! {
    pub Executor {}

    #[async_trait]
    impl TestExecutor for Executor {
        async fn execute_test_cases(
            &self,
            test_cases: Vec<TestCase>,
            prompt: &str,
            options: &ExecutorOptions,
        ) -> Result<Vec<TestCase>>;
    }
}

mock! {
    pub ErrorAnalyzerMock {}

    #[async_trait]
    impl ErrorAnalyzer for ErrorAnalyzerMock {
        async fn analyze_errors(
            &self,
            test_cases: &[TestCase],
            analysis: &PromptAnalysis,
        ) -> Result<ErrorAnalysis>;
    }
}

mock! {
    pub Optimizer {}

    #[async_trait]
    impl PromptOptimizer for Optimizer {
        async fn suggest_improvements(
            &self,
            prompt: &str,
            metrics: &EvaluationMetrics,
            error_analysis: &ErrorAnalysis,
        ) -> Result<Vec<OptimizationSuggestion>>;
    }
}

pub const PROMPT: &str = "Classify the sentiment of the review as positive or negative.";

pub fn sentiment_analysis() -> PromptAnalysis {
    PromptAnalysis::new(PROMPT, TaskType::Classification)
        .with_classes(vec!["positive".to_string(), "negative".to_string()])
}

pub fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().cloned().unwrap_or_default()
}

/// Alternating positive and negative cases across all three categories.
pub fn sentiment_cases(count: usize) -> Vec<TestCase> {
    (0..count)
        .map(|i| {
            let category = match i % 3 {
                0 => TestCaseCategory::Normal,
                1 => TestCaseCategory::EdgeCase,
                _ => TestCaseCategory::Adversarial,
            };
            let label = if i % 2 == 0 { "positive" } else { "negative" };
            TestCase::new(format!("review {}", i), category)
                .with_input(object(json!({"text": format!("review text {}", i)})))
                .with_expected(object(json!({"class": label})))
        })
        .collect()
}

pub fn analyzer_returning(analysis: PromptAnalysis) -> MockAnalyzer {
    let mut analyzer = MockAnalyzer::new();
    analyzer
        .expect_analyze_prompt()
        .returning(move |_, _| Ok(analysis.clone()));
    analyzer
}

pub fn generator_returning(cases: Vec<TestCase>) -> MockGenerator {
    let mut generator = MockGenerator::new();
    generator
        .expect_generate_test_cases()
        .returning(move |_, _| Ok(cases.clone()));
    generator
}

pub fn optimizer_returning_nothing() -> MockOptimizer {
    let mut optimizer = MockOptimizer::new();
    optimizer
        .expect_suggest_improvements()
        .returning(|_, _, _| Ok(Vec::new()));
    optimizer
}

/// Echoes the expected output of every case, so every case passes.
pub fn perfect_executor() -> MockExecutor {
    let mut executor = MockExecutor::new();
    executor.expect_execute_test_cases().returning(|cases, _, _| {
        Ok(cases
            .into_iter()
            .map(|mut tc| {
                let output = tc.expected_output.clone();
                tc.record_result(
                    output,
                    prompt_eval_core::TestCaseStatus::Passed,
                    1.0,
                    prompt_eval_core::ExecutionMode::Executed,
                );
                tc.duration_ms = Some(5);
                tc
            })
            .collect())
    });
    executor
}

/// Wraps the in-memory repository, recording the progress of every
/// evaluation update and optionally failing updates after a number of calls.
#[derive(Debug, Default)]
pub struct RecordingRepository {
    pub inner: InMemoryEvaluationRepository,
    pub progress: Mutex<Vec<f64>>,
    pub fail_updates_after: Option<usize>,
}

impl RecordingRepository {
    pub fn failing_after(updates: usize) -> Self {
        Self {
            fail_updates_after: Some(updates),
            ..Default::default()
        }
    }

    pub fn progress(&self) -> Vec<f64> {
        self.progress.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationRepository for RecordingRepository {
    async fn create_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        self.inner.create_evaluation(evaluation).await
    }

    async fn get_evaluation(&self, id: EvaluationId) -> Result<Evaluation> {
        self.inner.get_evaluation(id).await
    }

    async fn update_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let calls = {
            let mut progress = self.progress.lock().unwrap();
            progress.push(evaluation.progress);
            progress.len()
        };
        if self.fail_updates_after.is_some_and(|limit| calls > limit) {
            return Err(CoreError::Database("connection reset".to_string()));
        }
        self.inner.update_evaluation(evaluation).await
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> Result<()> {
        self.inner.delete_evaluation(id).await
    }

    async fn list_evaluations(
        &self,
        project_id: ProjectId,
        options: &ListOptions,
    ) -> Result<Vec<Evaluation>> {
        self.inner.list_evaluations(project_id, options).await
    }

    async fn save_test_cases(&self, id: EvaluationId, test_cases: &[TestCase]) -> Result<()> {
        self.inner.save_test_cases(id, test_cases).await
    }

    async fn get_test_cases(&self, id: EvaluationId) -> Result<Vec<TestCase>> {
        self.inner.get_test_cases(id).await
    }

    async fn update_test_case(&self, id: EvaluationId, test_case: &TestCase) -> Result<()> {
        self.inner.update_test_case(id, test_case).await
    }

    async fn save_metrics(&self, id: EvaluationId, metrics: &EvaluationMetrics) -> Result<()> {
        self.inner.save_metrics(id, metrics).await
    }

    async fn get_metrics(&self, id: EvaluationId) -> Result<Option<EvaluationMetrics>> {
        self.inner.get_metrics(id).await
    }

    async fn save_suggestions(
        &self,
        id: EvaluationId,
        suggestions: &[OptimizationSuggestion],
    ) -> Result<()> {
        self.inner.save_suggestions(id, suggestions).await
    }

    async fn get_suggestions(&self, id: EvaluationId) -> Result<Vec<OptimizationSuggestion>> {
        self.inner.get_suggestions(id).await
    }
}
