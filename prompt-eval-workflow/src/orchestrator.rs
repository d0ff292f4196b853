use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use prompt_eval_core::{
    CoreError, ErrorAnalysis, ErrorAnalyzer, Evaluation, EvaluationId, EvaluationMetrics,
    EvaluationOptions, EvaluationRepository, EvaluationStatus, ExecutorOptions, GeneratorOptions,
    JsonObject, ListOptions, MetricCalculator, OptimizationSuggestion, ProjectId, PromptAnalysis,
    PromptAnalyzer, PromptOptimizer, Result, TestCase, TestExecutor, TestGenerator,
};
use prompt_eval_metrics::{CustomMetricsEvaluator, EvaluationMetricsCalculator, MetricsInput};
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error_analysis::heuristic_error_analysis;
use crate::simulation::SimulatedExecution;

pub type EvaluationMetricsSource =
    dyn MetricCalculator<Input = MetricsInput, Output = EvaluationMetrics>;

// ===== Configuration =====

/// Upper bounds for each collaborator call of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub analyze: Duration,
    pub generate: Duration,
    pub execute: Duration,
    pub error_analysis: Duration,
    pub optimize: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            analyze: Duration::from_secs(60),
            generate: Duration::from_secs(120),
            execute: Duration::from_secs(600),
            error_analysis: Duration::from_secs(60),
            optimize: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorConfig {
    /// Used when an evaluation carries no generator override.
    pub generator: GeneratorOptions,
    /// Used when an evaluation carries no executor override.
    pub executor: ExecutorOptions,
    pub timeouts: StageTimeouts,
    /// Seed for simulated execution; every run reuses it when set.
    pub simulation_seed: Option<u64>,
}

// ===== Stages =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyze,
    Generate,
    Execute,
    Metrics,
    ErrorAnalysis,
    Optimize,
}

impl Stage {
    /// Progress reported once the stage has been persisted.
    pub fn progress(&self) -> f64 {
        match self {
            Stage::Analyze => 20.0,
            Stage::Generate => 40.0,
            Stage::Execute => 60.0,
            Stage::Metrics => 80.0,
            Stage::ErrorAnalysis => 90.0,
            Stage::Optimize => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Generate => "generate",
            Stage::Execute => "execute",
            Stage::Metrics => "metrics",
            Stage::ErrorAnalysis => "error_analysis",
            Stage::Optimize => "optimize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Removes the evaluation from the in-flight set when the run ends.
struct RunGuard {
    in_flight: Arc<DashMap<EvaluationId, ()>>,
    id: EvaluationId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

// ===== Orchestrator =====

/// Drives an evaluation through analyze, generate, execute, metrics, error
/// analysis and optimize, persisting the record after every stage.
///
/// Analyze, generate and metrics are mandatory: their failure fails the run.
/// Execute, error analysis and optimize degrade to simulation, the heuristic
/// analysis and an empty suggestion list respectively. Cancellation fails the
/// run at any stage.
#[derive(Clone)]
pub struct EvaluationOrchestrator {
    repository: Arc<dyn EvaluationRepository>,
    analyzer: Arc<dyn PromptAnalyzer>,
    generator: Arc<dyn TestGenerator>,
    executor: Option<Arc<dyn TestExecutor>>,
    metrics: Arc<EvaluationMetricsSource>,
    error_analyzer: Option<Arc<dyn ErrorAnalyzer>>,
    optimizer: Arc<dyn PromptOptimizer>,
    custom_metrics: Option<Arc<CustomMetricsEvaluator>>,
    config: OrchestratorConfig,
    in_flight: Arc<DashMap<EvaluationId, ()>>,
}

impl EvaluationOrchestrator {
    pub fn new(
        repository: Arc<dyn EvaluationRepository>,
        analyzer: Arc<dyn PromptAnalyzer>,
        generator: Arc<dyn TestGenerator>,
        optimizer: Arc<dyn PromptOptimizer>,
    ) -> Self {
        Self {
            repository,
            analyzer,
            generator,
            executor: None,
            metrics: Arc::new(EvaluationMetricsCalculator::new()),
            error_analyzer: None,
            optimizer,
            custom_metrics: None,
            config: OrchestratorConfig::default(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_error_analyzer(mut self, analyzer: Arc<dyn ErrorAnalyzer>) -> Self {
        self.error_analyzer = Some(analyzer);
        self
    }

    pub fn with_metrics_calculator(mut self, metrics: Arc<EvaluationMetricsSource>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Project custom metrics are evaluated over the executed test cases and
    /// merged into `custom_metrics` of the run's metrics.
    pub fn with_custom_metrics(mut self, evaluator: Arc<CustomMetricsEvaluator>) -> Self {
        self.custom_metrics = Some(evaluator);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn create_evaluation(
        &self,
        project_id: ProjectId,
        prompt_text: impl Into<String>,
        options: EvaluationOptions,
    ) -> Result<Evaluation> {
        let evaluation = Evaluation::new(project_id, prompt_text, options);
        self.repository.create_evaluation(&evaluation).await?;

        tracing::info!(evaluation_id = %evaluation.id, "Created evaluation for project {}", project_id);
        Ok(evaluation)
    }

    pub async fn get_evaluation(&self, id: EvaluationId) -> Result<Evaluation> {
        self.repository.get_evaluation(id).await
    }

    pub async fn list_evaluations(
        &self,
        project_id: ProjectId,
        options: &ListOptions,
    ) -> Result<Vec<Evaluation>> {
        self.repository.list_evaluations(project_id, options).await
    }

    pub async fn delete_evaluation(&self, id: EvaluationId) -> Result<()> {
        self.repository.delete_evaluation(id).await?;
        tracing::info!(evaluation_id = %id, "Deleted evaluation");
        Ok(())
    }

    pub async fn get_evaluation_status(&self, id: EvaluationId) -> Result<(EvaluationStatus, f64)> {
        let evaluation = self.repository.get_evaluation(id).await?;
        Ok((evaluation.status, evaluation.progress))
    }

    pub async fn run_evaluation(&self, id: EvaluationId) -> Result<Evaluation> {
        self.run_evaluation_with_cancel(id, CancellationToken::new()).await
    }

    /// Spawns the run on the current runtime. Failures are logged and
    /// recorded on the evaluation.
    pub fn run_evaluation_async(&self, id: EvaluationId) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_evaluation(id).await {
                tracing::error!(evaluation_id = %id, "Background evaluation failed: {}", e);
            }
        })
    }

    pub async fn run_evaluation_with_cancel(
        &self,
        id: EvaluationId,
        token: CancellationToken,
    ) -> Result<Evaluation> {
        let _guard = self.acquire_run_guard(id)?;

        let mut evaluation = self.repository.get_evaluation(id).await?;
        if token.is_cancelled() && evaluation.status == EvaluationStatus::Pending {
            evaluation.fail("cancelled before start")?;
            self.repository.update_evaluation(&evaluation).await?;
            return Err(CoreError::Cancelled(format!("evaluation {} cancelled before start", id)));
        }

        evaluation.start()?;
        self.repository.update_evaluation(&evaluation).await?;
        tracing::info!(evaluation_id = %id, "Starting evaluation run");

        let stages = AssertUnwindSafe(self.run_stages(&mut evaluation, &token)).catch_unwind();
        let outcome = match stages.await {
            Ok(Ok(())) => self.finish(&mut evaluation).await,
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(CoreError::Internal(format!(
                "evaluation run panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    evaluation_id = %id,
                    "Evaluation completed (simulated: {})",
                    evaluation.simulated
                );
                Ok(evaluation)
            }
            Err(e) => {
                tracing::error!(evaluation_id = %id, "Evaluation failed: {}", e);
                if let Err(transition) = evaluation.fail(e.to_string()) {
                    tracing::warn!(evaluation_id = %id, "{}", transition);
                }
                if let Err(persist) = self.repository.update_evaluation(&evaluation).await {
                    tracing::error!(evaluation_id = %id, "Failed to record failure: {}", persist);
                }
                Err(e)
            }
        }
    }

    fn acquire_run_guard(&self, id: EvaluationId) -> Result<RunGuard> {
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => Err(CoreError::InvalidState(format!(
                "evaluation {} is already running",
                id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    id,
                })
            }
        }
    }

    /// Completes the run only once the completed record is stored.
    async fn finish(&self, evaluation: &mut Evaluation) -> Result<()> {
        let mut completed = evaluation.clone();
        completed.complete()?;
        self.repository.update_evaluation(&completed).await?;
        *evaluation = completed;
        Ok(())
    }

    async fn run_stages(&self, evaluation: &mut Evaluation, token: &CancellationToken) -> Result<()> {
        let prompt = evaluation.prompt_text().to_string();

        let analysis = self.analyze(evaluation, &prompt, token).await?;
        self.checkpoint(evaluation, Stage::Analyze).await?;

        let test_cases = self.generate(evaluation, &analysis, token).await?;
        self.checkpoint(evaluation, Stage::Generate).await?;

        let test_cases = self.execute(evaluation, test_cases, &prompt, &analysis, token).await?;
        self.checkpoint(evaluation, Stage::Execute).await?;

        let metrics = self.calculate_metrics(evaluation, &test_cases, &analysis, token).await?;
        self.checkpoint(evaluation, Stage::Metrics).await?;

        let error_analysis = self.analyze_errors(evaluation, &test_cases, &analysis, token).await?;
        self.checkpoint(evaluation, Stage::ErrorAnalysis).await?;

        self.optimize(evaluation, &prompt, &metrics, &error_analysis, token).await?;
        self.checkpoint(evaluation, Stage::Optimize).await
    }

    async fn checkpoint(&self, evaluation: &mut Evaluation, stage: Stage) -> Result<()> {
        evaluation.advance_progress(stage.progress());
        self.repository.update_evaluation(evaluation).await?;
        tracing::info!(
            evaluation_id = %evaluation.id,
            "Stage {} finished ({}%)",
            stage,
            evaluation.progress
        );
        Ok(())
    }

    /// Races a collaborator call against the stage deadline and the run's
    /// cancellation token.
    async fn guarded<T, F>(
        &self,
        stage: Stage,
        limit: Duration,
        token: &CancellationToken,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tracing::debug!("Stage {} started", stage);
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CoreError::Cancelled(format!("{} stage cancelled", stage))),
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(CoreError::Timeout(format!("{} stage exceeded {:?}", stage, limit))),
            },
        }
    }

    // ===== Stage 1: analyze =====

    async fn analyze(
        &self,
        evaluation: &mut Evaluation,
        prompt: &str,
        token: &CancellationToken,
    ) -> Result<PromptAnalysis> {
        if prompt.trim().is_empty() {
            return Err(CoreError::Validation("prompt text cannot be empty".to_string()));
        }

        let examples = evaluation
            .prompt_analysis
            .as_ref()
            .map(|a| a.examples.clone())
            .unwrap_or_default();

        let mut analysis = self
            .guarded(
                Stage::Analyze,
                self.config.timeouts.analyze,
                token,
                self.analyzer.analyze_prompt(prompt, &examples),
            )
            .await?;
        analysis.validate()?;

        if analysis.prompt_text.is_empty() {
            analysis.prompt_text = prompt.to_string();
        }
        analysis.evaluation_id = Some(evaluation.id);
        tracing::info!(
            evaluation_id = %evaluation.id,
            "Prompt analyzed as {} ({} classes)",
            analysis.task_type,
            analysis.classes().len()
        );

        evaluation.prompt_analysis = Some(analysis.clone());
        Ok(analysis)
    }

    // ===== Stage 2: generate =====

    async fn generate(
        &self,
        evaluation: &mut Evaluation,
        analysis: &PromptAnalysis,
        token: &CancellationToken,
    ) -> Result<Vec<TestCase>> {
        let options = evaluation.options.generator.unwrap_or(self.config.generator);
        let generated = self
            .guarded(
                Stage::Generate,
                self.config.timeouts.generate,
                token,
                self.generator.generate_test_cases(analysis, &options),
            )
            .await?;

        let requested = generated.len();
        let test_cases: Vec<TestCase> = generated
            .into_iter()
            .filter_map(|mut test_case| match test_case.validate(analysis) {
                Ok(()) => {
                    test_case.evaluation_id = Some(evaluation.id);
                    Some(test_case)
                }
                Err(e) => {
                    tracing::warn!(evaluation_id = %evaluation.id, "Dropping invalid test case '{}': {}", test_case.name, e);
                    None
                }
            })
            .collect();

        if test_cases.is_empty() {
            return Err(CoreError::Validation(format!(
                "no valid test cases generated ({} rejected)",
                requested
            )));
        }

        tracing::info!(
            evaluation_id = %evaluation.id,
            "Generated {} test cases ({} dropped)",
            test_cases.len(),
            requested - test_cases.len()
        );
        self.save_test_cases(evaluation.id, &test_cases).await;
        evaluation.test_cases = test_cases.clone();
        Ok(test_cases)
    }

    // ===== Stage 3: execute =====

    async fn execute(
        &self,
        evaluation: &mut Evaluation,
        test_cases: Vec<TestCase>,
        prompt: &str,
        analysis: &PromptAnalysis,
        token: &CancellationToken,
    ) -> Result<Vec<TestCase>> {
        let executed = match &self.executor {
            Some(executor) => {
                let options = evaluation.options.executor.unwrap_or(self.config.executor);
                let call = executor.execute_test_cases(test_cases.clone(), prompt, &options);
                match self
                    .guarded(Stage::Execute, self.config.timeouts.execute, token, call)
                    .await
                {
                    Ok(executed) => Some(executed),
                    Err(e @ CoreError::Cancelled(_)) => return Err(e),
                    Err(e) => {
                        tracing::warn!(evaluation_id = %evaluation.id, "Test execution failed, simulating results: {}", e);
                        None
                    }
                }
            }
            None => {
                tracing::warn!(evaluation_id = %evaluation.id, "No test executor configured, simulating results");
                None
            }
        };

        let test_cases = match executed {
            Some(executed) => executed,
            None => {
                evaluation.simulated = true;
                SimulatedExecution::new(self.config.simulation_seed).run(test_cases, analysis)
            }
        };

        self.save_test_cases(evaluation.id, &test_cases).await;
        evaluation.test_cases = test_cases.clone();
        Ok(test_cases)
    }

    // ===== Stage 4: metrics =====

    async fn calculate_metrics(
        &self,
        evaluation: &mut Evaluation,
        test_cases: &[TestCase],
        analysis: &PromptAnalysis,
        token: &CancellationToken,
    ) -> Result<EvaluationMetrics> {
        if token.is_cancelled() {
            return Err(CoreError::Cancelled(format!("{} stage cancelled", Stage::Metrics)));
        }

        let mut metrics = self
            .metrics
            .calculate(MetricsInput {
                test_cases: test_cases.to_vec(),
                analysis: analysis.clone(),
            })
            .await?;
        metrics.evaluation_id = Some(evaluation.id);

        if let Some(evaluator) = &self.custom_metrics {
            apply_custom_metrics(evaluator, evaluation.project_id, test_cases, &mut metrics).await;
        }

        tracing::info!(
            evaluation_id = %evaluation.id,
            "Overall score {:.3}, pass rate {:.3}",
            metrics.overall_score,
            metrics.pass_rate
        );

        if let Err(e) = self.repository.save_metrics(evaluation.id, &metrics).await {
            tracing::warn!(evaluation_id = %evaluation.id, "Failed to save metrics: {}", e);
        }
        evaluation.metrics = Some(metrics.clone());
        Ok(metrics)
    }

    // ===== Stage 5: error analysis =====

    async fn analyze_errors(
        &self,
        evaluation: &mut Evaluation,
        test_cases: &[TestCase],
        analysis: &PromptAnalysis,
        token: &CancellationToken,
    ) -> Result<ErrorAnalysis> {
        let mut error_analysis = match &self.error_analyzer {
            Some(analyzer) => {
                let call = analyzer.analyze_errors(test_cases, analysis);
                match self
                    .guarded(Stage::ErrorAnalysis, self.config.timeouts.error_analysis, token, call)
                    .await
                {
                    Ok(error_analysis) => error_analysis,
                    Err(e @ CoreError::Cancelled(_)) => return Err(e),
                    Err(e) => {
                        tracing::warn!(evaluation_id = %evaluation.id, "Error analysis failed, using heuristics: {}", e);
                        heuristic_error_analysis(test_cases)
                    }
                }
            }
            None => heuristic_error_analysis(test_cases),
        };

        error_analysis.evaluation_id = Some(evaluation.id);
        evaluation.error_analysis = Some(error_analysis.clone());
        Ok(error_analysis)
    }

    // ===== Stage 6: optimize =====

    async fn optimize(
        &self,
        evaluation: &mut Evaluation,
        prompt: &str,
        metrics: &EvaluationMetrics,
        error_analysis: &ErrorAnalysis,
        token: &CancellationToken,
    ) -> Result<()> {
        let call = self.optimizer.suggest_improvements(prompt, metrics, error_analysis);
        let suggestions = match self
            .guarded(Stage::Optimize, self.config.timeouts.optimize, token, call)
            .await
        {
            Ok(suggestions) => suggestions,
            Err(e @ CoreError::Cancelled(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(evaluation_id = %evaluation.id, "Optimization failed, no suggestions: {}", e);
                Vec::new()
            }
        };

        let suggestions: Vec<OptimizationSuggestion> = suggestions
            .into_iter()
            .map(|mut s| {
                s.evaluation_id = Some(evaluation.id);
                s
            })
            .collect();

        if let Err(e) = self.repository.save_suggestions(evaluation.id, &suggestions).await {
            tracing::warn!(evaluation_id = %evaluation.id, "Failed to save suggestions: {}", e);
        }
        tracing::info!(evaluation_id = %evaluation.id, "{} optimization suggestions", suggestions.len());
        evaluation.suggestions = suggestions;
        Ok(())
    }

    async fn save_test_cases(&self, id: EvaluationId, test_cases: &[TestCase]) {
        if let Err(e) = self.repository.save_test_cases(id, test_cases).await {
            tracing::warn!(evaluation_id = %id, "Failed to save test cases: {}", e);
        }
    }
}

impl fmt::Debug for EvaluationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationOrchestrator")
            .field("config", &self.config)
            .field("has_executor", &self.executor.is_some())
            .field("has_error_analyzer", &self.error_analyzer.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Sample handed to custom metrics: the actual output plus the case's
/// `id`, `score`, `passed`, `category` and `duration_ms`.
pub fn custom_metric_sample(test_case: &TestCase) -> JsonObject {
    let mut sample = test_case.actual_output.clone().unwrap_or_default();
    sample.insert("id".to_string(), Value::String(test_case.id.to_string()));
    sample.insert("score".to_string(), json!(test_case.score));
    sample.insert("passed".to_string(), Value::Bool(test_case.is_passed()));
    sample.insert("category".to_string(), json!(test_case.category.as_str()));
    if let Some(duration) = test_case.duration_ms {
        sample.insert("duration_ms".to_string(), json!(duration));
    }
    sample
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn apply_custom_metrics(
    evaluator: &CustomMetricsEvaluator,
    project_id: ProjectId,
    test_cases: &[TestCase],
    metrics: &mut EvaluationMetrics,
) {
    if let Err(e) = evaluator.load_metrics(project_id).await {
        tracing::warn!("Failed to load custom metrics for project {}: {}", project_id, e);
        return;
    }

    let samples: Vec<JsonObject> = test_cases.iter().map(custom_metric_sample).collect();
    for result in evaluator.evaluate_samples(project_id, &samples) {
        metrics.custom_metrics.insert(result.metric_name, result.value);
    }
}
