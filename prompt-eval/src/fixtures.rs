//! File-backed collaborators for running evaluations from the command line.

use async_trait::async_trait;
use prompt_eval_core::{
    AggregationType, CoreError, CustomMetric, CustomMetricId, Example, GeneratorOptions,
    JsonObject, MetricThresholds, MetricType, ProjectId, PromptAnalysis, PromptAnalyzer, Result,
    TaskType, TestCase, TestCaseCategory, TestGenerator,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Reports a fixed task type and class list for every prompt.
#[derive(Debug, Clone)]
pub struct FixedAnalyzer {
    task_type: TaskType,
    classes: Vec<String>,
}

impl FixedAnalyzer {
    pub fn new(task_type: TaskType, classes: Vec<String>) -> Self {
        Self { task_type, classes }
    }
}

#[async_trait]
impl PromptAnalyzer for FixedAnalyzer {
    async fn analyze_prompt(&self, prompt: &str, examples: &[Example]) -> Result<PromptAnalysis> {
        Ok(PromptAnalysis::new(prompt, self.task_type)
            .with_classes(self.classes.clone())
            .with_examples(examples.to_vec()))
    }
}

#[derive(Debug, Deserialize)]
struct CaseRecord {
    name: String,
    #[serde(default)]
    category: TestCaseCategory,
    #[serde(default)]
    input: JsonObject,
    #[serde(default)]
    expected_output: JsonObject,
    #[serde(default)]
    weight: Option<f64>,
}

/// Reads test cases from a JSON array on disk.
///
/// Each category is capped at the count requested in [`GeneratorOptions`].
#[derive(Debug, Clone)]
pub struct FileTestGenerator {
    path: PathBuf,
}

impl FileTestGenerator {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<Vec<CaseRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CoreError::Collaborator(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl TestGenerator for FileTestGenerator {
    async fn generate_test_cases(
        &self,
        _analysis: &PromptAnalysis,
        options: &GeneratorOptions,
    ) -> Result<Vec<TestCase>> {
        let records = self.load().await?;
        let (mut normal, mut edge, mut adversarial) = (0, 0, 0);

        let cases: Vec<TestCase> = records
            .into_iter()
            .filter(|record| {
                let (taken, limit) = match record.category {
                    TestCaseCategory::Normal => (&mut normal, options.normal_count),
                    TestCaseCategory::EdgeCase => (&mut edge, options.edge_count),
                    TestCaseCategory::Adversarial => (&mut adversarial, options.adversarial_count),
                };
                *taken += 1;
                *taken <= limit
            })
            .map(|record| {
                let case = TestCase::new(record.name, record.category)
                    .with_input(record.input)
                    .with_expected(record.expected_output);
                match record.weight {
                    Some(weight) => case.with_weight(weight),
                    None => case,
                }
            })
            .collect();

        tracing::info!("Loaded {} test cases from {}", cases.len(), self.path.display());
        Ok(cases)
    }
}

#[derive(Debug, Deserialize)]
struct MetricRecord {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    metric_type: MetricType,
    #[serde(default)]
    aggregation: AggregationType,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    thresholds: MetricThresholds,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Reads custom metric definitions for `project_id` from a JSON array.
///
/// Ids are left at 0 so the store assigns them.
pub async fn load_metric_definitions(
    path: impl AsRef<Path>,
    project_id: ProjectId,
) -> Result<Vec<CustomMetric>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Collaborator(format!("failed to read {}: {}", path.display(), e)))?;
    let records: Vec<MetricRecord> = serde_json::from_str(&raw)?;

    Ok(records
        .into_iter()
        .map(|record| {
            let mut metric = CustomMetric::new(
                CustomMetricId(0),
                project_id,
                record.name,
                record.metric_type,
                record.aggregation,
                record.thresholds,
            )
            .with_weight(record.weight);
            metric.description = record.description;
            metric.formula = record.formula;
            metric
        })
        .collect())
}
