use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::analysis::{PromptAnalysis, TaskType};
use super::ids::{EvaluationId, TestCaseId};
use crate::error::{CoreError, Result};

pub type JsonObject = Map<String, Value>;

/// Field names checked, in order, for a classification label.
pub const CLASS_FIELDS: [&str; 6] = ["class", "label", "sentiment", "category", "prediction", "result"];

/// Field names checked, in order, for free text.
pub const TEXT_FIELDS: [&str; 7] = ["text", "result", "output", "response", "summary", "answer", "generated"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseCategory {
    #[default]
    Normal,
    EdgeCase,
    Adversarial,
}

impl TestCaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseCategory::Normal => "normal",
            TestCaseCategory::EdgeCase => "edge_case",
            TestCaseCategory::Adversarial => "adversarial",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Error,
}

impl TestCaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseStatus::Pending => "pending",
            TestCaseStatus::Passed => "passed",
            TestCaseStatus::Failed => "failed",
            TestCaseStatus::Error => "error",
        }
    }
}

/// Where a test case result came from. Simulated results only keep a
/// dashboard populated and carry no evaluation signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Executed,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub id: TestCaseId,
    pub evaluation_id: Option<EvaluationId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input: JsonObject,
    #[serde(default)]
    pub expected_output: JsonObject,
    #[serde(default)]
    pub actual_output: Option<JsonObject>,
    #[serde(default)]
    pub category: TestCaseCategory,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub status: TestCaseStatus,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    1.0
}

impl TestCase {
    pub fn new(name: impl Into<String>, category: TestCaseCategory) -> Self {
        Self {
            id: TestCaseId::new(),
            evaluation_id: None,
            name: name.into(),
            description: String::new(),
            input: JsonObject::new(),
            expected_output: JsonObject::new(),
            actual_output: None,
            category,
            weight: default_weight(),
            status: TestCaseStatus::Pending,
            score: 0.0,
            execution_mode: ExecutionMode::Executed,
            executed_at: None,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_input(mut self, input: JsonObject) -> Self {
        self.input = input;
        self
    }

    pub fn with_expected(mut self, expected: JsonObject) -> Self {
        self.expected_output = expected;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Stores a score clamped to `[0, 1]`; NaN becomes 0.
    pub fn set_score(&mut self, score: f64) {
        self.score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
    }

    /// Records an execution result.
    pub fn record_result(
        &mut self,
        actual_output: JsonObject,
        status: TestCaseStatus,
        score: f64,
        mode: ExecutionMode,
    ) {
        self.actual_output = Some(actual_output);
        self.status = status;
        self.set_score(score);
        self.execution_mode = mode;
        self.executed_at = Some(Utc::now());
    }

    pub fn is_passed(&self) -> bool {
        self.status == TestCaseStatus::Passed
    }

    pub fn is_simulated(&self) -> bool {
        self.execution_mode == ExecutionMode::Simulated
    }

    pub fn validate(&self, analysis: &PromptAnalysis) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("test case name cannot be empty".to_string()));
        }

        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(CoreError::Validation(format!(
                "test case weight cannot be negative: {}",
                self.weight
            )));
        }

        if analysis.task_type == TaskType::Classification && !analysis.classes().is_empty() {
            if let Some(expected) = extract_field(&self.expected_output, &["class", "sentiment", "label"]) {
                if !analysis.classes().iter().any(|c| c == &expected) {
                    return Err(CoreError::Validation(format!(
                        "expected output class '{}' not in valid classes: {:?}",
                        expected,
                        analysis.classes()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Returns the first present field, rendered as a string. Strings are used
/// verbatim, other JSON values via their JSON text.
pub fn extract_field(output: &JsonObject, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        output.get(*field).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    })
}

/// Canonical form of a class label: surrounding whitespace dropped, lowercased.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// The first class field of `output`, normalized. Blank labels count as absent.
pub fn extract_label(output: &JsonObject) -> Option<String> {
    extract_field(output, &CLASS_FIELDS)
        .map(|label| normalize_label(&label))
        .filter(|label| !label.is_empty())
}
