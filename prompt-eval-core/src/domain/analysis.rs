use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::EvaluationId;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    #[default]
    Generation,
    Extraction,
    Summarization,
    QuestionAnswering,
    Transformation,
    Completion,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::Classification,
        TaskType::Generation,
        TaskType::Extraction,
        TaskType::Summarization,
        TaskType::QuestionAnswering,
        TaskType::Transformation,
        TaskType::Completion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Generation => "generation",
            TaskType::Extraction => "extraction",
            TaskType::Summarization => "summarization",
            TaskType::QuestionAnswering => "question_answering",
            TaskType::Transformation => "transformation",
            TaskType::Completion => "completion",
        }
    }

    /// Task types scored with the text-overlap metrics.
    pub fn is_generative(&self) -> bool {
        matches!(self, TaskType::Generation | TaskType::Summarization)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown task type: {}", s)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputSchema {
    /// text, json, structured
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub constraints: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSchema {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub format: String,
    /// Label set for classification prompts.
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub constraints: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    /// format, length, value, pattern
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub rule: serde_json::Value,
    pub severity: ConstraintSeverity,
}

/// A few-shot example embedded in the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Example {
    pub input: serde_json::Map<String, serde_json::Value>,
    pub output: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptAnalysis {
    pub evaluation_id: Option<EvaluationId>,
    pub prompt_text: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub input_schema: InputSchema,
    #[serde(default)]
    pub output_schema: OutputSchema,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub examples: Vec<Example>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptAnalysis {
    /// An analysis that only carries the raw prompt, as attached to a freshly
    /// created evaluation.
    pub fn pending(prompt_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            evaluation_id: None,
            prompt_text: prompt_text.into(),
            task_type: TaskType::default(),
            input_schema: InputSchema::default(),
            output_schema: OutputSchema::default(),
            constraints: Vec::new(),
            examples: Vec::new(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new(prompt_text: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            task_type,
            confidence: 1.0,
            ..Self::pending(prompt_text)
        }
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.output_schema.classes = classes;
        self
    }

    pub fn with_examples(mut self, examples: Vec<Example>) -> Self {
        self.examples = examples;
        self
    }

    pub fn classes(&self) -> &[String] {
        &self.output_schema.classes
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::Validation(format!(
                "confidence must be between 0 and 1, got: {}",
                self.confidence
            )));
        }

        if self.task_type == TaskType::Classification && self.output_schema.classes.is_empty() {
            return Err(CoreError::Validation(
                "classification tasks must have output classes defined".to_string(),
            ));
        }

        for (i, constraint) in self.constraints.iter().enumerate() {
            if constraint.kind.trim().is_empty() {
                return Err(CoreError::Validation(format!("constraint {} missing type", i)));
            }
            if constraint.description.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "constraint {} missing description",
                    i
                )));
            }
        }

        Ok(())
    }
}
