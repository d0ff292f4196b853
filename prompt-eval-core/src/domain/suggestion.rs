use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::Example;
use super::ids::{EvaluationId, SuggestionId};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Clarity,
    Specificity,
    Examples,
    Format,
    Constraints,
    Accuracy,
    Consistency,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Applied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationSuggestion {
    pub id: SuggestionId,
    pub evaluation_id: Option<EvaluationId>,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub title: String,
    pub description: String,
    pub old_prompt: String,
    pub new_prompt: String,
    pub expected_impact: f64,
    pub confidence: f64,
    pub priority: SuggestionPriority,
    #[serde(default)]
    pub status: SuggestionStatus,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizationSuggestion {
    pub fn new(
        kind: SuggestionType,
        title: impl Into<String>,
        description: impl Into<String>,
        old_prompt: impl Into<String>,
        priority: SuggestionPriority,
    ) -> Self {
        let now = Utc::now();
        let old_prompt = old_prompt.into();
        Self {
            id: SuggestionId::new(),
            evaluation_id: None,
            kind,
            title: title.into(),
            description: description.into(),
            new_prompt: old_prompt.clone(),
            old_prompt,
            expected_impact: 0.0,
            confidence: 0.5,
            priority,
            status: SuggestionStatus::Pending,
            reasoning: String::new(),
            examples: Vec::new(),
            applied_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_new_prompt(mut self, new_prompt: impl Into<String>) -> Self {
        self.new_prompt = new_prompt.into();
        self
    }

    pub fn with_impact(mut self, expected_impact: f64, confidence: f64) -> Self {
        self.expected_impact = expected_impact;
        self.confidence = confidence;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("suggestion title cannot be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::Validation(format!(
                "suggestion confidence must be between 0 and 1, got: {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.expected_impact) {
            return Err(CoreError::Validation(format!(
                "expected impact must be between 0 and 1, got: {}",
                self.expected_impact
            )));
        }
        Ok(())
    }
}
