use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::analysis::PromptAnalysis;
use super::error_analysis::ErrorAnalysis;
use super::ids::{EvaluationId, ProjectId};
use super::metrics::EvaluationMetrics;
use super::options::EvaluationOptions;
use super::suggestion::OptimizationSuggestion;
use super::test_case::TestCase;
use crate::error::{CoreError, Result};

// ===== Evaluation Status =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl EvaluationStatus {
    pub fn can_transition_to(&self, target: &EvaluationStatus) -> bool {
        use EvaluationStatus::*;
        match (self, target) {
            // A failed run may be started again; a completed one may not.
            (Pending, Running) | (Failed, Running) => true,

            (Running, Completed) | (Running, Failed) => true,

            // Cancelled before the pipeline picked it up
            (Pending, Failed) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::Running => "running",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvaluationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EvaluationStatus::Pending),
            "running" => Ok(EvaluationStatus::Running),
            "completed" => Ok(EvaluationStatus::Completed),
            "failed" => Ok(EvaluationStatus::Failed),
            other => Err(CoreError::Validation(format!("unknown evaluation status: {}", other))),
        }
    }
}

// ===== Evaluation Domain Model =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub status: EvaluationStatus,
    /// 0 to 100
    pub progress: f64,
    #[serde(default)]
    pub error: Option<String>,
    /// True when test execution fell back to simulation for this run.
    #[serde(default)]
    pub simulated: bool,
    #[serde(default)]
    pub options: EvaluationOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_analysis: Option<PromptAnalysis>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvaluationMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_analysis: Option<ErrorAnalysis>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<OptimizationSuggestion>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn new(project_id: ProjectId, prompt_text: impl Into<String>, options: EvaluationOptions) -> Self {
        let now = Utc::now();
        Self {
            id: EvaluationId::new(),
            project_id,
            name: options.name.clone(),
            description: options.description.clone(),
            status: EvaluationStatus::Pending,
            progress: 0.0,
            error: None,
            simulated: false,
            options,
            prompt_analysis: Some(PromptAnalysis::pending(prompt_text)),
            test_cases: Vec::new(),
            metrics: None,
            error_analysis: None,
            suggestions: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raw prompt text, empty when no analysis is attached.
    pub fn prompt_text(&self) -> &str {
        self.prompt_analysis
            .as_ref()
            .map(|a| a.prompt_text.as_str())
            .unwrap_or("")
    }

    // State transition methods

    fn transition(&mut self, target: EvaluationStatus) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(CoreError::InvalidState(format!(
                "Cannot transition evaluation {} from {} to {}",
                self.id, self.status, target
            )));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enters `running` for a fresh run: progress, error and simulation flag
    /// are reset.
    pub fn start(&mut self) -> Result<()> {
        self.transition(EvaluationStatus::Running)?;
        self.progress = 0.0;
        self.error = None;
        self.simulated = false;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(EvaluationStatus::Completed)?;
        self.progress = 100.0;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(EvaluationStatus::Failed)?;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Moves progress forward; lower values are ignored and the result is
    /// capped at 100.
    pub fn advance_progress(&mut self, progress: f64) {
        if progress > self.progress {
            self.progress = progress.min(100.0);
            self.updated_at = Utc::now();
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
