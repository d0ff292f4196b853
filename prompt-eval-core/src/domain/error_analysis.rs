use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::EvaluationId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorAnalysis {
    pub evaluation_id: Option<EvaluationId>,
    pub common_errors: Vec<String>,
    pub error_patterns: BTreeMap<String, u64>,
    pub ambiguous_cases: f64,
    pub format_errors: f64,
    pub logic_errors: f64,
    pub inconsistent_cases: f64,
    pub error_categories: BTreeMap<String, f64>,
    /// Set when the analysis was derived from test-case statuses instead of
    /// by the configured error analyzer.
    #[serde(default)]
    pub heuristic: bool,
    pub created_at: DateTime<Utc>,
}

impl ErrorAnalysis {
    pub fn empty() -> Self {
        Self {
            evaluation_id: None,
            common_errors: Vec::new(),
            error_patterns: BTreeMap::new(),
            ambiguous_cases: 0.0,
            format_errors: 0.0,
            logic_errors: 0.0,
            inconsistent_cases: 0.0,
            error_categories: BTreeMap::new(),
            heuristic: false,
            created_at: Utc::now(),
        }
    }
}
