use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::EvaluationId;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: BTreeMap<String, f64>,
    pub recall: BTreeMap<String, f64>,
    pub f1_score: BTreeMap<String, f64>,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    /// true class -> predicted class -> count
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, u64>>,
    pub support: BTreeMap<String, u64>,
}

impl ClassificationMetrics {
    pub fn total_cells(&self) -> u64 {
        self.confusion_matrix
            .values()
            .flat_map(|row| row.values())
            .sum()
    }

    pub fn row_sum(&self, class: &str) -> u64 {
        self.confusion_matrix
            .get(class)
            .map(|row| row.values().sum())
            .unwrap_or(0)
    }
}

/// Text-similarity figures. `bert_score` and `perplexity` are derived from
/// ROUGE-1, not from a language model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationMetrics {
    pub bleu: f64,
    pub rouge_1: f64,
    pub rouge_2: f64,
    pub rouge_l: f64,
    pub bert_score: f64,
    pub perplexity: f64,
    pub diversity: f64,
    pub coherence: f64,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationMetrics {
    pub evaluation_id: Option<EvaluationId>,
    pub overall_score: f64,
    pub pass_rate: f64,
    pub test_cases_passed: usize,
    pub test_cases_total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_metrics: Option<ClassificationMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_metrics: Option<GenerationMetrics>,
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
    pub calculated_at: DateTime<Utc>,
}

impl EvaluationMetrics {
    pub fn new(evaluation_id: Option<EvaluationId>) -> Self {
        Self {
            evaluation_id,
            overall_score: 0.0,
            pass_rate: 0.0,
            test_cases_passed: 0,
            test_cases_total: 0,
            classification_metrics: None,
            generation_metrics: None,
            custom_metrics: BTreeMap::new(),
            calculated_at: Utc::now(),
        }
    }
}
