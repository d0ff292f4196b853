use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use super::ids::{CustomMetricId, EvaluationId, ProjectId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Numeric,
    Boolean,
    String,
    Percentage,
    Score,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    #[default]
    Average,
    Sum,
    Min,
    Max,
    Median,
    P95,
    P99,
    Count,
}

impl AggregationType {
    /// Rank-based aggregations get a min/max/median/avg details bag.
    pub fn is_percentile(&self) -> bool {
        matches!(
            self,
            AggregationType::Median | AggregationType::P95 | AggregationType::P99
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ThresholdOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[default]
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl ThresholdOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ThresholdOperator::GreaterThan => ">",
            ThresholdOperator::GreaterOrEqual => ">=",
            ThresholdOperator::LessThan => "<",
            ThresholdOperator::LessOrEqual => "<=",
            ThresholdOperator::Equal => "==",
            ThresholdOperator::NotEqual => "!=",
        }
    }
}

impl fmt::Display for ThresholdOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricThresholds {
    pub pass_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_value: Option<f64>,
    #[serde(default)]
    pub operator: ThresholdOperator,
}

impl MetricThresholds {
    pub fn new(operator: ThresholdOperator, pass_value: f64) -> Self {
        Self {
            pass_value,
            warning_value: None,
            fail_value: None,
            operator,
        }
    }
}

/// A user-defined metric scored per sample and aggregated per evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CustomMetric {
    pub id: CustomMetricId,

    pub project_id: ProjectId,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub metric_type: MetricType,

    #[serde(default)]
    pub aggregation: AggregationType,

    /// Regex for string metrics, arithmetic expression for custom metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    pub thresholds: MetricThresholds,

    #[validate(range(min = 0.0))]
    pub weight: f64,

    pub enabled: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl CustomMetric {
    pub fn new(
        id: CustomMetricId,
        project_id: ProjectId,
        name: impl Into<String>,
        metric_type: MetricType,
        aggregation: AggregationType,
        thresholds: MetricThresholds,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            name: name.into(),
            description: String::new(),
            metric_type,
            aggregation,
            formula: None,
            thresholds,
            weight: 1.0,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A raw sample measurement before conversion to its numeric representative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricRawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricValue {
    pub metric_id: CustomMetricId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<EvaluationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    pub value: MetricRawValue,
    /// Numeric representative used for thresholds and aggregation.
    pub numeric_value: f64,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricResultDetails {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub metric_id: CustomMetricId,
    pub metric_name: String,
    pub value: f64,
    pub passed: bool,
    pub pass_rate: f64,
    pub sample_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<MetricResultDetails>,
}
