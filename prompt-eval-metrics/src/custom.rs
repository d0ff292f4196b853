use chrono::Utc;
use dashmap::DashMap;
use prompt_eval_core::{
    CoreError, CustomMetric, CustomMetricId, CustomMetricStore, JsonObject,
    MetricRawValue, MetricResult, MetricType, MetricValue, ProjectId, Result,
};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use crate::aggregators::{check_threshold, MetricAggregator};
use crate::formula::Formula;

type MetricSet = Arc<HashMap<CustomMetricId, CustomMetric>>;

/// Evaluates user-defined metrics over samples and aggregates the results.
///
/// Definitions are cached per project. A project's set is replaced as a whole
/// by [`load_metrics`](Self::load_metrics); readers keep the snapshot they
/// started with.
pub struct CustomMetricsEvaluator {
    store: Arc<dyn CustomMetricStore>,
    cache: DashMap<ProjectId, MetricSet>,
    regexes: DashMap<String, Regex>,
    formulas: DashMap<String, Arc<Formula>>,
}

impl CustomMetricsEvaluator {
    pub fn new(store: Arc<dyn CustomMetricStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            regexes: DashMap::new(),
            formulas: DashMap::new(),
        }
    }

    /// Fetches the enabled metrics of a project and replaces its cache entry.
    pub async fn load_metrics(&self, project_id: ProjectId) -> Result<usize> {
        let metrics = self.store.enabled_metrics(project_id).await?;
        let set: HashMap<_, _> = metrics
            .into_iter()
            .filter(|m| m.enabled)
            .map(|m| (m.id, m))
            .collect();
        let count = set.len();

        self.cache.insert(project_id, Arc::new(set));
        tracing::info!("Loaded {} custom metrics for project {}", count, project_id);

        Ok(count)
    }

    /// Validates and persists a definition, then updates the project cache
    /// if the project is loaded. Disabled metrics are evicted from the cache.
    pub async fn save_metric(&self, metric: &CustomMetric) -> Result<CustomMetric> {
        metric.validate()?;
        self.check_definition(metric)?;

        let saved = self.store.save_metric(metric).await?;

        // Projects that were never loaded stay unloaded.
        if let Some(mut entry) = self.cache.get_mut(&saved.project_id) {
            let set = Arc::make_mut(entry.value_mut());
            if saved.enabled {
                set.insert(saved.id, saved.clone());
            } else {
                set.remove(&saved.id);
            }
        }

        tracing::debug!("Saved custom metric {} ({})", saved.id, saved.name);
        Ok(saved)
    }

    pub async fn delete_metric(&self, project_id: ProjectId, metric_id: CustomMetricId) -> Result<()> {
        self.store.delete_metric(project_id, metric_id).await?;

        if let Some(mut entry) = self.cache.get_mut(&project_id) {
            Arc::make_mut(entry.value_mut()).remove(&metric_id);
        }

        tracing::debug!("Deleted custom metric {} from project {}", metric_id, project_id);
        Ok(())
    }

    /// Loaded definitions of a project, ordered by id.
    pub fn metrics(&self, project_id: ProjectId) -> Vec<CustomMetric> {
        let mut metrics: Vec<CustomMetric> = self
            .snapshot(project_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default();
        metrics.sort_by_key(|m| m.id);
        metrics
    }

    fn snapshot(&self, project_id: ProjectId) -> Option<MetricSet> {
        self.cache.get(&project_id).map(|entry| Arc::clone(entry.value()))
    }

    fn check_definition(&self, metric: &CustomMetric) -> Result<()> {
        match (metric.metric_type, metric.formula.as_deref()) {
            (MetricType::Custom, None) => Err(CoreError::Validation(format!(
                "custom metric {} requires a formula",
                metric.name
            ))),
            (MetricType::Custom, Some(formula)) => self.formula(formula).map(|_| ()),
            (MetricType::String, Some(pattern)) if !pattern.is_empty() => {
                self.regex(pattern).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self.regexes.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| CoreError::Validation(format!("invalid pattern '{}': {}", pattern, e)))?;
        self.regexes.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    fn formula(&self, source: &str) -> Result<Arc<Formula>> {
        if let Some(formula) = self.formulas.get(source) {
            return Ok(Arc::clone(formula.value()));
        }
        let formula = Arc::new(Formula::parse(source)?);
        self.formulas.insert(source.to_string(), Arc::clone(&formula));
        Ok(formula)
    }

    /// Scores one sample. The raw value is read from `sample[metric.name]`.
    pub fn evaluate_metric(&self, metric: &CustomMetric, sample: &JsonObject) -> Result<MetricValue> {
        let field = sample.get(&metric.name);

        let (value, numeric_value) = match metric.metric_type {
            MetricType::Numeric | MetricType::Percentage | MetricType::Score => {
                let number = field.map(numeric).unwrap_or(0.0);
                (raw_value(field, MetricRawValue::Number(0.0)), number)
            }
            MetricType::Boolean => {
                let flag = field.map(truthy).unwrap_or(false);
                (MetricRawValue::Bool(flag), if flag { 1.0 } else { 0.0 })
            }
            MetricType::String => {
                let text = match field {
                    Some(Value::String(s)) => Some(s.as_str()),
                    _ => None,
                };
                let score = match text {
                    Some(text) => self.score_text(metric, text)?,
                    None => 0.0,
                };
                (raw_value(field, MetricRawValue::Text(String::new())), score)
            }
            MetricType::Custom => {
                let source = metric.formula.as_deref().ok_or_else(|| {
                    CoreError::Validation(format!("custom metric {} requires a formula", metric.name))
                })?;
                let number = self.formula(source)?.evaluate(sample)?;
                (MetricRawValue::Number(number), number)
            }
        };

        Ok(MetricValue {
            metric_id: metric.id,
            evaluation_id: None,
            sample_id: sample.get("id").map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            value,
            numeric_value,
            passed: check_threshold(numeric_value, &metric.thresholds),
            timestamp: Utc::now(),
        })
    }

    /// 1.0 on a pattern match, the character count for length metrics,
    /// otherwise 0.
    fn score_text(&self, metric: &CustomMetric, text: &str) -> Result<f64> {
        if let Some(pattern) = metric.formula.as_deref().filter(|p| !p.is_empty()) {
            if self.regex(pattern)?.is_match(text) {
                return Ok(1.0);
            }
        }

        if metric.name.contains("length") {
            return Ok(text.chars().count() as f64);
        }

        Ok(0.0)
    }

    /// Aggregates the values of a loaded metric.
    pub fn aggregate_results(
        &self,
        project_id: ProjectId,
        metric_id: CustomMetricId,
        values: &[MetricValue],
    ) -> Result<MetricResult> {
        let metric = self
            .snapshot(project_id)
            .and_then(|set| set.get(&metric_id).cloned())
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "custom metric {} not loaded for project {}",
                    metric_id, project_id
                ))
            })?;

        Ok(aggregate_metric(&metric, values))
    }

    /// Evaluates every loaded metric of the project over all samples.
    ///
    /// A metric that fails on any sample is left out of the results; the
    /// remaining metrics are still reported.
    pub fn evaluate_samples(&self, project_id: ProjectId, samples: &[JsonObject]) -> Vec<MetricResult> {
        self.metrics(project_id)
            .iter()
            .filter_map(|metric| {
                let values = samples
                    .iter()
                    .map(|sample| self.evaluate_metric(metric, sample))
                    .collect::<Result<Vec<_>>>();
                match values {
                    Ok(values) => Some(aggregate_metric(metric, &values)),
                    Err(e) => {
                        tracing::warn!(
                            "Skipping custom metric {} ({}) for project {}: {}",
                            metric.id,
                            metric.name,
                            project_id,
                            e
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Share of passing results weighted by metric weight; 0 when no weight
    /// applies.
    pub fn weighted_score(results: &[MetricResult], metrics: &[CustomMetric]) -> f64 {
        let weights: HashMap<CustomMetricId, f64> =
            metrics.iter().map(|m| (m.id, m.weight)).collect();

        let (passed, total) = results.iter().fold((0.0, 0.0), |(passed, total), result| {
            let weight = weights.get(&result.metric_id).copied().unwrap_or(0.0);
            let gained = if result.passed { weight } else { 0.0 };
            (passed + gained, total + weight)
        });

        if total > 0.0 {
            passed / total
        } else {
            0.0
        }
    }
}

fn aggregate_metric(metric: &CustomMetric, values: &[MetricValue]) -> MetricResult {
    let mut result = MetricResult {
        metric_id: metric.id,
        metric_name: metric.name.clone(),
        value: 0.0,
        passed: false,
        pass_rate: 0.0,
        sample_count: values.len(),
        details: None,
    };

    if values.is_empty() {
        return result;
    }

    let numeric: Vec<f64> = values.iter().map(|v| v.numeric_value).collect();
    let passed = values.iter().filter(|v| v.passed).count();

    result.value = MetricAggregator::aggregate(&numeric, metric.aggregation);
    result.pass_rate = passed as f64 / values.len() as f64;
    result.passed = check_threshold(result.value, &metric.thresholds);

    if metric.aggregation.is_percentile() {
        result.details = Some(MetricAggregator::details(&numeric));
    }

    result
}

fn numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn raw_value(field: Option<&Value>, missing: MetricRawValue) -> MetricRawValue {
    match field {
        Some(Value::Bool(b)) => MetricRawValue::Bool(*b),
        Some(Value::Number(n)) => MetricRawValue::Number(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => MetricRawValue::Text(s.clone()),
        Some(other) => MetricRawValue::Text(other.to_string()),
        None => missing,
    }
}

impl std::fmt::Debug for CustomMetricsEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomMetricsEvaluator")
            .field("projects", &self.cache.len())
            .finish()
    }
}
