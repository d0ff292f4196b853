use prompt_eval_core::{AggregationType, MetricResultDetails, MetricThresholds, ThresholdOperator};

/// Tolerance used by the `==` and `!=` threshold operators.
pub const EQUALITY_TOLERANCE: f64 = 1e-4;

pub struct MetricAggregator;

impl MetricAggregator {
    /// Reduces sample values with the given aggregation. Empty input yields 0.
    pub fn aggregate(values: &[f64], aggregation: AggregationType) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        match aggregation {
            AggregationType::Average => values.iter().sum::<f64>() / values.len() as f64,
            AggregationType::Sum => values.iter().sum(),
            AggregationType::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            AggregationType::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            AggregationType::Median => Self::percentile(values, 50.0),
            AggregationType::P95 => Self::percentile(values, 95.0),
            AggregationType::P99 => Self::percentile(values, 99.0),
            AggregationType::Count => values.len() as f64,
        }
    }

    /// Linear-interpolation percentile: `index = p/100 * (n-1)` over the
    /// sorted values. Empty input yields 0.
    pub fn percentile(values: &[f64], percentile: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let index = (percentile / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lower = index.floor() as usize;
        let upper = index.ceil() as usize;

        if lower == upper {
            return sorted[lower];
        }

        let fraction = index - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
    }

    /// Min, max, median and mean of the samples.
    pub fn details(values: &[f64]) -> MetricResultDetails {
        MetricResultDetails {
            min: Self::aggregate(values, AggregationType::Min),
            max: Self::aggregate(values, AggregationType::Max),
            median: Self::percentile(values, 50.0),
            avg: Self::aggregate(values, AggregationType::Average),
        }
    }
}

/// Applies the threshold operator to `value` against `pass_value`.
pub fn check_threshold(value: f64, thresholds: &MetricThresholds) -> bool {
    let target = thresholds.pass_value;
    match thresholds.operator {
        ThresholdOperator::GreaterThan => value > target,
        ThresholdOperator::GreaterOrEqual => value >= target,
        ThresholdOperator::LessThan => value < target,
        ThresholdOperator::LessOrEqual => value <= target,
        ThresholdOperator::Equal => (value - target).abs() < EQUALITY_TOLERANCE,
        ThresholdOperator::NotEqual => (value - target).abs() >= EQUALITY_TOLERANCE,
    }
}
