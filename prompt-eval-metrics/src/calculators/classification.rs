use async_trait::async_trait;
use prompt_eval_core::{ClassificationMetrics, CoreError, MetricCalculator, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationInput {
    pub predictions: Vec<String>,
    pub ground_truth: Vec<String>,
    /// Label set from the prompt schema; observed labels are added to it.
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationCalculator;

impl ClassificationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Builds the confusion matrix and per-class precision, recall and F1.
    ///
    /// The class set is the supplied classes plus every observed label, so the
    /// matrix always accounts for every pair.
    pub fn compute(
        &self,
        predictions: &[String],
        ground_truth: &[String],
        classes: &[String],
    ) -> Result<ClassificationMetrics> {
        if predictions.len() != ground_truth.len() {
            return Err(CoreError::Validation(format!(
                "predictions and ground truth must have same length: {} vs {}",
                predictions.len(),
                ground_truth.len()
            )));
        }

        if predictions.is_empty() {
            return Err(CoreError::Validation("no predictions provided".to_string()));
        }

        let class_set: BTreeSet<&str> = classes
            .iter()
            .chain(predictions.iter())
            .chain(ground_truth.iter())
            .map(String::as_str)
            .collect();

        let mut confusion_matrix: BTreeMap<String, BTreeMap<String, u64>> = class_set
            .iter()
            .map(|truth| {
                let row = class_set.iter().map(|pred| (pred.to_string(), 0)).collect();
                (truth.to_string(), row)
            })
            .collect();

        let mut correct = 0u64;
        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            if let Some(cell) = confusion_matrix
                .get_mut(truth)
                .and_then(|row| row.get_mut(pred))
            {
                *cell += 1;
            }
            if pred == truth {
                correct += 1;
            }
        }

        let mut metrics = ClassificationMetrics {
            accuracy: correct as f64 / predictions.len() as f64,
            ..Default::default()
        };

        let mut f1_sum = 0.0;
        let mut weighted_f1_sum = 0.0;
        let mut total_support = 0u64;

        for class in &class_set {
            let row = &confusion_matrix[*class];
            let tp = row.get(*class).copied().unwrap_or(0);
            let row_sum: u64 = row.values().sum();
            let column_sum: u64 = confusion_matrix
                .values()
                .map(|r| r.get(*class).copied().unwrap_or(0))
                .sum();

            let fp = column_sum - tp;
            let fn_ = row_sum - tp;

            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            metrics.precision.insert(class.to_string(), precision);
            metrics.recall.insert(class.to_string(), recall);
            metrics.f1_score.insert(class.to_string(), f1);
            metrics.support.insert(class.to_string(), row_sum);

            f1_sum += f1;
            weighted_f1_sum += f1 * row_sum as f64;
            total_support += row_sum;
        }

        if !class_set.is_empty() {
            metrics.macro_f1 = f1_sum / class_set.len() as f64;
        }
        if total_support > 0 {
            metrics.weighted_f1 = weighted_f1_sum / total_support as f64;
        }

        metrics.confusion_matrix = confusion_matrix;
        Ok(metrics)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[async_trait]
impl MetricCalculator for ClassificationCalculator {
    type Input = ClassificationInput;
    type Output = ClassificationMetrics;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        self.compute(&input.predictions, &input.ground_truth, &input.classes)
    }
}
