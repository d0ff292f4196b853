use async_trait::async_trait;
use prompt_eval_core::{CoreError, GenerationMetrics, MetricCalculator, Result};
use serde::{Deserialize, Serialize};

use super::text;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationInput {
    pub predictions: Vec<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationCalculator;

impl GenerationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Averages the text-similarity figures over prediction/reference pairs.
    pub fn compute(&self, predictions: &[String], references: &[String]) -> Result<GenerationMetrics> {
        if predictions.len() != references.len() {
            return Err(CoreError::Validation(format!(
                "predictions and references must have same length: {} vs {}",
                predictions.len(),
                references.len()
            )));
        }

        if predictions.is_empty() {
            return Err(CoreError::Validation("no predictions provided".to_string()));
        }

        let mean = |f: fn(&str, &str) -> f64| pair_mean(predictions, references, f);
        let rouge_1 = mean(|p, r| text::rouge_n(p, r, 1));

        Ok(GenerationMetrics {
            bleu: mean(text::bleu),
            rouge_1,
            rouge_2: mean(|p, r| text::rouge_n(p, r, 2)),
            rouge_l: mean(text::rouge_l),
            bert_score: rouge_1,
            perplexity: (100.0 - rouge_1 * 100.0).max(1.0),
            diversity: mean(|p, _| text::lexical_diversity(p)),
            coherence: mean(|p, _| text::coherence(p)),
            relevance: mean(text::relevance),
        })
    }
}

fn pair_mean(predictions: &[String], references: &[String], f: fn(&str, &str) -> f64) -> f64 {
    let sum: f64 = predictions
        .iter()
        .zip(references.iter())
        .map(|(p, r)| f(p, r))
        .sum();
    sum / predictions.len() as f64
}

#[async_trait]
impl MetricCalculator for GenerationCalculator {
    type Input = GenerationInput;
    type Output = GenerationMetrics;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        self.compute(&input.predictions, &input.references)
    }
}
