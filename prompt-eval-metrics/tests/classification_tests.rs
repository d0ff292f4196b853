use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use prompt_eval_core::{CoreError, MetricCalculator};
use prompt_eval_metrics::{ClassificationCalculator, ClassificationInput};
use proptest::prelude::*;

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ===== Confusion Matrix Tests =====

#[test]
fn test_binary_confusion_matrix() {
    let predictions = labels(&["pos", "pos", "neg", "neg", "pos"]);
    let truth = labels(&["pos", "neg", "neg", "pos", "pos"]);

    let metrics = ClassificationCalculator::new()
        .compute(&predictions, &truth, &labels(&["pos", "neg"]))
        .unwrap();

    assert_eq!(metrics.confusion_matrix["pos"]["pos"], 2);
    assert_eq!(metrics.confusion_matrix["pos"]["neg"], 1);
    assert_eq!(metrics.confusion_matrix["neg"]["pos"], 1);
    assert_eq!(metrics.confusion_matrix["neg"]["neg"], 1);
    assert_eq!(metrics.support["pos"], 3);
    assert_eq!(metrics.support["neg"], 2);

    assert_relative_eq!(metrics.accuracy, 0.6);
    assert_relative_eq!(metrics.precision["pos"], 2.0 / 3.0);
    assert_relative_eq!(metrics.recall["pos"], 2.0 / 3.0);
    assert_relative_eq!(metrics.precision["neg"], 0.5);
    assert_relative_eq!(metrics.recall["neg"], 0.5);
}

#[test]
fn test_labels_outside_schema_are_counted() {
    let predictions = labels(&["pos", "neutral"]);
    let truth = labels(&["pos", "pos"]);

    let metrics = ClassificationCalculator::new()
        .compute(&predictions, &truth, &labels(&["pos", "neg"]))
        .unwrap();

    assert_eq!(metrics.total_cells(), 2);
    assert_eq!(metrics.confusion_matrix["pos"]["neutral"], 1);
    assert!(metrics.f1_score.contains_key("neutral"));
}

#[test]
fn test_classes_inferred_when_not_supplied() {
    let predictions = labels(&["b", "a"]);
    let truth = labels(&["a", "a"]);

    let metrics = ClassificationCalculator::new()
        .compute(&predictions, &truth, &[])
        .unwrap();

    let classes: Vec<&String> = metrics.support.keys().collect();
    assert_eq!(classes, vec!["a", "b"]);
}

#[test]
fn test_empty_input_rejected() {
    let result = ClassificationCalculator::new().compute(&[], &[], &labels(&["a"]));
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn test_metric_calculator_trait() {
    let input = ClassificationInput {
        predictions: labels(&["a", "b"]),
        ground_truth: labels(&["a", "b"]),
        classes: vec![],
    };

    let metrics = ClassificationCalculator::new().calculate(input).await.unwrap();
    assert_eq!(metrics.accuracy, 1.0);
}

// ===== Invariants =====

fn label_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from)
}

proptest! {
    #[test]
    fn test_matrix_invariants(
        pairs in proptest::collection::vec((label_strategy(), label_strategy()), 1..60),
    ) {
        let (predictions, truth): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        let metrics = ClassificationCalculator::new()
            .compute(&predictions, &truth, &labels(&["a", "b"]))
            .unwrap();

        prop_assert_eq!(metrics.total_cells(), predictions.len() as u64);

        for (class, support) in &metrics.support {
            prop_assert_eq!(*support, metrics.row_sum(class));
        }

        let macro_f1 = metrics.f1_score.values().sum::<f64>() / metrics.f1_score.len() as f64;
        prop_assert!((metrics.macro_f1 - macro_f1).abs() < 1e-9);

        let weighted: f64 = metrics
            .f1_score
            .iter()
            .map(|(class, f1)| f1 * metrics.support[class] as f64)
            .sum::<f64>() / predictions.len() as f64;
        prop_assert!((metrics.weighted_f1 - weighted).abs() < 1e-9);

        for value in metrics.precision.values().chain(metrics.recall.values()) {
            prop_assert!((0.0..=1.0).contains(value));
        }
    }
}
