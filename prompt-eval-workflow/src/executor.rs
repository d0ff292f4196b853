use async_trait::async_trait;
use futures::future::join_all;
use prompt_eval_core::{
    extract_field, extract_label, ExecutionMode, ExecutorOptions, JsonObject, PromptRunner, Result,
    TestCase, TestCaseStatus, TestExecutor, TEXT_FIELDS,
};
use prompt_eval_metrics::calculators::text::rouge_l;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

/// Score at or above which an executed case passes.
pub const PASS_THRESHOLD: f64 = 0.7;

/// Upper bound on the delay between two attempts of one case.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Runs test cases through a [`PromptRunner`] with bounded concurrency, a
/// per-case timeout and retries with exponential backoff.
///
/// Cases keep their input order. A case whose runner keeps failing is
/// recorded with status `error` and score 0 instead of failing the batch.
pub struct ConcurrentTestExecutor {
    runner: Arc<dyn PromptRunner>,
    retry_backoff: Duration,
}

impl ConcurrentTestExecutor {
    pub fn new(runner: Arc<dyn PromptRunner>) -> Self {
        Self {
            runner,
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// Base delay before the first retry; doubled on each further attempt.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// `retry_backoff * 2^attempt`, capped at [`MAX_RETRY_BACKOFF`].
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.retry_backoff.checked_mul(factor))
            .map_or(MAX_RETRY_BACKOFF, |delay| delay.min(MAX_RETRY_BACKOFF))
    }

    async fn execute_one(
        &self,
        mut test_case: TestCase,
        prompt: &str,
        options: &ExecutorOptions,
    ) -> TestCase {
        let timeout = Duration::from_secs(options.timeout_seconds);
        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..=options.retry_count {
            match tokio::time::timeout(timeout, self.runner.run(prompt, &test_case.input)).await {
                Ok(Ok(output)) => {
                    let score = score_output(&test_case.expected_output, &output);
                    let status = if score >= PASS_THRESHOLD {
                        TestCaseStatus::Passed
                    } else {
                        TestCaseStatus::Failed
                    };
                    test_case.record_result(output, status, score, ExecutionMode::Executed);
                    test_case.duration_ms = Some(start.elapsed().as_millis() as u64);
                    return test_case;
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {}s", options.timeout_seconds),
            }

            if attempt < options.retry_count {
                tracing::warn!(
                    "Test case {} attempt {} failed, retrying: {}",
                    test_case.id,
                    attempt + 1,
                    last_error
                );
                sleep(self.backoff_delay(attempt)).await;
            }
        }

        tracing::warn!("Test case {} errored: {}", test_case.id, last_error);
        let mut output = JsonObject::new();
        output.insert("error".to_string(), Value::String(last_error));
        test_case.record_result(output, TestCaseStatus::Error, 0.0, ExecutionMode::Executed);
        test_case.duration_ms = Some(start.elapsed().as_millis() as u64);
        test_case
    }
}

impl std::fmt::Debug for ConcurrentTestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentTestExecutor")
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TestExecutor for ConcurrentTestExecutor {
    async fn execute_test_cases(
        &self,
        test_cases: Vec<TestCase>,
        prompt: &str,
        options: &ExecutorOptions,
    ) -> Result<Vec<TestCase>> {
        let semaphore = Semaphore::new(options.max_concurrency.max(1));
        let total = test_cases.len();

        let executed = join_all(test_cases.into_iter().map(|test_case| {
            let semaphore = &semaphore;
            async move {
                // The semaphore is never closed, so acquire only fails after drop.
                let _permit = semaphore.acquire().await;
                self.execute_one(test_case, prompt, options).await
            }
        }))
        .await;

        let passed = executed.iter().filter(|tc| tc.is_passed()).count();
        tracing::info!("Executed {} test cases, {} passed", total, passed);
        Ok(executed)
    }
}

/// Normalized label match when the expected output names a class, ROUGE-L over
/// the text fields otherwise, JSON equality as a last resort.
pub fn score_output(expected: &JsonObject, actual: &JsonObject) -> f64 {
    if expected.is_empty() {
        return if actual.is_empty() { 0.0 } else { 1.0 };
    }

    if let Some(expected_class) = extract_label(expected) {
        let matches = extract_label(actual).is_some_and(|actual_class| actual_class == expected_class);
        return if matches { 1.0 } else { 0.0 };
    }

    if let Some(reference) = extract_field(expected, &TEXT_FIELDS) {
        return extract_field(actual, &TEXT_FIELDS)
            .map(|prediction| rouge_l(&prediction, &reference))
            .unwrap_or(0.0);
    }

    if expected == actual {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    struct EchoRunner;

    #[async_trait]
    impl PromptRunner for EchoRunner {
        async fn run(&self, _prompt: &str, input: &JsonObject) -> Result<JsonObject> {
            Ok(input.clone())
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_saturates() {
        let executor = ConcurrentTestExecutor::new(Arc::new(EchoRunner))
            .with_retry_backoff(Duration::from_millis(100));
        assert_eq!(executor.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(executor.backoff_delay(3), Duration::from_millis(800));
        assert_eq!(executor.backoff_delay(20), MAX_RETRY_BACKOFF);
        assert_eq!(executor.backoff_delay(32), MAX_RETRY_BACKOFF);
        assert_eq!(executor.backoff_delay(u32::MAX), MAX_RETRY_BACKOFF);
    }

    #[test]
    fn test_score_classification_output() {
        let expected = object(json!({"class": "positive"}));
        assert_eq!(score_output(&expected, &object(json!({"label": "Positive "}))), 1.0);
        assert_eq!(score_output(&expected, &object(json!({"class": "negative"}))), 0.0);
        assert_eq!(score_output(&expected, &object(json!({"text": "positive"}))), 0.0);
    }

    #[test]
    fn test_score_text_output() {
        let expected = object(json!({"summary": "the cat sat"}));
        let actual = object(json!({"text": "the cat sat"}));
        assert_eq!(score_output(&expected, &actual), 1.0);
    }

    #[test]
    fn test_score_structured_output() {
        let expected = object(json!({"entities": ["Paris"]}));
        assert_eq!(score_output(&expected, &expected.clone()), 1.0);
        assert_eq!(score_output(&expected, &object(json!({"entities": []}))), 0.0);
    }
}
