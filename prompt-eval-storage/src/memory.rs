//! In-process repositories used when no database is configured and in tests.

use async_trait::async_trait;
use chrono::Utc;
use prompt_eval_core::{
    CoreError, CustomMetric, CustomMetricId, CustomMetricStore, Evaluation, EvaluationId,
    EvaluationMetrics, EvaluationRepository, ListOptions, ListOrder, OptimizationSuggestion,
    ProjectId, Result, TestCase,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryEvaluationRepository {
    evaluations: RwLock<HashMap<EvaluationId, Evaluation>>,
    test_cases: RwLock<HashMap<EvaluationId, Vec<TestCase>>>,
    metrics: RwLock<HashMap<EvaluationId, EvaluationMetrics>>,
    suggestions: RwLock<HashMap<EvaluationId, Vec<OptimizationSuggestion>>>,
}

impl InMemoryEvaluationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_exists(&self, id: EvaluationId) -> Result<()> {
        if self.evaluations.read().await.contains_key(&id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }
}

fn not_found(id: EvaluationId) -> CoreError {
    CoreError::NotFound(format!("evaluation {}", id))
}

#[async_trait]
impl EvaluationRepository for InMemoryEvaluationRepository {
    async fn create_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let mut evaluations = self.evaluations.write().await;
        if evaluations.contains_key(&evaluation.id) {
            return Err(CoreError::AlreadyExists(format!("evaluation {}", evaluation.id)));
        }
        evaluations.insert(evaluation.id, evaluation.clone());
        Ok(())
    }

    async fn get_evaluation(&self, id: EvaluationId) -> Result<Evaluation> {
        self.evaluations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn update_evaluation(&self, evaluation: &Evaluation) -> Result<()> {
        let mut evaluations = self.evaluations.write().await;
        let stored = evaluations
            .get_mut(&evaluation.id)
            .ok_or_else(|| not_found(evaluation.id))?;
        *stored = evaluation.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> Result<()> {
        if self.evaluations.write().await.remove(&id).is_none() {
            return Err(not_found(id));
        }
        self.test_cases.write().await.remove(&id);
        self.metrics.write().await.remove(&id);
        self.suggestions.write().await.remove(&id);
        Ok(())
    }

    async fn list_evaluations(
        &self,
        project_id: ProjectId,
        options: &ListOptions,
    ) -> Result<Vec<Evaluation>> {
        let evaluations = self.evaluations.read().await;
        let mut matching: Vec<Evaluation> = evaluations
            .values()
            .filter(|e| e.project_id == project_id)
            .filter(|e| options.status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match options.order_by {
                ListOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                ListOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                ListOrder::Progress => a.progress.total_cmp(&b.progress),
            };
            if options.sort_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(matching
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }

    async fn save_test_cases(&self, evaluation_id: EvaluationId, test_cases: &[TestCase]) -> Result<()> {
        self.ensure_exists(evaluation_id).await?;

        let stored = test_cases
            .iter()
            .cloned()
            .map(|mut tc| {
                tc.evaluation_id = Some(evaluation_id);
                tc
            })
            .collect();
        self.test_cases.write().await.insert(evaluation_id, stored);
        Ok(())
    }

    async fn get_test_cases(&self, evaluation_id: EvaluationId) -> Result<Vec<TestCase>> {
        Ok(self
            .test_cases
            .read()
            .await
            .get(&evaluation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_test_case(&self, evaluation_id: EvaluationId, test_case: &TestCase) -> Result<()> {
        let mut test_cases = self.test_cases.write().await;
        let stored = test_cases
            .get_mut(&evaluation_id)
            .and_then(|cases| cases.iter_mut().find(|tc| tc.id == test_case.id))
            .ok_or_else(|| CoreError::NotFound(format!("test case {}", test_case.id)))?;

        *stored = test_case.clone();
        stored.evaluation_id = Some(evaluation_id);
        Ok(())
    }

    async fn save_metrics(&self, evaluation_id: EvaluationId, metrics: &EvaluationMetrics) -> Result<()> {
        self.ensure_exists(evaluation_id).await?;

        let mut stored = metrics.clone();
        stored.evaluation_id = Some(evaluation_id);
        self.metrics.write().await.insert(evaluation_id, stored);
        Ok(())
    }

    async fn get_metrics(&self, evaluation_id: EvaluationId) -> Result<Option<EvaluationMetrics>> {
        Ok(self.metrics.read().await.get(&evaluation_id).cloned())
    }

    async fn save_suggestions(
        &self,
        evaluation_id: EvaluationId,
        suggestions: &[OptimizationSuggestion],
    ) -> Result<()> {
        self.ensure_exists(evaluation_id).await?;

        let stored = suggestions
            .iter()
            .cloned()
            .map(|mut s| {
                s.evaluation_id = Some(evaluation_id);
                s
            })
            .collect();
        self.suggestions.write().await.insert(evaluation_id, stored);
        Ok(())
    }

    async fn get_suggestions(&self, evaluation_id: EvaluationId) -> Result<Vec<OptimizationSuggestion>> {
        Ok(self
            .suggestions
            .read()
            .await
            .get(&evaluation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug)]
pub struct InMemoryCustomMetricStore {
    metrics: RwLock<HashMap<CustomMetricId, CustomMetric>>,
    next_id: AtomicI64,
}

impl Default for InMemoryCustomMetricStore {
    fn default() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryCustomMetricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomMetricStore for InMemoryCustomMetricStore {
    async fn enabled_metrics(&self, project_id: ProjectId) -> Result<Vec<CustomMetric>> {
        let mut metrics: Vec<CustomMetric> = self
            .metrics
            .read()
            .await
            .values()
            .filter(|m| m.project_id == project_id && m.enabled)
            .cloned()
            .collect();
        metrics.sort_by_key(|m| m.id);
        Ok(metrics)
    }

    async fn save_metric(&self, metric: &CustomMetric) -> Result<CustomMetric> {
        let mut metrics = self.metrics.write().await;
        let mut saved = metric.clone();
        let now = Utc::now();

        // Names are unique within a project.
        let taken = metrics.values().any(|m| {
            m.project_id == saved.project_id && m.name == saved.name && m.id != saved.id
        });
        if taken {
            return Err(CoreError::AlreadyExists(format!("custom metric {}", saved.name)));
        }

        if saved.id.0 == 0 {
            saved.id = CustomMetricId(self.next_id.fetch_add(1, Ordering::SeqCst));
            saved.created_at = now;
        } else {
            let existing = metrics
                .get(&saved.id)
                .filter(|m| m.project_id == saved.project_id)
                .ok_or_else(|| CoreError::NotFound(format!("custom metric {}", saved.id)))?;
            saved.created_at = existing.created_at;
        }
        saved.updated_at = now;

        metrics.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn delete_metric(&self, project_id: ProjectId, metric_id: CustomMetricId) -> Result<()> {
        let mut metrics = self.metrics.write().await;
        match metrics.get(&metric_id) {
            Some(metric) if metric.project_id == project_id => {
                metrics.remove(&metric_id);
                Ok(())
            }
            _ => Err(CoreError::NotFound(format!("custom metric {}", metric_id))),
        }
    }
}
