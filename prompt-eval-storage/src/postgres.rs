use anyhow::Result;
use async_trait::async_trait;
use prompt_eval_core::{
    CoreError, CustomMetric, CustomMetricId, CustomMetricStore, Evaluation, EvaluationId,
    EvaluationMetrics, EvaluationRepository, ListOptions, ListOrder, OptimizationSuggestion,
    ProjectId, TestCase,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::time::Duration;

/// Configuration for PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout_seconds: 5,
            idle_timeout_seconds: 600,  // 10 minutes
            max_lifetime_seconds: 1800, // 30 minutes
        }
    }
}

impl PostgresConfig {
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }
}

/// Create a PostgreSQL connection pool with default settings
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let config = PostgresConfig::new(database_url.to_string());
    create_pool_with_config(&config).await
}

/// Create a PostgreSQL connection pool with custom configuration
pub async fn create_pool_with_config(config: &PostgresConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_seconds)))
        .max_lifetime(Some(Duration::from_secs(config.max_lifetime_seconds)))
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        "PostgreSQL connection pool created (max: {}, min: {})",
        config.max_connections,
        config.min_connections
    );

    Ok(pool)
}

/// Run database migrations
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Health check for database connection
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await?;

    tracing::debug!("Database health check passed");
    Ok(())
}

// ===== Evaluation Repository =====

/// Evaluations stored as JSONB documents next to the columns used for
/// filtering and ordering. Test cases, metrics and suggestions live in their
/// own tables keyed by evaluation id.
#[derive(Debug, Clone)]
pub struct PgEvaluationRepository {
    pool: PgPool,
}

impl PgEvaluationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn enum_text<T: Serialize>(value: &T) -> prompt_eval_core::Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(CoreError::Serialization(format!("expected string enum, got {}", other))),
    }
}

fn enum_from_text<T: DeserializeOwned>(text: String) -> prompt_eval_core::Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(text))?)
}

/// Maps constraint violations onto domain errors.
fn write_error(err: sqlx::Error, what: impl std::fmt::Display) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return CoreError::AlreadyExists(what.to_string());
        }
        if db.is_foreign_key_violation() {
            return CoreError::NotFound(what.to_string());
        }
    }
    CoreError::from(err)
}

fn order_column(order: ListOrder) -> &'static str {
    match order {
        ListOrder::CreatedAt => "created_at",
        ListOrder::UpdatedAt => "updated_at",
        ListOrder::Progress => "progress",
    }
}

#[async_trait]
impl EvaluationRepository for PgEvaluationRepository {
    async fn create_evaluation(&self, evaluation: &Evaluation) -> prompt_eval_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evaluations (
                id, project_id, name, description, status, progress, document,
                started_at, completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(evaluation.id.0)
        .bind(evaluation.project_id.0)
        .bind(&evaluation.name)
        .bind(&evaluation.description)
        .bind(evaluation.status.as_str())
        .bind(evaluation.progress)
        .bind(Json(evaluation))
        .bind(evaluation.started_at)
        .bind(evaluation.completed_at)
        .bind(evaluation.created_at)
        .bind(evaluation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, format!("evaluation {}", evaluation.id)))?;

        Ok(())
    }

    async fn get_evaluation(&self, id: EvaluationId) -> prompt_eval_core::Result<Evaluation> {
        let row: Option<(Json<Evaluation>,)> =
            sqlx::query_as("SELECT document FROM evaluations WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(Json(evaluation),)| evaluation)
            .ok_or_else(|| CoreError::NotFound(format!("evaluation {}", id)))
    }

    async fn update_evaluation(&self, evaluation: &Evaluation) -> prompt_eval_core::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE evaluations
            SET name = $2, description = $3, status = $4, progress = $5, document = $6,
                started_at = $7, completed_at = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(evaluation.id.0)
        .bind(&evaluation.name)
        .bind(&evaluation.description)
        .bind(evaluation.status.as_str())
        .bind(evaluation.progress)
        .bind(Json(evaluation))
        .bind(evaluation.started_at)
        .bind(evaluation.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("evaluation {}", evaluation.id)));
        }
        Ok(())
    }

    async fn delete_evaluation(&self, id: EvaluationId) -> prompt_eval_core::Result<()> {
        let result = sqlx::query("DELETE FROM evaluations WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("evaluation {}", id)));
        }
        Ok(())
    }

    async fn list_evaluations(
        &self,
        project_id: ProjectId,
        options: &ListOptions,
    ) -> prompt_eval_core::Result<Vec<Evaluation>> {
        // Column and direction come from closed enums, never from input text.
        let query = format!(
            r#"
            SELECT document FROM evaluations
            WHERE project_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY {} {}
            LIMIT $3 OFFSET $4
            "#,
            order_column(options.order_by),
            if options.sort_desc { "DESC" } else { "ASC" }
        );

        let rows: Vec<(Json<Evaluation>,)> = sqlx::query_as(&query)
            .bind(project_id.0)
            .bind(options.status.map(|s| s.as_str()))
            .bind(options.limit as i64)
            .bind(options.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(Json(evaluation),)| evaluation).collect())
    }

    async fn save_test_cases(
        &self,
        evaluation_id: EvaluationId,
        test_cases: &[TestCase],
    ) -> prompt_eval_core::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM evaluation_test_cases WHERE evaluation_id = $1")
            .bind(evaluation_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, test_case) in test_cases.iter().enumerate() {
            let mut stored = test_case.clone();
            stored.evaluation_id = Some(evaluation_id);

            sqlx::query(
                r#"
                INSERT INTO evaluation_test_cases (id, evaluation_id, position, category, status, score, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(stored.id.0)
            .bind(evaluation_id.0)
            .bind(position as i32)
            .bind(stored.category.as_str())
            .bind(stored.status.as_str())
            .bind(stored.score)
            .bind(Json(&stored))
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, format!("evaluation {}", evaluation_id)))?;
        }

        tx.commit().await?;
        tracing::debug!("Saved {} test cases for evaluation {}", test_cases.len(), evaluation_id);
        Ok(())
    }

    async fn get_test_cases(&self, evaluation_id: EvaluationId) -> prompt_eval_core::Result<Vec<TestCase>> {
        let rows: Vec<(Json<TestCase>,)> = sqlx::query_as(
            "SELECT document FROM evaluation_test_cases WHERE evaluation_id = $1 ORDER BY position",
        )
        .bind(evaluation_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(tc),)| tc).collect())
    }

    async fn update_test_case(
        &self,
        evaluation_id: EvaluationId,
        test_case: &TestCase,
    ) -> prompt_eval_core::Result<()> {
        let mut stored = test_case.clone();
        stored.evaluation_id = Some(evaluation_id);

        let result = sqlx::query(
            r#"
            UPDATE evaluation_test_cases
            SET status = $3, score = $4, document = $5
            WHERE id = $1 AND evaluation_id = $2
            "#,
        )
        .bind(stored.id.0)
        .bind(evaluation_id.0)
        .bind(stored.status.as_str())
        .bind(stored.score)
        .bind(Json(&stored))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("test case {}", test_case.id)));
        }
        Ok(())
    }

    async fn save_metrics(
        &self,
        evaluation_id: EvaluationId,
        metrics: &EvaluationMetrics,
    ) -> prompt_eval_core::Result<()> {
        let mut stored = metrics.clone();
        stored.evaluation_id = Some(evaluation_id);

        sqlx::query(
            r#"
            INSERT INTO evaluation_metrics (evaluation_id, overall_score, pass_rate, document, calculated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (evaluation_id) DO UPDATE
            SET overall_score = EXCLUDED.overall_score,
                pass_rate = EXCLUDED.pass_rate,
                document = EXCLUDED.document,
                calculated_at = EXCLUDED.calculated_at
            "#,
        )
        .bind(evaluation_id.0)
        .bind(stored.overall_score)
        .bind(stored.pass_rate)
        .bind(Json(&stored))
        .bind(stored.calculated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, format!("evaluation {}", evaluation_id)))?;

        Ok(())
    }

    async fn get_metrics(
        &self,
        evaluation_id: EvaluationId,
    ) -> prompt_eval_core::Result<Option<EvaluationMetrics>> {
        let row: Option<(Json<EvaluationMetrics>,)> =
            sqlx::query_as("SELECT document FROM evaluation_metrics WHERE evaluation_id = $1")
                .bind(evaluation_id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(metrics),)| metrics))
    }

    async fn save_suggestions(
        &self,
        evaluation_id: EvaluationId,
        suggestions: &[OptimizationSuggestion],
    ) -> prompt_eval_core::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM optimization_suggestions WHERE evaluation_id = $1")
            .bind(evaluation_id.0)
            .execute(&mut *tx)
            .await?;

        for (position, suggestion) in suggestions.iter().enumerate() {
            let mut stored = suggestion.clone();
            stored.evaluation_id = Some(evaluation_id);

            sqlx::query(
                r#"
                INSERT INTO optimization_suggestions (id, evaluation_id, position, type, priority, document)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(stored.id.0)
            .bind(evaluation_id.0)
            .bind(position as i32)
            .bind(enum_text(&stored.kind)?)
            .bind(enum_text(&stored.priority)?)
            .bind(Json(&stored))
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, format!("evaluation {}", evaluation_id)))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_suggestions(
        &self,
        evaluation_id: EvaluationId,
    ) -> prompt_eval_core::Result<Vec<OptimizationSuggestion>> {
        let rows: Vec<(Json<OptimizationSuggestion>,)> = sqlx::query_as(
            "SELECT document FROM optimization_suggestions WHERE evaluation_id = $1 ORDER BY position",
        )
        .bind(evaluation_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(s),)| s).collect())
    }
}

// ===== Custom Metric Store =====

#[derive(Debug, Clone)]
pub struct PgCustomMetricStore {
    pool: PgPool,
}

impl PgCustomMetricStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CustomMetricRow {
    id: i64,
    project_id: i64,
    name: String,
    description: String,
    #[sqlx(rename = "type")]
    metric_type: String,
    aggregation: String,
    formula: Option<String>,
    thresholds: Json<prompt_eval_core::MetricThresholds>,
    weight: f64,
    enabled: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<CustomMetricRow> for CustomMetric {
    type Error = CoreError;

    fn try_from(row: CustomMetricRow) -> prompt_eval_core::Result<Self> {
        Ok(CustomMetric {
            id: CustomMetricId(row.id),
            project_id: ProjectId(row.project_id),
            name: row.name,
            description: row.description,
            metric_type: enum_from_text(row.metric_type)?,
            aggregation: enum_from_text(row.aggregation)?,
            formula: row.formula,
            thresholds: row.thresholds.0,
            weight: row.weight,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CUSTOM_METRIC_COLUMNS: &str = "id, project_id, name, description, type, aggregation, formula, \
     thresholds, weight, enabled, created_at, updated_at";

#[async_trait]
impl CustomMetricStore for PgCustomMetricStore {
    async fn enabled_metrics(&self, project_id: ProjectId) -> prompt_eval_core::Result<Vec<CustomMetric>> {
        let query = format!(
            "SELECT {} FROM custom_metrics WHERE project_id = $1 AND enabled = TRUE ORDER BY id",
            CUSTOM_METRIC_COLUMNS
        );
        let rows: Vec<CustomMetricRow> = sqlx::query_as(&query)
            .bind(project_id.0)
            .fetch_all(&self.pool)
            .await?;

        // A row that no longer decodes is skipped rather than hiding the rest.
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                CustomMetric::try_from(row)
                    .map_err(|e| tracing::warn!("Skipping custom metric {}: {}", id, e))
                    .ok()
            })
            .collect())
    }

    async fn save_metric(&self, metric: &CustomMetric) -> prompt_eval_core::Result<CustomMetric> {
        let row: CustomMetricRow = if metric.id.0 == 0 {
            let query = format!(
                r#"
                INSERT INTO custom_metrics
                    (project_id, name, description, type, aggregation, formula, thresholds, weight, enabled)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {}
                "#,
                CUSTOM_METRIC_COLUMNS
            );
            sqlx::query_as(&query)
                .bind(metric.project_id.0)
                .bind(&metric.name)
                .bind(&metric.description)
                .bind(enum_text(&metric.metric_type)?)
                .bind(enum_text(&metric.aggregation)?)
                .bind(&metric.formula)
                .bind(Json(&metric.thresholds))
                .bind(metric.weight)
                .bind(metric.enabled)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| write_error(e, format!("custom metric {}", metric.name)))?
        } else {
            let query = format!(
                r#"
                UPDATE custom_metrics
                SET name = $3, description = $4, type = $5, aggregation = $6, formula = $7,
                    thresholds = $8, weight = $9, enabled = $10, updated_at = NOW()
                WHERE id = $1 AND project_id = $2
                RETURNING {}
                "#,
                CUSTOM_METRIC_COLUMNS
            );
            sqlx::query_as(&query)
                .bind(metric.id.0)
                .bind(metric.project_id.0)
                .bind(&metric.name)
                .bind(&metric.description)
                .bind(enum_text(&metric.metric_type)?)
                .bind(enum_text(&metric.aggregation)?)
                .bind(&metric.formula)
                .bind(Json(&metric.thresholds))
                .bind(metric.weight)
                .bind(metric.enabled)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| write_error(e, format!("custom metric {}", metric.name)))?
                .ok_or_else(|| CoreError::NotFound(format!("custom metric {}", metric.id)))?
        };

        CustomMetric::try_from(row)
    }

    async fn delete_metric(
        &self,
        project_id: ProjectId,
        metric_id: CustomMetricId,
    ) -> prompt_eval_core::Result<()> {
        let result = sqlx::query("DELETE FROM custom_metrics WHERE id = $1 AND project_id = $2")
            .bind(metric_id.0)
            .bind(project_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("custom metric {}", metric_id)));
        }
        Ok(())
    }
}
