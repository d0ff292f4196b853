mod common;

use common::*;
use pretty_assertions::assert_eq;
use prompt_eval_core::domain::{EvaluationId, EvaluationStatus, ListOptions, ListOrder, ProjectId};
use prompt_eval_core::{CoreError, CustomMetricStore, EvaluationRepository};
use prompt_eval_storage::{InMemoryCustomMetricStore, InMemoryEvaluationRepository};
use rstest::rstest;

// ===== Evaluation CRUD =====

#[tokio::test]
async fn test_create_and_get_evaluation() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);

    repo.create_evaluation(&evaluation).await.unwrap();
    let stored = repo.get_evaluation(evaluation.id).await.unwrap();

    assert_eq!(stored, evaluation);
}

#[tokio::test]
async fn test_create_duplicate_fails() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);

    repo.create_evaluation(&evaluation).await.unwrap();
    let err = repo.create_evaluation(&evaluation).await.unwrap_err();

    assert!(matches!(err, CoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_get_unknown_evaluation() {
    let repo = InMemoryEvaluationRepository::new();
    let err = repo.get_evaluation(EvaluationId::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_update_evaluation() {
    let repo = InMemoryEvaluationRepository::new();
    let mut evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();

    evaluation.start().unwrap();
    evaluation.advance_progress(20.0);
    repo.update_evaluation(&evaluation).await.unwrap();

    let stored = repo.get_evaluation(evaluation.id).await.unwrap();
    assert_eq!(stored.status, EvaluationStatus::Running);
    assert_eq!(stored.progress, 20.0);
}

#[tokio::test]
async fn test_update_unknown_evaluation() {
    let repo = InMemoryEvaluationRepository::new();
    let err = repo
        .update_evaluation(&create_test_evaluation(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_removes_artifacts() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();
    repo.save_test_cases(evaluation.id, &create_test_cases(3)).await.unwrap();
    repo.save_metrics(evaluation.id, &create_test_metrics(0.9)).await.unwrap();

    repo.delete_evaluation(evaluation.id).await.unwrap();

    assert!(repo.get_evaluation(evaluation.id).await.is_err());
    assert!(repo.get_test_cases(evaluation.id).await.unwrap().is_empty());
    assert!(repo.get_metrics(evaluation.id).await.unwrap().is_none());
    assert!(repo.delete_evaluation(evaluation.id).await.is_err());
}

// ===== Listing =====

#[tokio::test]
async fn test_list_filters_by_project_and_status() {
    let repo = InMemoryEvaluationRepository::new();
    let first = create_test_evaluation(1);
    let mut second = create_test_evaluation(1);
    second.start().unwrap();
    let other = create_test_evaluation(2);

    for evaluation in [&first, &second, &other] {
        repo.create_evaluation(evaluation).await.unwrap();
    }

    let all = repo
        .list_evaluations(ProjectId(1), &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let running = repo
        .list_evaluations(
            ProjectId(1),
            &ListOptions {
                status: Some(EvaluationStatus::Running),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, second.id);
}

#[rstest]
#[case(true, vec![75.0, 50.0, 25.0])]
#[case(false, vec![25.0, 50.0, 75.0])]
#[tokio::test]
async fn test_list_orders_by_progress(#[case] sort_desc: bool, #[case] expected: Vec<f64>) {
    let repo = InMemoryEvaluationRepository::new();
    for progress in [50.0, 25.0, 75.0] {
        let mut evaluation = create_test_evaluation(1);
        evaluation.advance_progress(progress);
        repo.create_evaluation(&evaluation).await.unwrap();
    }

    let listed = repo
        .list_evaluations(
            ProjectId(1),
            &ListOptions {
                order_by: ListOrder::Progress,
                sort_desc,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let progress: Vec<f64> = listed.iter().map(|e| e.progress).collect();
    assert_eq!(progress, expected);
}

#[tokio::test]
async fn test_list_pagination() {
    let repo = InMemoryEvaluationRepository::new();
    for _ in 0..5 {
        repo.create_evaluation(&create_test_evaluation(1)).await.unwrap();
    }

    let page = repo
        .list_evaluations(
            ProjectId(1),
            &ListOptions {
                limit: 2,
                offset: 4,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
}

// ===== Artifacts =====

#[tokio::test]
async fn test_save_test_cases_sets_evaluation_id() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();

    repo.save_test_cases(evaluation.id, &create_test_cases(4)).await.unwrap();
    let stored = repo.get_test_cases(evaluation.id).await.unwrap();

    assert_eq!(stored.len(), 4);
    assert!(stored.iter().all(|tc| tc.evaluation_id == Some(evaluation.id)));
}

#[tokio::test]
async fn test_save_test_cases_requires_evaluation() {
    let repo = InMemoryEvaluationRepository::new();
    let err = repo
        .save_test_cases(EvaluationId::new(), &create_test_cases(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn test_update_test_case() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();
    let mut cases = create_test_cases(2);
    repo.save_test_cases(evaluation.id, &cases).await.unwrap();

    cases[1].set_score(0.4);
    repo.update_test_case(evaluation.id, &cases[1]).await.unwrap();

    let stored = repo.get_test_cases(evaluation.id).await.unwrap();
    assert_eq!(stored[1].score, 0.4);
    assert_eq!(stored[0].score, 0.0);

    let unknown = create_test_cases(1).remove(0);
    assert!(repo.update_test_case(evaluation.id, &unknown).await.is_err());
}

#[tokio::test]
async fn test_save_metrics_upserts() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();

    repo.save_metrics(evaluation.id, &create_test_metrics(0.5)).await.unwrap();
    repo.save_metrics(evaluation.id, &create_test_metrics(0.9)).await.unwrap();

    let metrics = repo.get_metrics(evaluation.id).await.unwrap().unwrap();
    assert_eq!(metrics.overall_score, 0.9);
    assert_eq!(metrics.evaluation_id, Some(evaluation.id));
}

#[tokio::test]
async fn test_save_suggestions_replaces_previous_run() {
    let repo = InMemoryEvaluationRepository::new();
    let evaluation = create_test_evaluation(1);
    repo.create_evaluation(&evaluation).await.unwrap();

    repo.save_suggestions(evaluation.id, &[create_test_suggestion(), create_test_suggestion()])
        .await
        .unwrap();
    repo.save_suggestions(evaluation.id, &[create_test_suggestion()])
        .await
        .unwrap();

    assert_eq!(repo.get_suggestions(evaluation.id).await.unwrap().len(), 1);
}

// ===== Custom Metric Store =====

#[tokio::test]
async fn test_custom_metric_store_assigns_ids() {
    let store = InMemoryCustomMetricStore::new();

    let first = store.save_metric(&create_test_metric(1, "accuracy")).await.unwrap();
    let second = store.save_metric(&create_test_metric(1, "latency")).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(store.enabled_metrics(ProjectId(1)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_metric_store_hides_disabled() {
    let store = InMemoryCustomMetricStore::new();
    let saved = store.save_metric(&create_test_metric(1, "accuracy")).await.unwrap();

    store.save_metric(&saved.clone().disabled()).await.unwrap();

    assert!(store.enabled_metrics(ProjectId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_metric_store_delete_is_project_scoped() {
    let store = InMemoryCustomMetricStore::new();
    let saved = store.save_metric(&create_test_metric(1, "accuracy")).await.unwrap();

    assert!(store.delete_metric(ProjectId(2), saved.id).await.is_err());
    store.delete_metric(ProjectId(1), saved.id).await.unwrap();
    assert!(store.enabled_metrics(ProjectId(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_metric_store_rejects_duplicate_names() {
    let store = InMemoryCustomMetricStore::new();
    let saved = store.save_metric(&create_test_metric(1, "accuracy")).await.unwrap();

    let duplicate = store.save_metric(&create_test_metric(1, "accuracy")).await;
    assert!(matches!(duplicate, Err(CoreError::AlreadyExists(_))));

    let mut renamed = store.save_metric(&create_test_metric(1, "latency")).await.unwrap();
    renamed.name = "accuracy".to_string();
    assert!(matches!(
        store.save_metric(&renamed).await,
        Err(CoreError::AlreadyExists(_))
    ));

    // Same name in another project is fine, as is re-saving the same metric.
    store.save_metric(&create_test_metric(2, "accuracy")).await.unwrap();
    store.save_metric(&saved).await.unwrap();
    assert_eq!(store.enabled_metrics(ProjectId(1)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_metric_store_update_is_project_scoped() {
    let store = InMemoryCustomMetricStore::new();
    let saved = store.save_metric(&create_test_metric(1, "accuracy")).await.unwrap();

    let mut moved = saved.clone();
    moved.project_id = ProjectId(2);
    assert!(matches!(
        store.save_metric(&moved).await,
        Err(CoreError::NotFound(_))
    ));

    assert!(store.enabled_metrics(ProjectId(2)).await.unwrap().is_empty());
    assert_eq!(store.enabled_metrics(ProjectId(1)).await.unwrap()[0].project_id, ProjectId(1));
}
