//! Full-lifecycle tests: submit, poll, classify terminal outcomes.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use quarry::service::{
    FailingExecutionService, FailureKind, MockExecutionService, MockStorageService,
    MOCK_EXECUTION_ID,
};
use quarry::{
    ClientConfig, ExecutionMetadata, ExecutionStatus, QuarryError, QueryClient, QueryOptions,
    QueryRequest, RetryConfig, StatusReport, Value,
};

use super::{build_client, col0_page_with_header, col0_schema, fast_config};

#[tokio::test]
async fn select_one_succeeds_after_two_polls() {
    let execution = Arc::new(
        MockExecutionService::new()
            .with_statuses(vec![
                ExecutionStatus::Queued,
                ExecutionStatus::Running,
                ExecutionStatus::Succeeded,
            ])
            .with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let envelope = client.query("SELECT 1").await.unwrap();

    assert_eq!(envelope.execution_id, MOCK_EXECUTION_ID);
    assert_eq!(envelope.count, 1);
    let items = envelope.items.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("_col0"), Some(&Value::Int(1)));
    assert!(envelope.next_token.is_none());
    assert_eq!(execution.poll_count(), 3);
    assert_eq!(execution.submissions().len(), 1);
}

#[tokio::test]
async fn adopted_failed_execution_surfaces_reason_without_fetch() {
    let execution = Arc::new(MockExecutionService::new().with_status_reports(vec![
        StatusReport {
            status: ExecutionStatus::Failed,
            reason: Some("INSUFFICIENT_PERMISSIONS".to_string()),
            metadata: ExecutionMetadata::default(),
        },
    ]));
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let err = client
        .query("c74ff771-5a97-40a8-b2c6-1f9e9d4b7d2e")
        .await
        .unwrap_err();

    match err {
        QuarryError::ExecutionFailed {
            execution_id,
            status,
            reason,
        } => {
            assert_eq!(execution_id, "c74ff771-5a97-40a8-b2c6-1f9e9d4b7d2e");
            assert_eq!(status, ExecutionStatus::Failed);
            assert_eq!(reason, "INSUFFICIENT_PERMISSIONS");
        }
        other => panic!("expected ExecutionFailed, got {other:?}"),
    }
    // Adoption means no submission; failure means no result fetch.
    assert!(execution.submissions().is_empty());
    assert_eq!(execution.fetch_count(), 0);
}

#[tokio::test]
async fn cancelled_execution_is_a_failure_too() {
    let execution = Arc::new(
        MockExecutionService::new().with_statuses(vec![ExecutionStatus::Cancelled]),
    );
    let client = build_client(
        execution,
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let err = client.query("SELECT 1").await.unwrap_err();
    assert!(matches!(
        err,
        QuarryError::ExecutionFailed {
            status: ExecutionStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn exhausted_retry_budget_stops_polling() {
    let execution = Arc::new(
        MockExecutionService::new().with_statuses(vec![ExecutionStatus::Running]),
    );
    let config = ClientConfig::new(super::BUCKET)
        .with_retry(RetryConfig::new(1, 3).with_max_delay_ms(2));
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        config,
    );

    let err = client.query("SELECT 1").await.unwrap_err();

    match err {
        QuarryError::RetryExhausted {
            attempts,
            last_status,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, ExecutionStatus::Running);
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    // The budget bounds the polls; nothing is issued afterwards.
    assert_eq!(execution.poll_count(), 3);
    assert_eq!(execution.fetch_count(), 0);
}

#[tokio::test]
async fn transient_poll_errors_are_retried_within_budget() {
    let execution = Arc::new(
        MockExecutionService::new()
            .with_statuses(vec![ExecutionStatus::Succeeded])
            .with_transient_poll_failures(2)
            .with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let envelope = client.query("SELECT 1").await.unwrap();

    assert_eq!(envelope.count, 1);
    // Two failed polls plus the successful one.
    assert_eq!(execution.poll_count(), 3);
}

#[tokio::test]
async fn authorization_errors_surface_immediately() {
    let client = build_client_failing(FailureKind::Authorization);

    let err = client.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, QuarryError::Authorization(_)));
}

#[tokio::test]
async fn transient_submit_errors_eventually_surface() {
    let client = build_client_failing(FailureKind::Transient);

    let err = client.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, QuarryError::Transient(_)));
}

fn build_client_failing(kind: FailureKind) -> QueryClient {
    super::init_logging();
    QueryClient::new(
        Arc::new(FailingExecutionService::new(kind)),
        Arc::new(MockStorageService::new()),
        fast_config(),
    )
    .unwrap()
}

#[tokio::test]
async fn empty_result_is_success_not_error() {
    // A header row with no data rows: the service ran a query that
    // matched nothing.
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&[])),
    );
    let client = build_client(
        execution,
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let envelope = client.query("SELECT 1 WHERE 1 = 0").await.unwrap();

    assert_eq!(envelope.count, 0);
    assert_eq!(envelope.items, Some(vec![]));
}

#[tokio::test]
async fn ignore_empty_omits_items_entirely() {
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&[])),
    );
    let config = ClientConfig {
        ignore_empty: true,
        ..fast_config()
    };
    let client = build_client(execution, Arc::new(MockStorageService::new()), config);

    let envelope = client.query("SELECT 1 WHERE 1 = 0").await.unwrap();

    assert_eq!(envelope.count, 0);
    assert!(envelope.items.is_none());
}

#[tokio::test]
async fn skip_results_returns_handle_only() {
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let options = QueryOptions {
        skip_results: Some(true),
        ..Default::default()
    };
    let envelope = client
        .query_with_options("SELECT 1", &options)
        .await
        .unwrap();

    assert_eq!(envelope.execution_id, MOCK_EXECUTION_ID);
    assert!(envelope.items.is_none());
    assert!(envelope.output_location.is_some());
    assert_eq!(execution.fetch_count(), 0);
}

#[tokio::test]
async fn stats_are_attached_when_requested() {
    let execution = Arc::new(
        MockExecutionService::new()
            .with_statuses(vec![ExecutionStatus::Running, ExecutionStatus::Succeeded])
            .with_final_metadata(ExecutionMetadata {
                bytes_scanned: Some(2_000_000_000_000),
                total_elapsed_ms: Some(4500),
                queue_time_ms: Some(100),
                planning_time_ms: Some(50),
                execution_time_ms: Some(4200),
                service_processing_time_ms: Some(150),
                output_location: None,
            })
            .with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution,
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let envelope = client
        .query_with_options("SELECT 1", &QueryOptions::default().with_stats())
        .await
        .unwrap();

    let stats = envelope.stats.unwrap();
    assert_eq!(stats.bytes_scanned, 2_000_000_000_000);
    assert_eq!(stats.cost_estimate_usd, 10.0);
    assert_eq!(stats.total_elapsed_ms, 4500);
    assert_eq!(stats.bytes_scanned_mb(), 2_000_000);
}

#[tokio::test]
async fn adopting_the_same_execution_twice_yields_equal_items() {
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&["1", "2"])),
    );
    let client = build_client(
        execution,
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let first = client
        .query("c74ff771-5a97-40a8-b2c6-1f9e9d4b7d2e")
        .await
        .unwrap();
    let second = client
        .query("c74ff771-5a97-40a8-b2c6-1f9e9d4b7d2e")
        .await
        .unwrap();

    assert_eq!(first.items, second.items);
    assert_eq!(first.count, second.count);
}

#[tokio::test]
async fn result_reuse_options_reach_the_submission() {
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    client
        .query_with_options(
            "SELECT 1",
            &QueryOptions::default().with_result_reuse(30),
        )
        .await
        .unwrap();

    let spec = &execution.submissions()[0];
    assert!(spec.result_reuse);
    assert_eq!(spec.result_reuse_max_age_minutes, 30);
    assert_eq!(spec.workgroup, "primary");
    assert_eq!(spec.database, "default");
}

#[tokio::test]
async fn positional_values_are_bound_before_submission() {
    let execution = Arc::new(
        MockExecutionService::new().with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let request = QueryRequest::sql("SELECT * FROM t WHERE name = ? AND id = ?")
        .with_values(vec!["O'Brien".to_string(), "7".to_string()]);
    client.query(request).await.unwrap();

    assert_eq!(
        execution.submissions()[0].sql,
        "SELECT * FROM t WHERE name = 'O''Brien' AND id = 7"
    );
}

#[tokio::test]
async fn cancellation_token_stops_polling_without_remote_cancel() {
    let execution = Arc::new(
        MockExecutionService::new().with_statuses(vec![ExecutionStatus::Running]),
    );
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    let token = CancellationToken::new();
    token.cancel();
    let err = client
        .query_with_cancellation("SELECT 1", &QueryOptions::default(), &token)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    // Abandoning the poll loop never cancels the remote execution.
    assert!(execution.cancelled().is_empty());
    assert_eq!(execution.poll_count(), 0);
}

#[tokio::test]
async fn explicit_cancel_reaches_the_service() {
    let execution = Arc::new(MockExecutionService::new());
    let client = build_client(
        execution.clone(),
        Arc::new(MockStorageService::new()),
        fast_config(),
    );

    client.cancel("exec-1").await.unwrap();
    assert_eq!(execution.cancelled(), vec!["exec-1".to_string()]);
}

#[tokio::test]
async fn concurrent_queries_poll_independently() {
    let execution = Arc::new(
        MockExecutionService::new()
            .with_statuses(vec![
                ExecutionStatus::Running,
                ExecutionStatus::Succeeded,
            ])
            .with_page(col0_schema(), col0_page_with_header(&["1"])),
    );
    let storage = Arc::new(MockStorageService::new());
    let client = Arc::new(build_client(execution, storage, fast_config()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .query("c74ff771-5a97-40a8-b2c6-1f9e9d4b7d2e")
                .await
        }));
    }

    for handle in handles {
        let envelope = handle.await.unwrap().unwrap();
        assert_eq!(envelope.count, 1);
    }
}
