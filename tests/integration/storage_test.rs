//! Raw-output-path tests: CSV download from object storage, cleanup.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use url::Url;

use quarry::service::{MockExecutionService, MockStorageService, MOCK_EXECUTION_ID};
use quarry::{ClientConfig, ColumnDef, ColumnType, ExecutionMetadata, QuarryError, Value};

use super::{build_client, fast_config, BUCKET};

fn output_url() -> Url {
    Url::parse(&format!("{BUCKET}{MOCK_EXECUTION_ID}.csv")).unwrap()
}

fn typed_schema() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", ColumnType::Integer),
        ColumnDef::new("name", ColumnType::String),
        ColumnDef::new("active", ColumnType::Boolean),
    ]
}

fn raw_config() -> ClientConfig {
    ClientConfig {
        format_json: false,
        ..fast_config()
    }
}

#[tokio::test]
async fn raw_path_parses_csv_with_schema_from_metadata_fetch() {
    let execution =
        Arc::new(MockExecutionService::new().with_page(typed_schema(), Vec::new()));
    let storage = Arc::new(MockStorageService::new());
    storage.put(
        &output_url(),
        b"id,name,active\n1,Ada,true\n2,,false\n".to_vec(),
    );
    let client = build_client(execution, storage, raw_config());

    let envelope = client.query("SELECT * FROM people").await.unwrap();

    assert_eq!(envelope.count, 2);
    assert!(envelope.next_token.is_none());
    let items = envelope.items.unwrap();
    assert_eq!(items[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(items[0].get("active"), Some(&Value::Bool(true)));
    // Unquoted empty field is null, not an empty string.
    assert_eq!(items[1].get("name"), Some(&Value::Null));
}

#[tokio::test]
async fn raw_path_reads_the_location_the_service_reported() {
    let reported = Url::parse("s3://spill-bucket/nested/out.csv").unwrap();
    let execution = Arc::new(
        MockExecutionService::new()
            .with_page(typed_schema(), Vec::new())
            .with_final_metadata(ExecutionMetadata {
                output_location: Some(reported.clone()),
                ..ExecutionMetadata::default()
            }),
    );
    let storage = Arc::new(MockStorageService::new());
    storage.put(&reported, b"id,name,active\n7,Grace,true\n".to_vec());
    // A bucket without a trailing slash cannot derive the object path;
    // the reported location must be used instead.
    let config = ClientConfig {
        output_bucket: "s3://test-bucket/results".to_string(),
        ..raw_config()
    };
    let client = build_client(execution, storage, config);

    let envelope = client.query("SELECT * FROM people").await.unwrap();

    assert_eq!(envelope.count, 1);
    assert_eq!(envelope.output_location, Some(reported));
    let items = envelope.items.unwrap();
    assert_eq!(items[0].get("id"), Some(&Value::Int(7)));
}

#[tokio::test]
async fn raw_path_surfaces_missing_object() {
    let execution =
        Arc::new(MockExecutionService::new().with_page(typed_schema(), Vec::new()));
    let client = build_client(execution, Arc::new(MockStorageService::new()), raw_config());

    let err = client.query("SELECT * FROM people").await.unwrap_err();
    assert!(matches!(err, QuarryError::Storage(_)));
}

#[tokio::test]
async fn raw_path_surfaces_malformed_rows() {
    let execution =
        Arc::new(MockExecutionService::new().with_page(typed_schema(), Vec::new()));
    let storage = Arc::new(MockStorageService::new());
    storage.put(&output_url(), b"id,name,active\nseven,Ada,true\n".to_vec());
    let client = build_client(execution, storage, raw_config());

    let err = client.query("SELECT * FROM people").await.unwrap_err();
    assert!(matches!(err, QuarryError::MalformedRow(_)));
    assert!(err.to_string().contains("declared integer"));
}

#[tokio::test]
async fn delete_after_read_removes_the_output_object() {
    let execution =
        Arc::new(MockExecutionService::new().with_page(typed_schema(), Vec::new()));
    let storage = Arc::new(MockStorageService::new());
    storage.put(&output_url(), b"id,name,active\n1,Ada,true\n".to_vec());
    let config = ClientConfig {
        delete_output_after_read: true,
        ..raw_config()
    };
    let client = build_client(execution, storage.clone(), config);

    let envelope = client.query("SELECT * FROM people").await.unwrap();

    assert_eq!(envelope.count, 1);
    assert_eq!(storage.deleted().len(), 1);
    assert!(storage.deleted()[0].ends_with(&format!("{MOCK_EXECUTION_ID}.csv")));
}

#[tokio::test]
async fn delete_failures_are_logged_not_surfaced() {
    // Nothing stored at the output location: the delete fails, but the
    // structured read already produced a result.
    let execution = Arc::new(MockExecutionService::new().with_page(
        vec![ColumnDef::new("_col0", ColumnType::Integer)],
        vec![
            vec![Some("_col0".to_string())],
            vec![Some("1".to_string())],
        ],
    ));
    let config = ClientConfig {
        delete_output_after_read: true,
        ..fast_config()
    };
    let client = build_client(execution, Arc::new(MockStorageService::new()), config);

    let envelope = client.query("SELECT 1").await.unwrap();
    assert_eq!(envelope.count, 1);
}
