//! Acquisition through export against a mocked Icecat endpoint

mod common;

use common::{gzip, init_test_tracing, scratch_config, SAMPLE_TSV};
use icecat_common::IngestError;
use icecat_ingest::pipeline;
use tempfile::TempDir;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn archive_server(expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/files.index.csv.gz"))
        .and(basic_auth("shop-user", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(SAMPLE_TSV.as_bytes())))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_download_then_export_fetches_once() {
    init_test_tracing();
    let server = archive_server(1).await;
    let dir = TempDir::new().unwrap();
    let mut config = scratch_config(dir.path());
    config.source.url = format!("{}/export/files.index.csv.gz", server.uri());

    let report = pipeline::download(&config).await.unwrap();
    assert!(report.success);
    assert_eq!(report.path, dir.path().join("in/icecat.data.csv"));
    assert!(dir.path().join("in/icecat.data.gz").exists());
    assert_eq!(std::fs::read_to_string(&report.path).unwrap(), SAMPLE_TSV);

    // Second acquisition hits the fresh cache
    let metrics = pipeline::export_to_files(&config, None).await;
    assert!(metrics.is_success(), "{:?}", metrics.error);

    let summary = metrics.summary();
    assert_eq!(summary.rows_found, 3);
    assert_eq!(summary.rows_processed, 3);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.files_generated, Some(2));
    assert_eq!(
        summary.example_file,
        Some(dir.path().join("out/icecat_1.json"))
    );
    assert!(dir.path().join("out/icecat_row_0000004.json").exists());

    let example = serde_json::to_value(&summary).unwrap();
    assert_eq!(example["data_example"]["name"], "Widget");
}

#[tokio::test]
async fn test_rejected_credentials_reported_in_metrics() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = scratch_config(dir.path());
    config.source.url = format!("{}/export/files.index.csv.gz", server.uri());

    let err = pipeline::acquire_csv(&config).await.unwrap_err();
    assert!(matches!(err, IngestError::Authentication { status: 403, .. }));
    assert!(!dir.path().join("in/icecat.data.gz").exists());

    let metrics = pipeline::export_to_files(&config, None).await;
    assert_eq!(metrics.rows_found, 0);
    assert!(metrics.error.unwrap().contains("HTTP 403"));
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_export_without_cleanup_keeps_old_files() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("local.csv");
    std::fs::write(&csv, SAMPLE_TSV).unwrap();

    let mut config = scratch_config(dir.path());
    std::fs::create_dir_all(&config.export.output_dir).unwrap();
    std::fs::write(config.export.output_dir.join("icecat_999.json"), "{}").unwrap();

    config.export.cleanup = false;
    let metrics = pipeline::export_to_files(&config, Some(&csv)).await;
    assert_eq!(metrics.rows_delivered, 2);
    assert!(config.export.output_dir.join("icecat_999.json").exists());

    config.export.cleanup = true;
    pipeline::export_to_files(&config, Some(&csv)).await;
    assert!(!config.export.output_dir.join("icecat_999.json").exists());
    assert_eq!(std::fs::read_dir(&config.export.output_dir).unwrap().count(), 2);
}
