//! Worker roster extraction against a mock FHIR server
//!
//! Covers the field-worker identifier filter, branch targeting, and
//! cross-page deduplication.

use meridian::adapters::fhir::FhirClient;
use meridian::config::{
    secret_string, ApiConfig, ApplicationConfig, AuthConfig, ExtractConfig, LoggingConfig,
    MeridianConfig, OutputConfig,
};
use meridian::core::jobs::{run_job, JobContext};
use meridian::core::progress::{JobStatus, ProgressTracker};
use meridian::domain::ExportDomain;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

const TOKEN_BODY: &str =
    r#"{"access_token": "tok-1", "token_type": "Bearer", "expires_in": 3600}"#;

fn test_config(server_url: &str, output_dir: &Path) -> MeridianConfig {
    MeridianConfig {
        application: ApplicationConfig::default(),
        auth: AuthConfig {
            client_id: "client-1".to_string(),
            resource_security_id: secret_string("rsid".to_string()),
            agency_secret: secret_string("secret".to_string()),
            token_url: format!("{server_url}/connect/token"),
            scope: "openid agency.identity".to_string(),
        },
        api: ApiConfig {
            base_url: server_url.to_string(),
            request_timeout_secs: 5,
            token_rotation_count: 200,
            max_retries: 2,
        },
        extract: ExtractConfig::default(),
        output: OutputConfig {
            directory: output_dir.to_path_buf(),
            ..OutputConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}

fn test_context(config: MeridianConfig) -> JobContext {
    let client = Arc::new(FhirClient::new(&config.api, config.auth.clone()).unwrap());
    let progress = Arc::new(ProgressTracker::new(&config.output.directory).unwrap());
    let (_tx, rx) = watch::channel(false);
    JobContext {
        client,
        config: Arc::new(config),
        progress,
        cancel: rx,
    }
}

fn worker_json(id: &str, branch: &str) -> Value {
    json!({
        "resourceType": "Practitioner",
        "id": id,
        "active": true,
        "identifier": [
            {"use": "usual", "value": "emp-code"},
            {
                "use": "secondary",
                "type": {"text": "referenceTable"},
                "value": "practitioner-worker"
            }
        ],
        "name": [{"use": "official", "family": "Reyes", "given": ["Dana"]}],
        "telecom": [
            {"system": "phone", "value": "555-0100"},
            {"system": "email", "value": "dana@example.com"}
        ],
        "qualification": [{"code": {"text": "RN"}}],
        "extension": [{
            "url": "https://fhir.example.com/StructureDefinition/practitioner-details",
            "extension": [{
                "url": "HomeBranch",
                "valueReference": {"display": branch}
            }]
        }]
    })
}

fn office_staff_json(id: &str) -> Value {
    json!({
        "resourceType": "Practitioner",
        "id": id,
        "active": true,
        "identifier": [{"use": "usual", "value": "emp-code"}],
        "name": [{"family": "Office", "given": ["Pat"]}]
    })
}

fn bundle(resources: Vec<Value>, total: u64, next_url: Option<&str>) -> String {
    let mut links = vec![json!({"relation": "self", "url": "ignored"})];
    if let Some(url) = next_url {
        links.push(json!({"relation": "next", "url": url}));
    }
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": total,
        "link": links,
        "entry": resources.iter().map(|r| json!({"resource": r})).collect::<Vec<_>>()
    })
    .to_string()
}

#[tokio::test]
async fn test_workers_job_filters_to_target_branches() {
    let mut server = Server::new_async().await;
    let output = TempDir::new().unwrap();

    server
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_body(TOKEN_BODY)
        .create_async()
        .await;
    server
        .mock("GET", "/Practitioner")
        .match_query(Matcher::UrlEncoded("active".into(), "true,false".into()))
        .with_status(200)
        .with_body(bundle(
            vec![
                worker_json("wrk-1", "East"),
                worker_json("wrk-2", "West"),
                office_staff_json("staff-1"),
            ],
            3,
            None,
        ))
        .create_async()
        .await;

    let mut config = test_config(&server.url(), output.path());
    config.extract.target_branches = vec!["East".to_string()];

    let ctx = test_context(config);
    let summary = run_job(ExportDomain::Workers, &ctx).await.unwrap();

    assert_eq!(summary.status, JobStatus::Succeeded);
    assert_eq!(summary.rows_written, 1);

    let content = std::fs::read_to_string(output.path().join("worker_data.csv")).unwrap();
    assert!(content.contains("wrk-1,Reyes,Dana,East,RN,555-0100,dana@example.com,true"));
    assert!(!content.contains("wrk-2"));
    assert!(!content.contains("staff-1"));
}

#[tokio::test]
async fn test_workers_job_keeps_all_branches_when_no_targets() {
    let mut server = Server::new_async().await;
    let output = TempDir::new().unwrap();

    server
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_body(TOKEN_BODY)
        .create_async()
        .await;
    server
        .mock("GET", "/Practitioner")
        .match_query(Matcher::UrlEncoded("active".into(), "true,false".into()))
        .with_status(200)
        .with_body(bundle(
            vec![worker_json("wrk-1", "East"), worker_json("wrk-2", "West")],
            2,
            None,
        ))
        .create_async()
        .await;

    let ctx = test_context(test_config(&server.url(), output.path()));
    let summary = run_job(ExportDomain::Workers, &ctx).await.unwrap();

    assert_eq!(summary.status, JobStatus::Succeeded);
    assert_eq!(summary.rows_written, 2);
}

#[tokio::test]
async fn test_workers_job_deduplicates_across_pages() {
    let mut server = Server::new_async().await;
    let output = TempDir::new().unwrap();

    server
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_body(TOKEN_BODY)
        .create_async()
        .await;

    let next = format!("{}/Practitioner?page=2", server.url());
    server
        .mock("GET", "/Practitioner")
        .match_query(Matcher::UrlEncoded("active".into(), "true,false".into()))
        .with_status(200)
        .with_body(bundle(
            vec![worker_json("wrk-1", "East")],
            2,
            Some(&next),
        ))
        .create_async()
        .await;
    // Same worker appears again on the second page
    server
        .mock("GET", "/Practitioner")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(bundle(vec![worker_json("wrk-1", "East")], 2, None))
        .create_async()
        .await;

    let ctx = test_context(test_config(&server.url(), output.path()));
    let summary = run_job(ExportDomain::Workers, &ctx).await.unwrap();

    assert_eq!(summary.status, JobStatus::Succeeded);
    assert_eq!(summary.rows_written, 1);
}
