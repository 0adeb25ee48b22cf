//! Integration tests for application lifecycle operations.

mod support;

use forms_client::{ApiError, SortOrder};
use serde_json::json;
use support::{APP_PATH, client_for};
use tempfile::TempDir;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVE: &[u8] = b"PK\x03\x04archive";

fn textarea_body(json: &str) -> String {
    format!("<textarea>{}</textarea>", json.replace('"', "&quot;"))
}

async fn mount_import(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(APP_PATH))
        .and(query_param("deploy", "true"))
        .and(query_param("cleanIds", "false"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_import_parses_textarea_and_assigns_tags() {
    let server = MockServer::start().await;
    mount_import(
        &server,
        ResponseTemplate::new(200).set_body_raw(
            textarea_body(r#"{"id":"abc123","name":"Demo"}"#),
            "text/html",
        ),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path(format!("{APP_PATH}/abc123/tags")))
        .and(header("content-type", "text/plain"))
        .and(body_string("hr,onboarding"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for(&server)
        .import_application_stream(ARCHIVE, "demo.nitro_s", true, false, false, Some("hr,onboarding"))
        .await
        .unwrap();

    assert_eq!(envelope.http_status, 200);
    let body = envelope.json().unwrap();
    assert_eq!(body["id"], "abc123");
    assert_eq!(body["name"], "Demo");
}

#[tokio::test]
async fn test_import_with_data_flags_in_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(APP_PATH))
        .and(query_param("deploy", "false"))
        .and(query_param("importData", "true"))
        .and(query_param("importAllForms", "true"))
        .and(query_param("cleanIds", "true"))
        .and(body_string_contains("filename=\"demo.nitro_s\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(textarea_body(r#"{"id":"x1"}"#)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let envelope = client_for(&server)
        .import_application_stream(ARCHIVE, "demo.nitro_s", false, true, true, None)
        .await
        .unwrap();
    assert_eq!(envelope.json().unwrap()["id"], "x1");
}

#[tokio::test]
async fn test_import_tag_failure_is_reported() {
    let server = MockServer::start().await;
    mount_import(
        &server,
        ResponseTemplate::new(200).set_body_string(textarea_body(r#"{"id":"abc123"}"#)),
    )
    .await;
    Mock::given(method("PUT"))
        .and(path(format!("{APP_PATH}/abc123/tags")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .import_application_stream(ARCHIVE, "demo.nitro_s", true, false, false, Some("hr"))
        .await
        .unwrap_err();
    match err {
        ApiError::TagAssignmentFailed { app_id, reason } => {
            assert_eq!(app_id, "abc123");
            assert!(reason.contains("500"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_import_skips_body_and_tags() {
    let server = MockServer::start().await;
    mount_import(
        &server,
        ResponseTemplate::new(500).set_body_string("<html>stack trace</html>"),
    )
    .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let envelope = client_for(&server)
        .import_application_stream(ARCHIVE, "demo.nitro_s", true, false, false, Some("hr"))
        .await
        .unwrap();
    assert_eq!(envelope.http_status, 500);
    assert!(envelope.json().is_none());
}

#[tokio::test]
async fn test_import_missing_archive_is_io_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");

    let err = client_for(&server)
        .import_application(&dir.path().join("absent.nitro_s"), true, false, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Io { .. }), "{err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upgrade_posts_to_application_archive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{APP_PATH}/a1/archive")))
        .and(query_param("replaceEmbeddedData", "on"))
        .and(query_param("runDatabaseUpgradeNow", "on"))
        .and(query_param("replaceSubmittedData", "on"))
        .respond_with(ResponseTemplate::new(200).set_body_string(textarea_body(r#"{"id":"a1"}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let archive = dir.path().join("a1.nitro_s");
    std::fs::write(&archive, ARCHIVE).unwrap();

    let envelope = client_for(&server)
        .upgrade_application(&archive, true, "a1")
        .await
        .unwrap();
    assert_eq!(envelope.json().unwrap()["id"], "a1");
}

#[tokio::test]
async fn test_export_writes_archive_into_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{APP_PATH}/a1/archive")))
        .and(query_param("mode", "source"))
        .and(query_param("submitted", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let envelope = client_for(&server)
        .export_application_to_path("a1", dir.path(), true)
        .await
        .unwrap();

    assert_eq!(envelope.http_status, 200);
    assert_eq!(std::fs::read(dir.path().join("a1.nitro_s")).unwrap(), ARCHIVE);
}

#[tokio::test]
async fn test_export_rejects_non_directory() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let file = dir.path().join("plain.txt");
    std::fs::write(&file, "x").unwrap();

    let err = client_for(&server)
        .export_application_to_path("a1", &file, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Io { .. }), "{err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_export_stream_yields_archive_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{APP_PATH}/a1/archive")))
        .and(query_param("submitted", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE.to_vec()))
        .mount(&server)
        .await;

    let mut stream = client_for(&server)
        .export_application_stream("a1", false)
        .await
        .unwrap();
    let mut collected = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(collected, ARCHIVE);
}

#[tokio::test]
async fn test_delete_applications_reports_each_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{APP_PATH}/a1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{APP_PATH}/a2")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = client_for(&server)
        .delete_applications(&["a1", "", "a2"])
        .await
        .unwrap();

    assert_eq!(report.outcomes().len(), 2);
    assert_eq!(report.deleted_count(), 1);
    let text = report.to_string();
    assert!(text.contains("a1 deleted successfully"));
    assert!(text.contains("Failed to delete a2"));
}

#[tokio::test]
async fn test_start_application_puts_deploy_settings() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{APP_PATH}/a1/deployed/latest")))
        .and(header("content-type", "application/atom+xml"))
        .and(body_string_contains("started=\"true\" deployed=\"true\" sync=\"false\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for(&server).start_application("a1").await.unwrap();
    assert_eq!(envelope.http_status, 200);
}

#[tokio::test]
async fn test_stop_application_clears_started_flag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{APP_PATH}/a1/deployed/latest")))
        .and(body_string_contains("started=\"false\" deployed=\"false\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = client_for(&server).stop_application("a1").await.unwrap();
    assert!(envelope.is_successful());
}

#[tokio::test]
async fn test_list_apps_for_user_parses_atom_feed() {
    let server = MockServer::start().await;
    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>My apps</title>
  <entry><title>Expenses</title><id>a1</id></entry>
  <entry><title>Onboarding</title><id>a2</id></entry>
</feed>"#;
    Mock::given(method("GET"))
        .and(path("/forms/secure/org/myapps"))
        .and(query_param("page", "2"))
        .and(query_param("pageSize", "10"))
        .and(query_param("order", "ASC"))
        .and(header("accept", "application/atom+xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/atom+xml"))
        .mount(&server)
        .await;

    let envelope = client_for(&server)
        .list_apps_for_user(Some(2), Some(10), None, Some(SortOrder::Ascending))
        .await
        .unwrap();

    let root = envelope.xml().expect("atom body");
    assert_eq!(root.name, "feed");
    let titles: Vec<String> = root
        .elements_named("entry")
        .filter_map(|entry| entry.element("title"))
        .map(|title| title.text())
        .collect();
    assert_eq!(titles, vec!["Expenses", "Onboarding"]);
}

#[tokio::test]
async fn test_admin_list_apps_requires_administrator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forms/secure/org/admin/apps"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .admin_list_apps(None, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotAdministrator), "{err}");
}

#[tokio::test]
async fn test_admin_list_apps_returns_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forms/secure/org/admin/apps"))
        .and(query_param("sortBy", "name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"uid": "a1"}]})))
        .mount(&server)
        .await;

    let envelope = client_for(&server)
        .admin_list_apps(None, None, Some("name"), None)
        .await
        .unwrap();
    assert_eq!(envelope.json().unwrap()["items"][0]["uid"], "a1");
}
