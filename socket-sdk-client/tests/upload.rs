mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use socket_sdk_client::{ClientError, FailureKind, FullScanParams, MultipartForm};

use common::{Hits, client, serve};

#[derive(Clone, Default)]
struct Uploads {
    hits: Hits,
    /// `(content-type, content-length, query, body)` per request.
    received: Arc<Mutex<Vec<(String, Option<u64>, Option<String>, Bytes)>>>,
    /// Answer 503 to this many requests first.
    fail_first: usize,
}

async fn receive(
    State(uploads): State<Uploads>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let index = uploads.hits.record();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    uploads
        .received
        .lock()
        .unwrap()
        .push((content_type, content_length, query, body.clone()));

    if index < uploads.fail_first {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "id": "scan-1", "size": body.len() })).into_response()
}

fn router(uploads: Uploads) -> Router {
    Router::new()
        .route("/v0/orgs/acme/full-scans", post(receive))
        .route("/v0/dependencies/upload", post(receive))
        .with_state(uploads)
}

fn boundary_of(content_type: &str) -> &str {
    content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type")
}

/// Part names in the order they appear in a multipart body.
fn part_names(body: &str) -> Vec<String> {
    body.match_indices("name=\"")
        .filter(|(i, _)| !body[..*i].ends_with("file"))
        .map(|(i, m)| {
            let rest = &body[i + m.len()..];
            rest[..rest.find('"').unwrap()].to_owned()
        })
        .collect()
}

#[tokio::test]
async fn test_full_scan_upload() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), r#"{"name":"web"}"#).unwrap();
    std::fs::create_dir(dir.path().join("api")).unwrap();
    std::fs::write(dir.path().join("api/requirements.txt"), "django==5.0.6\n").unwrap();

    let uploads = Uploads::default();
    let base_url = serve(router(uploads.clone())).await;
    let client = client(&base_url).build().unwrap();

    let files = MultipartForm::new()
        .files_relative_to(dir.path(), ["package.json", "api/requirements.txt"])
        .unwrap()
        .build()
        .await
        .unwrap();
    let expected_length = files.content_length();

    let mut params = FullScanParams::new("web");
    params.branch = Some("main".into());
    let result = client.create_org_full_scan("acme", &params, files).await.unwrap();

    assert_eq!(result.into_result().unwrap()["id"], "scan-1");

    let received = uploads.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (content_type, content_length, query, body) = &received[0];
    assert_eq!(*content_length, Some(expected_length));
    assert_eq!(body.len() as u64, expected_length);
    assert_eq!(query.as_deref(), Some("branch=main&repo=web"));

    let boundary = boundary_of(content_type);
    let body = std::str::from_utf8(body).unwrap();
    assert!(body.starts_with(&format!("--{boundary}\r\n")));
    assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    assert_eq!(part_names(body), vec!["package.json", "api/requirements.txt"]);

    let manifest = body.find(r#"{"name":"web"}"#).unwrap();
    let requirements = body.find("django==5.0.6").unwrap();
    assert!(manifest < requirements);
    assert!(body.contains("filename=\"requirements.txt\""));
}

#[tokio::test]
async fn test_missing_file_fails_before_network() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), "{}").unwrap();

    let uploads = Uploads::default();
    let _base_url = serve(router(uploads.clone())).await;

    let err = MultipartForm::new()
        .files_relative_to(dir.path(), ["package.json", "package-lock.json"])
        .unwrap()
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidUpload(_)));
    assert!(err.to_string().contains("package-lock.json"));
    assert_eq!(err.failure_kind(), FailureKind::Client);
    assert_eq!(uploads.hits.count(), 0);
}

#[tokio::test]
async fn test_upload_body_replayed_on_retry() {
    let dir = tempfile::tempdir().unwrap();
    // Larger than one read chunk.
    let lockfile = "x".repeat(200 * 1024);
    std::fs::write(dir.path().join("yarn.lock"), &lockfile).unwrap();

    let uploads = Uploads {
        fail_first: 1,
        ..Uploads::default()
    };
    let base_url = serve(router(uploads.clone())).await;
    let client = client(&base_url)
        .retries(1)
        .retry_delay(Duration::from_millis(5))
        .build()
        .unwrap();

    let files = MultipartForm::new()
        .file("yarn.lock", dir.path().join("yarn.lock"))
        .json("issueRules", &json!({ "malware": true }))
        .unwrap()
        .build()
        .await
        .unwrap();
    let result = client
        .create_dependencies_snapshot(&json!({ "repo": "web" }), files)
        .await
        .unwrap();

    let data: Value = result.into_result().unwrap();
    assert_eq!(uploads.hits.count(), 2);

    let received = uploads.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].3, received[1].3);
    assert_eq!(data["size"], received[1].3.len());

    let body = std::str::from_utf8(&received[1].3).unwrap();
    assert!(body.contains(&lockfile));
    assert!(body.contains("Content-Type: application/json"));
    assert_eq!(part_names(body), vec!["yarn.lock", "issueRules"]);
}
