//! HTTP surface of the upload API, driven through `tower::ServiceExt`

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

use dfe_server::api_router;
use dfe_server::ingest::{IngestJob, JobQueue, UploadIntake};
use dfe_server::store::MemoryStore;

const BOUNDARY: &str = "dfe-test-boundary";

/// Router over a queue nobody drains, so uploads stay PENDING.
fn test_app(max_batch_files: usize) -> (Router, mpsc::Receiver<IngestJob>) {
    let store = Arc::new(MemoryStore::new());
    let (queue, rx) = JobQueue::bounded(16);
    let intake = Arc::new(UploadIntake::new(store, queue, max_batch_files));
    (api_router(intake), rx)
}

fn multipart(field: &str, files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (filename, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/xml\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    let uri = if field == "files" { "/api/v1/uploads/batch" } else { "/api/v1/uploads" };
    Request::post(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_single_upload_is_accepted_and_queryable() {
    let (app, mut rx) = test_app(100);
    let xml = waybill_xml(&waybill_key(50), "0");

    let response = app
        .clone()
        .oneshot(multipart("file", &[("cte.xml", &xml)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["filename"], "cte.xml");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let job = rx.try_recv().expect("job queued");
    assert_eq!(job.upload_id.to_string(), id);
    assert_eq!(job.content, xml.as_bytes());

    let response = app
        .oneshot(
            Request::get(format!("/api/v1/uploads/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["status"], "PENDING");
    assert!(body["data"].get("failure_detail").is_none());
}

#[tokio::test]
async fn test_unknown_upload_is_not_found() {
    let (app, _rx) = test_app(100);
    let response = app
        .oneshot(
            Request::get(format!("/api/v1/uploads/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["status"], 404);
}

#[tokio::test]
async fn test_single_upload_rejects_other_extensions() {
    let (app, _rx) = test_app(100);
    let response = app
        .oneshot(multipart("file", &[("invoice.pdf", "%PDF")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("invoice.pdf"));
}

#[tokio::test]
async fn test_missing_file_field_is_a_bad_request() {
    let (app, _rx) = test_app(100);
    let response = app
        .oneshot(multipart("attachment", &[("cte.xml", "<CTe/>")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_reports_accepted_and_skipped() {
    let (app, _rx) = test_app(100);
    let response = app
        .oneshot(multipart(
            "files",
            &[("a.xml", "<CTe/>"), ("b.txt", "plain"), ("c.xml", "<MDFe/>")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["accepted"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["skipped"][0], "b.txt");
    assert_eq!(body["meta"]["accepted"], 2);
    assert_eq!(body["meta"]["skipped"], 1);
    assert_eq!(body["meta"]["rejected"], 0);
}

#[tokio::test]
async fn test_batch_reports_rejected_files() {
    let (app, mut rx) = test_app(100);
    let response = app
        .oneshot(multipart("files", &[("a.xml", "<CTe/>"), ("empty.xml", "")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["accepted"], 1);
    assert_eq!(body["meta"]["rejected"], 1);
    assert_eq!(body["data"]["rejected"][0]["filename"], "empty.xml");
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_batch_over_the_limit_is_a_bad_request() {
    let (app, mut rx) = test_app(2);
    let response = app
        .oneshot(multipart(
            "files",
            &[("a.xml", "<CTe/>"), ("b.xml", "<CTe/>"), ("c.xml", "<CTe/>")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}
