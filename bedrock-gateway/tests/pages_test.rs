mod common;

use axum::http::{header, StatusCode};
use bedrock_gateway::services::providers::mock::MockTextProvider;
use common::{body_json, body_text, empty_search, form_post, get, router};
use service_core::middleware::REQUEST_ID_HEADER;
use std::sync::Arc;
use tower::util::ServiceExt;

fn app() -> axum::Router {
    router(&Arc::new(MockTextProvider::new("unused")), &empty_search())
}

#[tokio::test]
async fn front_end_pages_are_served() {
    let pages = [
        ("/", "Claude 3 Haiku"),
        ("/haiku", "Claude 3 Haiku"),
        ("/claude2", "Claude v2"),
        ("/image", "Describe an image"),
        ("/aoss", "OpenSearch Serverless"),
        ("/rag", "Ask your documents"),
        ("/mirror", "getUserMedia"),
    ];

    for (path, marker) in pages {
        let response = app().oneshot(get(path)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"), "GET {}", path);
        let csp = response.headers()[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap();
        assert!(csp.contains("'unsafe-inline'"), "GET {}", path);

        assert!(body_text(response).await.contains(marker), "GET {}", path);
    }
}

#[tokio::test]
async fn aoss_form_greets_by_name() {
    let response = app().oneshot(form_post("/aoss", "name=Ada")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Hello Ada");
}

#[tokio::test]
async fn health_reports_service() {
    let response = app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bedrock-gateway");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let response = app().oneshot(get("/does-not-exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_request_id_and_hardening_headers() {
    let request = axum::http::Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "trace-me")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-me");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert!(response.headers()[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .starts_with("default-src 'none'"));
}
