#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use bedrock_gateway::config::GatewayConfig;
use bedrock_gateway::services::providers::mock::MockTextProvider;
use bedrock_gateway::services::search::mock::MockSearchClient;
use bedrock_gateway::services::ServiceClients;
use bedrock_gateway::startup::{build_router, AppState, Application};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

pub const HAIKU_MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const CLAUDE2_MODEL: &str = "anthropic.claude-v2";

pub fn test_config() -> GatewayConfig {
    let mut config: GatewayConfig = serde_json::from_value(json!({
        "aoss": { "endpoint": "https://test-collection.us-west-2.aoss.amazonaws.com" }
    }))
    .expect("Failed to build test configuration");

    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.http.static_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static");
    config
}

pub fn clients(text: &Arc<MockTextProvider>, search: &Arc<MockSearchClient>) -> ServiceClients {
    ServiceClients::new(text.clone(), search.clone())
}

pub fn router(text: &Arc<MockTextProvider>, search: &Arc<MockSearchClient>) -> Router {
    build_router(AppState::new(test_config(), clients(text, search)))
}

pub fn empty_search() -> Arc<MockSearchClient> {
    Arc::new(MockSearchClient::new(json!({"hits": {"hits": []}})))
}

pub fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("Body is not JSON")
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

impl TestApp {
    pub async fn spawn(text: &Arc<MockTextProvider>, search: &Arc<MockSearchClient>) -> Self {
        Self::spawn_with_config(test_config(), text, search).await
    }

    pub async fn spawn_with_config(
        config: GatewayConfig,
        text: &Arc<MockTextProvider>,
        search: &Arc<MockSearchClient>,
    ) -> Self {
        let app = Application::build_with_clients(config, clients(text, search))
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}
