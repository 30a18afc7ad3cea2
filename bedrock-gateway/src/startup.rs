//! Application startup and lifecycle management.
//!
//! Clients are constructed once by [`Application::build`] and injected into
//! the router through [`AppState`]; they are dropped when the server exits.

use crate::config::GatewayConfig;
use crate::handlers;
use crate::services::{SearchClient, ServiceClients, TextProvider};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, get_service, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    services::ServeFile,
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

/// Room for multipart boundaries and the prompt field on top of the image.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub text_provider: Arc<dyn TextProvider>,
    pub search_client: Arc<dyn SearchClient>,
}

impl AppState {
    pub fn new(config: GatewayConfig, clients: ServiceClients) -> Self {
        Self {
            config: Arc::new(config),
            text_provider: clients.text_provider,
            search_client: clients.search_client,
        }
    }
}

/// Build the full HTTP router: static pages, API routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let read_timeout = state.config.server.read_timeout();
    let write_timeout = state.config.server.write_timeout();
    let static_dir = state.config.http.static_dir.clone();
    let page = |file: &str| get_service(ServeFile::new(static_dir.join(file)));
    let upload_limit = state.config.http.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Front-end pages
        .route("/", page("claude-haiku.html"))
        .route("/haiku", page("claude-haiku.html"))
        .route("/claude2", page("claude2.html"))
        .route("/image", page("image.html"))
        .route(
            "/aoss",
            page("opensearch.html").post(handlers::aoss_greeting),
        )
        .route("/rag", page("rag.html"))
        .route("/mirror", page("mirror.html"))
        // Bedrock
        .route("/bedrock-haiku", post(handlers::chat_haiku))
        .route("/bedrock-stream", post(handlers::chat_claude2))
        .route(
            "/claude-haiku-image",
            post(handlers::analyze_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // OpenSearch Serverless
        .route("/query", get(handlers::query).post(handlers::query))
        .route("/rag-query", get(handlers::rag_query).post(handlers::rag_query))
        .route("/health", get(handlers::health_check))
        .layer(RequestBodyTimeoutLayer::new(read_timeout))
        .layer(TimeoutLayer::new(write_timeout))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Initialize the AWS clients and bind the listener.
    ///
    /// Fails if the clients cannot be created; nothing is served in that case.
    pub async fn build(config: GatewayConfig) -> Result<Self, AppError> {
        let clients = ServiceClients::init(&config).await.map_err(|e| {
            tracing::error!("Failed to initialize service clients: {}", e);
            AppError::from(e)
        })?;

        Self::build_with_clients(config, clients).await
    }

    /// Bind the listener around already constructed clients.
    pub async fn build_with_clients(
        config: GatewayConfig,
        clients: ServiceClients,
    ) -> Result<Self, AppError> {
        let addr = config.server.address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port = port,
            read_timeout_secs = config.server.read_timeout_secs,
            write_timeout_secs = config.server.write_timeout_secs,
            "Bedrock gateway listening"
        );

        let router = build_router(AppState::new(config, clients));

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until Ctrl+C or SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
