//! Process-wide client handles.
//!
//! Both clients are built once at startup and shared read-only by every
//! request. Initialization fails fast: the server never starts without a
//! usable endpoint and resolvable credentials.

use super::providers::bedrock::BedrockProvider;
use super::providers::TextProvider;
use super::search::aoss::AossClient;
use super::search::signer::{SigV4Signer, AOSS_SERVICE_NAME};
use super::search::SearchClient;
use crate::config::GatewayConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use reqwest::Url;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientInitError {
    #[error("AOSS endpoint is not configured")]
    MissingEndpoint,

    #[error("Invalid AOSS endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("No AWS credentials provider available")]
    NoCredentialsProvider,

    #[error("Failed to resolve AWS credentials: {0}")]
    Credentials(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl From<ClientInitError> for AppError {
    fn from(err: ClientInitError) -> Self {
        AppError::ConfigError(anyhow::anyhow!(err))
    }
}

/// Parse and check the collection endpoint before any network call.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, ClientInitError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ClientInitError::MissingEndpoint);
    }

    let url = Url::parse(endpoint)
        .map_err(|e| ClientInitError::InvalidEndpoint(endpoint.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(ClientInitError::InvalidEndpoint(
            endpoint.to_string(),
            "expected an http(s) URL with a host".to_string(),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ClientInitError::InvalidEndpoint(
            endpoint.to_string(),
            "endpoint must not carry a query or fragment".to_string(),
        ));
    }

    Ok(url)
}

/// The inference and search handles injected into the router.
#[derive(Clone)]
pub struct ServiceClients {
    pub text_provider: Arc<dyn TextProvider>,
    pub search_client: Arc<dyn SearchClient>,
}

impl ServiceClients {
    pub fn new(text_provider: Arc<dyn TextProvider>, search_client: Arc<dyn SearchClient>) -> Self {
        Self {
            text_provider,
            search_client,
        }
    }

    /// Build the Bedrock Runtime and AOSS clients from ambient AWS credentials.
    pub async fn init(config: &GatewayConfig) -> Result<Self, ClientInitError> {
        let endpoint = validate_endpoint(&config.aoss.endpoint)?;

        let bedrock_sdk = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.bedrock.region.clone()))
            .load()
            .await;
        let bedrock_credentials = resolve_credentials(&bedrock_sdk).await?;

        let text_provider: Arc<dyn TextProvider> = Arc::new(BedrockProvider::new(
            aws_sdk_bedrockruntime::Client::new(&bedrock_sdk),
            &config.bedrock,
        ));

        tracing::info!(
            region = %config.bedrock.region,
            haiku_model = %config.bedrock.haiku_model_id,
            claude2_model = %config.bedrock.claude2_model_id,
            "Initialized Bedrock Runtime client"
        );

        let aoss_region = config.aoss_region().to_string();
        let credentials = aoss_credentials(config, bedrock_credentials).await?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientInitError::HttpClient(e.to_string()))?;
        let signer = SigV4Signer::new(credentials, aoss_region.clone(), AOSS_SERVICE_NAME);
        let search_client: Arc<dyn SearchClient> =
            Arc::new(AossClient::new(http, endpoint.clone(), signer));

        tracing::info!(
            endpoint = %endpoint,
            region = %aoss_region,
            index = %config.aoss.index,
            "Initialized OpenSearch Serverless client"
        );

        Ok(Self::new(text_provider, search_client))
    }
}

/// Credentials for signing AOSS calls. The Bedrock provider is reused when
/// both services share a region; otherwise the chain is loaded for the AOSS
/// region.
async fn aoss_credentials(
    config: &GatewayConfig,
    bedrock_credentials: SharedCredentialsProvider,
) -> Result<SharedCredentialsProvider, ClientInitError> {
    let aoss_region = config.aoss_region();
    if aoss_region == config.bedrock.region {
        return Ok(bedrock_credentials);
    }

    let aoss_sdk = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(aoss_region.to_string()))
        .load()
        .await;
    resolve_credentials(&aoss_sdk).await
}

/// Resolve credentials once so a missing identity stops startup instead of
/// failing the first request.
async fn resolve_credentials(
    sdk: &SdkConfig,
) -> Result<SharedCredentialsProvider, ClientInitError> {
    let provider = sdk
        .credentials_provider()
        .ok_or(ClientInitError::NoCredentialsProvider)?;

    provider
        .provide_credentials()
        .await
        .map_err(|e| ClientInitError::Credentials(e.to_string()))?;

    Ok(provider)
}
