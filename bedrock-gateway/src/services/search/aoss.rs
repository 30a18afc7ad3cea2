//! OpenSearch Serverless client.
//!
//! AOSS has no dedicated Rust SDK for the data plane, so this talks to the
//! collection's REST endpoint with `reqwest` and signs each call with SigV4.

use super::signer::SigV4Signer;
use super::{validate_index_name, SearchClient, SearchError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

pub struct AossClient {
    http: Client,
    endpoint: Url,
    signer: SigV4Signer,
}

impl AossClient {
    pub fn new(http: Client, endpoint: Url, signer: SigV4Signer) -> Self {
        Self {
            http,
            endpoint,
            signer,
        }
    }

    fn search_url(&self, index: &str) -> Result<Url, SearchError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::InvalidQuery("Endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .push(index)
            .push("_search");
        Ok(url)
    }
}

#[async_trait]
impl SearchClient for AossClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, SearchError> {
        validate_index_name(index)?;
        let url = self.search_url(index)?;

        tracing::debug!(index = %index, url = %url, "Sending search request to AOSS");

        let mut request = self
            .http
            .post(url)
            .json(body)
            .build()
            .map_err(|e| SearchError::InvalidQuery(e.to_string()))?;
        self.signer.sign(&mut request).await?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| SearchError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(index = %index, status = %status, "AOSS search failed");
            return Err(error_for_status(status, index, error_text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::ApiError(format!("Failed to parse response: {}", e)))
    }
}

fn error_for_status(status: StatusCode, index: &str, body: String) -> SearchError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SearchError::RateLimited,
        StatusCode::NOT_FOUND => SearchError::IndexNotFound(index.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SearchError::AccessDenied(body),
        StatusCode::BAD_REQUEST => SearchError::InvalidQuery(body),
        _ => SearchError::ApiError(format!("AOSS error {}: {}", status, body)),
    }
}
