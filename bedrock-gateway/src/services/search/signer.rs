//! SigV4 request signing for OpenSearch Serverless.
//!
//! AOSS authenticates every HTTP call with an AWS SigV4 signature over the
//! method, URL, headers and a SHA-256 of the body (sent as
//! `x-amz-content-sha256`). Credentials are resolved per request so that
//! rotating role credentials keep working.

use super::SearchError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::SystemTime;

/// Signing name for OpenSearch Serverless collections.
pub const AOSS_SERVICE_NAME: &str = "aoss";

/// Signs outgoing `reqwest` requests with SigV4.
#[derive(Clone)]
pub struct SigV4Signer {
    credentials: SharedCredentialsProvider,
    region: String,
    service: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        credentials: SharedCredentialsProvider,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Resolve current credentials and sign `request` in place.
    pub async fn sign(&self, request: &mut reqwest::Request) -> Result<(), SearchError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| SearchError::Credentials(e.to_string()))?;

        self.sign_with(request, credentials, SystemTime::now())
    }

    /// Sign `request` with explicit credentials and signing time.
    pub fn sign_with(
        &self,
        request: &mut reqwest::Request,
        credentials: Credentials,
        time: SystemTime,
    ) -> Result<(), SearchError> {
        let identity: Identity = credentials.into();

        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;

        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(time)
            .settings(settings)
            .build()
            .map_err(|e| SearchError::Signing(e.to_string()))?
            .into();

        let instructions = {
            let body = request
                .body()
                .and_then(|body| body.as_bytes())
                .unwrap_or_default();
            let headers = request
                .headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));

            let signable = SignableRequest::new(
                request.method().as_str(),
                request.url().as_str(),
                headers,
                SignableBody::Bytes(body),
            )
            .map_err(|e| SearchError::Signing(e.to_string()))?;

            let (instructions, _signature) = sign(signable, &params)
                .map_err(|e| SearchError::Signing(e.to_string()))?
                .into_parts();
            instructions
        };

        for (name, value) in instructions.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SearchError::Signing(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| SearchError::Signing(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        Ok(())
    }
}
