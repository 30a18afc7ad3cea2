use serde::Deserialize;
use service_core::config::{self as core_config, ServerConfig};
use service_core::error::AppError;
use std::path::PathBuf;

/// Default upload bound (5 MiB), the Bedrock per-image limit.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub bedrock: BedrockConfig,
    pub aoss: AossConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Directory holding the HTML front ends.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Claude 3 model used for `/bedrock-haiku`, image analysis and RAG answers.
    #[serde(default = "default_haiku_model_id")]
    pub haiku_model_id: String,
    /// Claude v2 model used for `/bedrock-stream`.
    #[serde(default = "default_claude2_model_id")]
    pub claude2_model_id: String,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            haiku_model_id: default_haiku_model_id(),
            claude2_model_id: default_claude2_model_id(),
            anthropic_version: default_anthropic_version(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AossConfig {
    /// Collection endpoint, e.g. `https://<id>.us-west-2.aoss.amazonaws.com`.
    pub endpoint: String,
    /// Signing region; falls back to the Bedrock region.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_text_field")]
    pub text_field: String,
    #[serde(default = "default_vector_field")]
    pub vector_field: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_haiku_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}

fn default_claude2_model_id() -> String {
    "anthropic.claude-v2".to_string()
}

fn default_anthropic_version() -> String {
    "bedrock-2023-05-31".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_index() -> String {
    "demo".to_string()
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_vector_field() -> String {
    "vector_field".to_string()
}

fn default_k() -> usize {
    5
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        core_config::load()
    }

    /// Region used to sign AOSS requests.
    pub fn aoss_region(&self) -> &str {
        self.aoss.region.as_deref().unwrap_or(&self.bedrock.region)
    }
}
