//! Gemini backend for receipt understanding.
//!
//! [`ReceiptModel`] is the seam the scanner talks to; [`GeminiClient`] is the
//! production implementation over the `generateContent` REST endpoint.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ScanConfig;

/// Failure of a single model candidate
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Quota or rate limit hit; worth backing off before the next candidate
    RateLimited(String),
    /// Model unknown, overloaded or unreachable
    Unavailable(String),
    /// Any other rejected request
    Failed(String),
}

impl ModelError {
    pub fn reason(&self) -> &str {
        match self {
            ModelError::RateLimited(msg) | ModelError::Unavailable(msg) | ModelError::Failed(msg) => msg,
        }
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            ModelError::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            ModelError::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Image understanding backend used by the receipt scanner.
#[async_trait]
pub trait ReceiptModel: Send + Sync {
    /// Run `prompt` against `image` with the named model and return its text output.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, ModelError>;

    /// Names of the models that support content generation.
    async fn list_models(&self) -> Result<Vec<String>, ModelError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Gemini REST client
pub struct GeminiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn api_key(&self) -> Result<&str, ModelError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ModelError::Failed("GEMINI_API_KEY is not configured".to_string()))
    }
}

/// Sort a non-success response into a candidate failure kind
fn classify_failure(status: StatusCode, body: &str) -> ModelError {
    let (message, upstream_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.to_string(), String::new()),
    };
    let reason = format!("{status}: {message}");

    if status == StatusCode::TOO_MANY_REQUESTS || upstream_status == "RESOURCE_EXHAUSTED" {
        ModelError::RateLimited(reason)
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::SERVICE_UNAVAILABLE {
        ModelError::Unavailable(reason)
    } else {
        ModelError::Failed(reason)
    }
}

#[async_trait]
impl ReceiptModel for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, ModelError> {
        let api_key = self.api_key()?;
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type,
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        },
                    },
                ],
            }],
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!(model, url = %url, image_bytes = image.len(), "Sending receipt to model");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::Failed(format!("unexpected response shape: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelError::Failed("model returned no text".to_string()));
        }

        Ok(text)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let api_key = self.api_key()?;
        let url = format!("{}/v1beta/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let list: ModelList = serde_json::from_str(&body)
            .map_err(|e| ModelError::Failed(format!("unexpected model list: {e}")))?;

        Ok(list
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == "generateContent"))
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }
}
