use std::time::Duration;
use serde::{Serialize, Deserialize};
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use log::{debug, error};

use crate::errors::ProviderError;
use super::{Candidate, GenerationRequest, GenerationResponse, Provider};

/// Default public endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Client for the Generative Language `generateContent` API
#[derive(Debug)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
    /// Model id, with or without the `models/` prefix
    model: String,
}

/// Request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct GeminiGenerationConfig {
    temperature: f32,
}

/// Content block, shared by request and response
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Response body
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Error envelope returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: Some(prompt.into()) }],
            }],
            generation_config: GeminiGenerationConfig { temperature },
        }
    }
}

impl From<GeminiResponse> for GenerationResponse {
    fn from(response: GeminiResponse) -> Self {
        let candidates: Vec<Candidate> = response
            .candidates
            .into_iter()
            .map(|c| Candidate {
                parts: c
                    .content
                    .map(|content| content.parts.into_iter().map(|p| p.text).collect())
                    .unwrap_or_default(),
                finish_reason: c.finish_reason,
            })
            .collect();
        let all_text: String = candidates
            .iter()
            .flat_map(|c| c.parts.iter().flatten())
            .map(String::as_str)
            .collect();
        Self {
            candidates,
            block_reason: response.prompt_feedback.and_then(|f| f.block_reason),
            text: if all_text.is_empty() { None } else { Some(all_text) },
        }
    }
}

/// Map the service's canonical status name onto an error, if it is one we classify
fn error_from_status_name(status: &str, message: String) -> Option<ProviderError> {
    Some(match status {
        "RESOURCE_EXHAUSTED" => ProviderError::RateLimited(message),
        "DEADLINE_EXCEEDED" => ProviderError::Timeout(message),
        "UNAVAILABLE" => ProviderError::Unavailable(message),
        "INTERNAL" => ProviderError::Internal(message),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => ProviderError::InvalidArgument(message),
        "PERMISSION_DENIED" => ProviderError::PermissionDenied(message),
        "UNAUTHENTICATED" => ProviderError::AuthenticationError(message),
        "NOT_FOUND" => ProviderError::NotFound(message),
        _ => return None,
    })
}

/// Normalize a proxy descriptor; a bare `host:port` means HTTP
pub fn normalize_proxy_url(proxy: &str) -> String {
    let trimmed = proxy.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

impl Gemini {
    /// Create a new client; `proxy` is applied to every request
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
            let proxy = Proxy::all(normalize_proxy_url(proxy))
                .map_err(|e| ProviderError::ConnectionError(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;
        let endpoint = endpoint.into();
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() { DEFAULT_ENDPOINT.to_string() } else { endpoint },
            model: model.into(),
        })
    }

    fn api_url(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        )
    }

    /// Send one request and decode the body
    pub async fn complete(&self, request: &GeminiRequest) -> Result<GeminiResponse, ProviderError> {
        let response = self
            .client
            .post(self.api_url())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::ConnectionError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text);
            let classified = serde_json::from_str::<GeminiErrorEnvelope>(&error_text)
                .ok()
                .and_then(|env| error_from_status_name(&env.error.status, env.error.message));
            return Err(classified.unwrap_or_else(|| ProviderError::from_status(status.as_u16(), error_text)));
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl Provider for Gemini {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        debug!("Gemini call: model={}, {} prompt chars", self.model, request.prompt.chars().count());
        let body = GeminiRequest::new(request.prompt, request.temperature);
        Ok(self.complete(&body).await?.into())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.complete(&GeminiRequest::new("Hello", 0.0)).await?;
        Ok(())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
