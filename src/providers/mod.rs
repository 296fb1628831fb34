/*!
 * Provider implementations for the remote text-generation service.
 *
 * - `gemini`: Google Generative Language API over HTTP
 * - `mock`: scripted in-process provider used by tests and dry runs
 *
 * Providers only move bytes and classify transport failures. Retry,
 * block detection and text extraction belong to the translation client.
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// One generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Prompt with the chunk already substituted
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
}

/// One candidate returned by the service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    /// Text of each structured content part; `None` for non-text parts
    pub parts: Vec<Option<String>>,
    /// Finish reason as reported by the service (e.g. `STOP`, `SAFETY`)
    pub finish_reason: Option<String>,
}

/// Provider-neutral response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub candidates: Vec<Candidate>,
    /// Set when the prompt itself was blocked
    pub block_reason: Option<String>,
    /// Convenience full-text accessor, when the provider offers one
    pub text: Option<String>,
}

/// Finish reasons that mean the response was withheld on policy grounds
pub const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "RECITATION", "OTHER"];

impl GenerationResponse {
    /// Successful response with a single text part
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                parts: vec![Some(text.into())],
                finish_reason: Some("STOP".to_string()),
            }],
            block_reason: None,
            text: None,
        }
    }

    /// Reason the service blocked this exchange, if it did
    pub fn blocked_reason(&self) -> Option<String> {
        if let Some(reason) = &self.block_reason {
            return Some(format!("prompt blocked ({})", reason));
        }
        let first = self.candidates.first()?;
        let reason = first.finish_reason.as_deref()?;
        if BLOCKING_FINISH_REASONS.contains(&reason) && Self::candidate_text(first).is_empty() {
            return Some(format!("response withheld ({})", reason));
        }
        None
    }

    fn candidate_text(candidate: &Candidate) -> String {
        candidate.parts.iter().flatten().map(String::as_str).collect()
    }

    /// First candidate's text parts, then the full-text accessor
    pub fn extract_text(&self) -> Option<String> {
        let from_parts = self
            .candidates
            .first()
            .map(Self::candidate_text)
            .unwrap_or_default();
        if !from_parts.trim().is_empty() {
            return Some(from_parts);
        }
        self.text.clone().filter(|t| !t.trim().is_empty())
    }
}

/// Common trait for all generation providers
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Perform exactly one remote call
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Model identifier, for logs
    fn model_id(&self) -> &str;
}

pub mod gemini;
pub mod mock;
