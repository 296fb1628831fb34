/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scripted provider that simulates different behaviors:
 * - `MockProvider::working()` - Echoes the prompt back (optionally transformed)
 * - `MockProvider::failing_then_ok(n, err)` - Fails `n` times, then succeeds
 * - `MockProvider::failing(err)` - Always fails with the given error
 * - `MockProvider::blocked()` / `MockProvider::empty()` - Policy block / no text
 *
 * Every call is recorded with its (tokio) instant so tests can assert on
 * attempt counts and backoff spacing.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Candidate, GenerationRequest, GenerationResponse, Provider};

/// Behavior mode for the mock provider
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails the first `failures` calls with `error`, then succeeds
    FailThenSucceed { failures: usize, error: ProviderError },
    /// Always fails with `error`
    Failing(ProviderError),
    /// The prompt is blocked on policy grounds
    Blocked,
    /// A response with no usable text
    Empty,
    /// Simulates slow response
    Slow { delay_ms: u64 },
}

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;
type CallHook = Arc<dyn Fn(usize) + Send + Sync>;

/// One recorded call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub at: tokio::time::Instant,
    pub prompt: String,
}

/// Mock provider for testing translation behavior
#[derive(Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter
    request_count: Arc<AtomicUsize>,
    /// Recorded calls
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    /// Maps the prompt to the response text (default: echo)
    responder: Option<Responder>,
    /// Invoked with the zero-based call index before the call resolves
    on_call: Option<CallHook>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("behavior", &self.behavior)
            .field("request_count", &self.request_count.load(Ordering::SeqCst))
            .finish()
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: None,
            on_call: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Fail `failures` times with `error`, then succeed
    pub fn failing_then_ok(failures: usize, error: ProviderError) -> Self {
        Self::new(MockBehavior::FailThenSucceed { failures, error })
    }

    /// Create a failing mock provider that always errors
    pub fn failing(error: ProviderError) -> Self {
        Self::new(MockBehavior::Failing(error))
    }

    /// Create a mock whose prompts are always blocked
    pub fn blocked() -> Self {
        Self::new(MockBehavior::Blocked)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that waits before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Run `hook(call_index)` on every call, before it resolves
    pub fn with_call_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_call = Some(Arc::new(hook));
        self
    }

    /// Number of calls made so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn respond(&self, prompt: &str) -> GenerationResponse {
        let text = match &self.responder {
            Some(responder) => responder(prompt),
            None => prompt.to_string(),
        };
        GenerationResponse::from_text(text)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            at: tokio::time::Instant::now(),
            prompt: request.prompt.clone(),
        });
        if let Some(hook) = &self.on_call {
            hook(count);
        }

        match &self.behavior {
            MockBehavior::Working => Ok(self.respond(&request.prompt)),
            MockBehavior::FailThenSucceed { failures, error } => {
                if count < *failures {
                    Err(error.clone())
                } else {
                    Ok(self.respond(&request.prompt))
                }
            }
            MockBehavior::Failing(error) => Err(error.clone()),
            MockBehavior::Blocked => Ok(GenerationResponse {
                candidates: Vec::new(),
                block_reason: Some("SAFETY".to_string()),
                text: None,
            }),
            MockBehavior::Empty => Ok(GenerationResponse {
                candidates: vec![Candidate {
                    parts: vec![None],
                    finish_reason: Some("STOP".to_string()),
                }],
                block_reason: None,
                text: None,
            }),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(self.respond(&request.prompt))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.behavior {
            MockBehavior::Failing(error) => Err(error.clone()),
            _ => Ok(()),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}
