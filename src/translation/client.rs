/*!
 * Single-call translation client.
 *
 * Wraps a `Provider` with the retry policy: cancellation checks before every
 * attempt and at every sleep tick, exponential backoff for retryable
 * failures, block detection and text extraction on success.
 */

use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{Config, RetryConfig};
use crate::errors::TranslationError;
use crate::providers::{GenerationRequest, Provider};
use crate::translation::cancellation::RunSignals;

/// Retry budget and backoff shape
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Sleep granularity; bounds cancellation latency
    pub tick: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, tick: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            tick,
        }
    }

    /// `base * 2^(attempt-1)` for the wait after failed `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.tick())
    }
}

/// Shared, read-only handle used by every worker
#[derive(Debug, Clone)]
pub struct TranslationClient {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    temperature: f32,
    post_request_delay: Duration,
    signals: RunSignals,
}

impl TranslationClient {
    pub fn new(provider: Arc<dyn Provider>, policy: RetryPolicy, signals: RunSignals) -> Self {
        Self {
            provider,
            policy,
            temperature: 1.0,
            post_request_delay: Duration::ZERO,
            signals,
        }
    }

    /// Client configured from the application settings
    pub fn from_config(provider: Arc<dyn Provider>, config: &Config, signals: RunSignals) -> Self {
        Self::new(provider, RetryPolicy::from(&config.retry), signals)
            .with_temperature(config.temperature)
            .with_post_request_delay(config.model.post_request_delay())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_post_request_delay(mut self, delay: Duration) -> Self {
        self.post_request_delay = delay;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn signals(&self) -> &RunSignals {
        &self.signals
    }

    /// Translate one prompt (chunk already substituted)
    ///
    /// `context` identifies the caller in logs, e.g. `"chapter1.xhtml [2/5]"`.
    pub async fn translate(&self, prompt: &str, context: &str) -> Result<String, TranslationError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error: Option<TranslationError> = None;

        for attempt in 1..=max_attempts {
            self.signals.check(context)?;
            debug!("{}: attempt {}/{}", context, attempt, max_attempts);

            let request = GenerationRequest {
                prompt: prompt.to_string(),
                temperature: self.temperature,
            };

            let failure = match self.provider.generate(request).await {
                Ok(response) => {
                    if let Some(reason) = response.blocked_reason() {
                        error!("{}: content blocked: {}", context, reason);
                        return Err(TranslationError::ContentPolicy(reason));
                    }
                    match response.extract_text() {
                        Some(text) => {
                            if !self.post_request_delay.is_zero() {
                                debug!("{}: post-call delay {:?}", context, self.post_request_delay);
                                self.signals
                                    .sleep(self.post_request_delay, self.policy.tick, context)
                                    .await?;
                            }
                            return Ok(text);
                        }
                        None => TranslationError::ExtractionFailure(format!(
                            "empty response from {}",
                            self.provider.model_id()
                        )),
                    }
                }
                Err(e) => TranslationError::Provider(e),
            };

            let class = failure.class();
            if !class.is_retryable() {
                error!("{}: {} error, not retrying: {}", context, class, failure);
                return Err(failure);
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff_delay(attempt);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    context, attempt, max_attempts, failure, delay
                );
                last_error = Some(failure);
                self.signals.sleep(delay, self.policy.tick, context).await?;
            } else {
                last_error = Some(failure);
            }
        }

        let last = last_error.unwrap_or_else(|| {
            TranslationError::ExtractionFailure("no attempt was made".to_string())
        });
        error!("{}: giving up after {} attempts: {}", context, max_attempts, last);
        Err(TranslationError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }
}
