/*!
 * Tests for the retrying translation client
 */

use std::sync::Arc;
use std::time::Duration;

use yadtwai::errors::{ErrorClass, ProviderError, TranslationError};
use yadtwai::providers::mock::MockProvider;
use yadtwai::translation::{RetryPolicy, RunSignals, TranslationClient};

fn client(mock: &MockProvider, max_attempts: u32) -> (TranslationClient, RunSignals) {
    let signals = RunSignals::new();
    let policy = RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_millis(100));
    let client = TranslationClient::new(Arc::new(mock.clone()), policy, signals.clone());
    (client, signals)
}

#[tokio::test(start_paused = true)]
async fn test_translate_transientFailures_shouldBackOffAndSucceedOnce() {
    let mock = MockProvider::failing_then_ok(2, ProviderError::Unavailable("busy".into()))
        .with_responder(|p| format!("translated: {}", p));
    let (client, _) = client(&mock, 4);

    let text = client.translate("hello", "test").await.unwrap();
    assert_eq!(text, "translated: hello");
    assert_eq!(mock.request_count(), 3);

    let calls = mock.calls();
    let first_gap = calls[1].at - calls[0].at;
    let second_gap = calls[2].at - calls[1].at;
    assert!(first_gap >= Duration::from_secs(1));
    assert!(second_gap >= Duration::from_secs(2));
    assert!(second_gap > first_gap);
}

#[tokio::test(start_paused = true)]
async fn test_translate_exhaustedBudget_shouldStopAtCap() {
    let mock = MockProvider::failing(ProviderError::Timeout("slow".into()));
    let (client, _) = client(&mock, 3);

    let err = client.translate("hello", "test").await.unwrap_err();
    assert_eq!(mock.request_count(), 3);
    match err {
        TranslationError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.class(), ErrorClass::Retryable);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_translate_fatalError_shouldNotRetry() {
    let mock = MockProvider::failing(ProviderError::AuthenticationError("bad key".into()));
    let (client, _) = client(&mock, 3);

    let err = client.translate("hello", "test").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert!(!err.is_outage());
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_translate_blockedContent_shouldFailImmediately() {
    let mock = MockProvider::blocked();
    let (client, _) = client(&mock, 3);

    let err = client.translate("hello", "test").await.unwrap_err();
    assert!(matches!(err, TranslationError::ContentPolicy(_)));
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_translate_emptyResponses_shouldRetryAsExtractionFailure() {
    let mock = MockProvider::empty();
    let (client, _) = client(&mock, 2);

    let err = client.translate("hello", "test").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::ExtractionFailure);
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_translate_cancelDuringBackoff_shouldAbortWithoutAnotherAttempt() {
    let mock = MockProvider::failing(ProviderError::Unavailable("down".into()));
    let (client, signals) = client(&mock, 5);

    let canceller = signals.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = client.translate("hello", "test").await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(mock.request_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_translate_outageAfterRetries_shouldBeFlaggedAsOutage() {
    let mock = MockProvider::failing(ProviderError::RateLimited("quota".into()));
    let (client, _) = client(&mock, 2);

    let err = client.translate("hello", "test").await.unwrap_err();
    assert!(err.is_outage());
}
