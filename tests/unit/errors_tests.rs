/*!
 * Tests for error classification
 */

use yadtwai::errors::{AppError, EpubError, ErrorClass, ProviderError, TranslationError};

#[test]
fn test_fromStatus_shouldClassifyHttpCodes() {
    assert_eq!(ProviderError::from_status(429, "").class(), ErrorClass::Retryable);
    assert_eq!(ProviderError::from_status(503, "").class(), ErrorClass::Retryable);
    assert_eq!(ProviderError::from_status(504, "").class(), ErrorClass::Retryable);
    assert_eq!(ProviderError::from_status(502, "").class(), ErrorClass::Retryable);
    assert_eq!(ProviderError::from_status(400, "").class(), ErrorClass::Fatal);
    assert_eq!(ProviderError::from_status(401, "").class(), ErrorClass::Fatal);
    assert_eq!(ProviderError::from_status(403, "").class(), ErrorClass::Fatal);
    assert_eq!(ProviderError::from_status(404, "").class(), ErrorClass::Fatal);
    assert_eq!(ProviderError::from_status(418, "").class(), ErrorClass::Fatal);
}

#[test]
fn test_isOutage_shouldCoverUnavailabilityOnly() {
    assert!(ProviderError::Unavailable("x".into()).is_outage());
    assert!(ProviderError::RateLimited("x".into()).is_outage());
    assert!(ProviderError::UpstreamRetryExhausted("x".into()).is_outage());
    assert!(!ProviderError::Timeout("x".into()).is_outage());
    assert!(!ProviderError::AuthenticationError("x".into()).is_outage());

    let wrapped = TranslationError::RetriesExhausted {
        attempts: 3,
        last: Box::new(TranslationError::Provider(ProviderError::Unavailable("x".into()))),
    };
    assert!(wrapped.is_outage());
    assert_eq!(wrapped.class(), ErrorClass::Retryable);
}

#[test]
fn test_classes_shouldDriveRetryDecision() {
    assert!(ErrorClass::Retryable.is_retryable());
    assert!(ErrorClass::ExtractionFailure.is_retryable());
    assert!(!ErrorClass::Fatal.is_retryable());
    assert!(!ErrorClass::ContentPolicy.is_retryable());
    assert!(!ErrorClass::Cancelled.is_retryable());
    assert_eq!(ProviderError::ParseError("bad json".into()).class(), ErrorClass::ExtractionFailure);
}

#[test]
fn test_appError_shouldMapLocalFailures() {
    let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert_eq!(io.class(), ErrorClass::Io);
    let epub: AppError = EpubError::MissingPackage("META-INF/container.xml".into()).into();
    assert_eq!(epub.class(), ErrorClass::StructuralEpub);
    assert_eq!(ErrorClass::StructuralEpub.to_string(), "structural-epub");
}
