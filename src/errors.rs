/*!
 * Error types for the yadtwai application.
 *
 * Every failure the pipeline can observe is reduced to an `ErrorClass`, which
 * drives the retry policy in the translation client and the batch-wide
 * escalation in the coordinator. The concrete enums carry the context.
 */

use thiserror::Error;

/// Classification shared by every error in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Cooperative cancellation, never retried
    Cancelled,
    /// Network, 5xx and 429-class failures
    Retryable,
    /// Auth, permission, invalid-argument, not-found
    Fatal,
    /// The service refused to produce or return content
    ContentPolicy,
    /// A response arrived but had no usable text
    ExtractionFailure,
    /// Local read/write/decode failures
    Io,
    /// Corrupt archive or malformed package descriptor
    StructuralEpub,
}

impl ErrorClass {
    /// Whether the retry loop may try again after this class
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable | Self::ExtractionFailure)
    }

    // @returns: Short label used in error records and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
            Self::ContentPolicy => "content-policy",
            Self::ExtractionFailure => "extraction-failure",
            Self::Io => "io",
            Self::StructuralEpub => "structural-epub",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can occur when talking to the remote generation service
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// 429 from the service
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 408/504 or a client-side timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// 503 from the service
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// 500 from the service
    #[error("Internal service error: {0}")]
    Internal(String),

    /// The service gave up after its own retries
    #[error("Upstream retries exhausted: {0}")]
    UpstreamRetryExhausted(String),

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// 400 from the service
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 403 from the service
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// 401 from the service
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// 404 from the service
    #[error("Model or endpoint not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

impl ProviderError {
    /// Map an HTTP status code and body onto the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            429 => Self::RateLimited(message),
            408 | 504 => Self::Timeout(message),
            503 => Self::Unavailable(message),
            500 => Self::Internal(message),
            400 => Self::InvalidArgument(message),
            403 => Self::PermissionDenied(message),
            401 => Self::AuthenticationError(message),
            404 => Self::NotFound(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited(_)
            | Self::Timeout(_)
            | Self::Unavailable(_)
            | Self::Internal(_)
            | Self::UpstreamRetryExhausted(_)
            | Self::ConnectionError(_) => ErrorClass::Retryable,
            Self::InvalidArgument(_)
            | Self::PermissionDenied(_)
            | Self::AuthenticationError(_)
            | Self::NotFound(_) => ErrorClass::Fatal,
            Self::ApiError { status_code, .. } if *status_code >= 500 => ErrorClass::Retryable,
            Self::ApiError { .. } => ErrorClass::Fatal,
            Self::ParseError(_) => ErrorClass::ExtractionFailure,
        }
    }

    /// Outage-class failures halt admission of new work batch-wide
    pub fn is_outage(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::UpstreamRetryExhausted(_) | Self::RateLimited(_)
        )
    }
}

/// Errors that can occur while translating a chunk or a fragment
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// The run was cancelled before or during the call
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A non-retryable provider failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The retry budget ran out; carries the last failure
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts performed
        attempts: u32,
        /// The final retryable failure
        last: Box<TranslationError>,
    },

    /// The service blocked the prompt or the response
    #[error("Content blocked by the service: {0}")]
    ContentPolicy(String),

    /// The response had no usable text
    #[error("No text could be extracted from the response: {0}")]
    ExtractionFailure(String),
}

impl TranslationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Cancelled(_) => ErrorClass::Cancelled,
            Self::Provider(e) => e.class(),
            Self::RetriesExhausted { last, .. } => last.class(),
            Self::ContentPolicy(_) => ErrorClass::ContentPolicy,
            Self::ExtractionFailure(_) => ErrorClass::ExtractionFailure,
        }
    }

    /// Whether this failure should promote the batch to critical
    pub fn is_outage(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_outage(),
            Self::RetriesExhausted { last, .. } => last.is_outage(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors that can occur while reading local documents
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Error from a file operation
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive could not be opened or an entry is missing
    #[error("Archive error: {0}")]
    Archive(String),

    /// Malformed XML or HTML in the source
    #[error("Markup error: {0}")]
    Markup(String),

    /// Input kind we cannot read
    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

impl From<zip::result::ZipError> for DocumentError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}

/// Errors that abort the rebuild of one EPUB
#[derive(Error, Debug)]
pub enum EpubError {
    /// The source archive is missing or unreadable
    #[error("EPUB file error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt archive
    #[error("Bad EPUB archive: {0}")]
    Archive(String),

    /// No package descriptor could be located
    #[error("Package descriptor not found: {0}")]
    MissingPackage(String),

    /// Malformed XML in the descriptor or navigation documents
    #[error("Malformed EPUB XML in {file}: {message}")]
    Xml {
        /// Path inside the archive
        file: String,
        /// Parser message
        message: String,
    },
}

impl From<zip::result::ZipError> for EpubError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error reading an input document
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Error rebuilding an EPUB
    #[error("EPUB error: {0}")]
    Epub(#[from] EpubError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::File(_) | Self::Document(_) | Self::Unknown(_) => ErrorClass::Io,
            Self::Provider(e) => e.class(),
            Self::Translation(e) => e.class(),
            Self::Epub(_) => ErrorClass::StructuralEpub,
        }
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
