//! Error taxonomy for the pipeline.

use thiserror::Error;

/// The error taxonomy named by the error-handling design: every stage
/// failure is classified into exactly one of these variants.
#[derive(Error, Debug)]
pub enum AppError {
    /// Generic internal error not otherwise classified.
    #[error("{0}")]
    InternalAppError(String),

    /// Missing API key, unreadable workspace, or invalid CLI configuration.
    #[error("config error: {0}")]
    ConfigError(String),

    /// A required prior-stage output is absent.
    #[error("upstream missing: {0}")]
    UpstreamMissing(String),

    /// A call to an external service timed out. Transient; retried.
    #[error("external timeout: {0}")]
    ExternalTimeout(String),

    /// An external HTTP call failed. Transient; retried.
    #[error("external http error: {0}")]
    ExternalHttpError(String),

    /// An LLM returned non-JSON or schema-invalid JSON. Fatal for that unit.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Titles/abstracts drifted from canonical metadata. Fatal.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// No seed candidates survived after `max_attempts` rewrite attempts.
    #[error("seed rewrite exhausted after {attempts} attempts")]
    SeedRewriteExhausted { attempts: u32 },

    /// All seed candidates were excluded by the cutoff rule.
    #[error("cutoff removed all candidates")]
    CutoffRemovedAll,

    /// A rate limit was hit. Transient; honored with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Lower-level HTTP error surfaced from `reqwest`.
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Lower-level JSON error surfaced from `serde_json`.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Lower-level filesystem error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Lower-level CSV error.
    #[error("csv error: {0}")]
    CsvError(#[from] csv::Error),

    /// Anyhow error, kept for interop with ecosystem crates that return it.
    #[error("error: {0}")]
    AnyhowError(#[from] anyhow::Error),

    /// Tracing subscriber failed to initialize.
    #[error("tracing error: {0}")]
    TracingTryInitError(#[from] tracing_subscriber::util::TryInitError),
}

impl AppError {
    /// The short error-class name printed to the operator, per the
    /// user-visible-failure contract: "{stage}: {error_class}: {cause}".
    pub fn error_class(&self) -> &'static str {
        match self {
            AppError::InternalAppError(_) => "InternalError",
            AppError::ConfigError(_) => "ConfigError",
            AppError::UpstreamMissing(_) => "UpstreamMissing",
            AppError::ExternalTimeout(_) => "ExternalTimeout",
            AppError::ExternalHttpError(_) | AppError::HttpError(_) => "ExternalHttpError",
            AppError::ParseError(_) => "ParseError",
            AppError::ValidationError(_) => "ValidationError",
            AppError::SeedRewriteExhausted { .. } => "SeedRewriteExhausted",
            AppError::CutoffRemovedAll => "CutoffRemovedAll",
            AppError::RateLimited(_) => "RateLimited",
            AppError::JsonError(_) => "ParseError",
            AppError::IoError(_) => "ConfigError",
            AppError::CsvError(_) => "ParseError",
            AppError::AnyhowError(_) => "InternalError",
            AppError::TracingTryInitError(_) => "ConfigError",
        }
    }

    /// Whether a retry combinator should treat this as transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ExternalTimeout(_)
                | AppError::ExternalHttpError(_)
                | AppError::RateLimited(_)
                | AppError::HttpError(_)
        )
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::InternalAppError(s.to_string())
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::InternalAppError(s)
    }
}

/// Result type alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_str() {
        let error: AppError = "test error".into();
        assert!(matches!(error, AppError::InternalAppError(_)));
        assert_eq!(error.to_string(), "test error");
    }

    #[test]
    fn test_error_class() {
        assert_eq!(AppError::CutoffRemovedAll.error_class(), "CutoffRemovedAll");
        assert_eq!(
            AppError::SeedRewriteExhausted { attempts: 3 }.error_class(),
            "SeedRewriteExhausted"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::ExternalTimeout("x".into()).is_retryable());
        assert!(AppError::RateLimited("x".into()).is_retryable());
        assert!(!AppError::ParseError("x".into()).is_retryable());
        assert!(!AppError::ValidationError("x".into()).is_retryable());
    }
}
