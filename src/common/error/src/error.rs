//! Core error types for Requel.

use thiserror::Error;

/// Result type alias using `RequelError`.
pub type RequelResult<T> = std::result::Result<T, RequelError>;

/// Core error type for Requel operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequelError {
    /// The host plan extractor could not produce a logical plan.
    #[error("ExtractionError: {0}")]
    Extraction(String),

    /// SQL construct outside the supported subset.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Canonicalization failed to reach a fixpoint within the pass cap.
    #[error("CanonicalizationError: {0}")]
    Canonicalization(String),

    /// Validation could not produce a verdict.
    #[error("ValidationError: {0}")]
    Validation(String),

    /// An LLM provider returned a failure response.
    #[error("ProviderError: {0}")]
    Provider(String),

    /// No registered provider is available for generation.
    #[error("ProviderUnavailable: {0}")]
    ProviderUnavailable(String),

    /// A deadline expired before the operation completed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The host cost model declined to estimate a plan.
    #[error("CostEstimationError: {0}")]
    CostEstimation(String),

    /// Invalid or inconsistent configuration.
    #[error("ConfigError: {0}")]
    Config(String),

    /// Internal error (bug in Requel).
    #[error("InternalError: {0}")]
    Internal(String),

    /// IO error.
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl RequelError {
    /// Create a new `Extraction` error.
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a new `Unsupported` error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new `Canonicalization` error.
    pub fn canonicalization<S: Into<String>>(msg: S) -> Self {
        Self::Canonicalization(msg.into())
    }

    /// Create a new `Validation` error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new `Provider` error.
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new `ProviderUnavailable` error.
    pub fn provider_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Create a new `Timeout` error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new `CostEstimation` error.
    pub fn cost_estimation<S: Into<String>>(msg: S) -> Self {
        Self::CostEstimation(msg.into())
    }

    /// Create a new `Config` error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new `Internal` error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Ensure a condition holds, returning the named error variant if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::RequelError::Internal($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::RequelError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with an `Unsupported` error.
#[macro_export]
macro_rules! unsupported_err {
    ($($arg:tt)*) => {
        return Err($crate::RequelError::Unsupported(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RequelError::extraction("window functions are not modeled");
        assert_eq!(
            err.to_string(),
            "ExtractionError: window functions are not modeled"
        );
    }

    #[test]
    fn test_error_constructors() {
        let _ = RequelError::unsupported("CTE");
        let _ = RequelError::canonicalization("pass cap exceeded");
        let _ = RequelError::provider_unavailable("no active provider");
        let _ = RequelError::timeout("candidate validation");
        let _ = RequelError::internal("unexpected state");
    }
}
