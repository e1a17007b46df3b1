//! Error types for the core crate.

use thiserror::Error;

/// Main error type for core media types.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unsupported sample or pixel format.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Payload does not fit the declared layout.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Frame metadata could not be re-associated with a frame.
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),
}

/// Failures of the PTS-keyed correlation queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// No queued metadata carries the requested timestamp.
    #[error("no frame info queued for pts {pts}")]
    NotFound { pts: i64 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Whether this error is a missing correlation entry.
    #[must_use]
    pub fn is_correlation(&self) -> bool {
        matches!(self, Error::Correlation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_param("sample_rate must be positive");
        assert_eq!(err.to_string(), "Invalid parameter: sample_rate must be positive");
    }

    #[test]
    fn test_correlation_conversion() {
        let err: Error = CorrelationError::NotFound { pts: 42 }.into();
        assert!(err.is_correlation());
        assert_eq!(
            err.to_string(),
            "Correlation error: no frame info queued for pts 42"
        );
    }

    #[test]
    fn test_buffer_too_small_display() {
        let err = Error::BufferTooSmall { needed: 8, available: 3 };
        assert_eq!(err.to_string(), "Buffer too small: need 8 bytes, have 3");
    }
}
