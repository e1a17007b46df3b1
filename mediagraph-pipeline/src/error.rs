//! Pipeline error types.

use mediagraph_codec::CodecError;
use mediagraph_core::Error as CoreError;
use thiserror::Error;

/// Pipeline error type.
///
/// Every variant is fatal to the session. Transient "no output yet" results
/// from codecs are not errors and never reach this type.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The graph names a stage the registry does not know.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A stage option could not be parsed as its declared type.
    #[error("Invalid option {key}={value} for stage {stage}: expected {expected}")]
    InvalidOption {
        stage: String,
        key: String,
        value: String,
        expected: &'static str,
    },

    /// A frame or declared format cannot be handled by the stage.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stage was used before `init`.
    #[error("Stage {0} not initialized")]
    NotInitialized(String),

    /// Codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Core error, including correlation failures.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// A fan-out branch worker failed.
    #[error("Branch {branch} failed: {source}")]
    BranchFailed {
        branch: u64,
        #[source]
        source: Box<PipelineError>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph description could not be parsed.
    #[error("Graph description error: {0}")]
    Description(#[from] serde_json::Error),
}

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the session must stop. Always true: there is no recovery path.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// True when the root cause is a missing correlation entry.
    pub fn is_correlation(&self) -> bool {
        match self {
            PipelineError::Core(e) => e.is_correlation(),
            PipelineError::BranchFailed { source, .. } => source.is_correlation(),
            _ => false,
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        PipelineError::UnsupportedFormat(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PipelineError::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagraph_core::CorrelationError;

    #[test]
    fn test_correlation_through_branch() {
        let err = PipelineError::BranchFailed {
            branch: 3,
            source: Box::new(CoreError::from(CorrelationError::NotFound { pts: 42 }).into()),
        };
        assert!(err.is_correlation());
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Branch 3 failed: Core error: Correlation error: no frame info queued for pts 42"
        );
    }

    #[test]
    fn test_invalid_option_display() {
        let err = PipelineError::InvalidOption {
            stage: "raw audio input".into(),
            key: "sample_rate".into(),
            value: "fast".into(),
            expected: "integer",
        };
        assert_eq!(
            err.to_string(),
            "Invalid option sample_rate=fast for stage raw audio input: expected integer"
        );
    }
}
