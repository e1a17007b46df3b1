//! Codec error types.

use mediagraph_core::Error as CoreError;
use thiserror::Error;

/// Errors raised at the codec library boundary.
#[derive(Error, Debug)]
pub enum CodecError {
    /// No codec with this name is available.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// The codec refused to open with the given parameters.
    #[error("Could not open codec {codec}: {reason}")]
    OpenFailed { codec: String, reason: String },

    /// Options were supplied that the codec did not recognise.
    #[error("Codec {codec} left options unconsumed: {}", keys.join(", "))]
    UnconsumedOptions { codec: String, keys: Vec<String> },

    /// An option value could not be parsed.
    #[error("Invalid codec option {key}={value}")]
    InvalidOption { key: String, value: String },

    /// Decoding failed.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Encoding failed.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// Conversion between the requested formats is not available.
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Effects graph description could not be built.
    #[error("Invalid effects graph: {0}")]
    InvalidGraph(String),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Codec result type.
pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub(crate) fn open_failed(codec: &str, reason: impl Into<String>) -> Self {
        CodecError::OpenFailed {
            codec: codec.to_string(),
            reason: reason.into(),
        }
    }
}
