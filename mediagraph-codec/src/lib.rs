//! # Mediagraph Codec
//!
//! The boundary between pipeline stages and whatever codec library does the
//! actual work.
//!
//! ## Contract
//!
//! Stages open every context through a [`CodecLibrary`]:
//!
//! - [`Decoder`] and [`Encoder`] for compressed streams
//! - [`Resampler`] and [`Scaler`] for format conversion
//! - [`EffectsGraph`] for textual filter chains
//!
//! Options travel as a [`CodecOptions`] dictionary. A codec removes the keys
//! it understands and the open fails if anything is left.
//!
//! ## Built-in backend
//!
//! [`BuiltinCodecs`] implements the contract with PCM, raw video, a linear
//! resampler, a nearest-neighbour scaler and a small effects chain. It is
//! enough to run complete graphs without linking a native codec library.

pub mod builtin;
pub mod error;
pub mod options;
pub mod traits;

pub use builtin::BuiltinCodecs;
pub use error::{CodecError, Result};
pub use options::CodecOptions;
pub use traits::{
    AudioParams, CodecLibrary, Decoder, EffectsGraph, Encoder, EncoderParameters, Resampler, Scaler,
    StreamParams, VideoParams,
};
