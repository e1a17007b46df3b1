//! Reference backend with no external library behind it.
//!
//! | codec | media | notes |
//! |---|---|---|
//! | `pcm_s16le`, `pcm_f32le` | audio | options `frame_size`, `delay` (encoder) |
//! | `rawvideo` | video | options `delay`, `reorder`, `frame_rate`, `flags`, `profile`, `level` |
//!
//! Resampling is linear, scaling is nearest neighbour and the effects graph
//! understands a handful of filters (see [`effects`]).

pub mod effects;
pub mod pcm;
pub mod rawvideo;
pub mod resample;
pub mod scale;

use crate::error::{CodecError, Result};
use crate::options::CodecOptions;
use crate::traits::{
    AudioParams, CodecLibrary, Decoder, EffectsGraph, Encoder, Resampler, Scaler, StreamParams,
    VideoParams,
};
use effects::EffectChain;
use pcm::{PcmDecoder, PcmEncoder, PcmKind};
use rawvideo::{RawVideoDecoder, RawVideoEncoder};
use resample::LinearResampler;
use scale::NearestScaler;
use tracing::debug;

/// The built-in codec library.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecs;

impl BuiltinCodecs {
    pub fn new() -> Self {
        Self
    }

    /// Names accepted by `open_decoder` and `open_encoder`.
    pub fn codec_names() -> &'static [&'static str] {
        &["pcm_s16le", "pcm_f32le", "rawvideo"]
    }
}

fn wrong_media(codec: &str, params: &StreamParams) -> CodecError {
    let media = match params {
        StreamParams::Audio(_) => "audio",
        StreamParams::Video(_) => "video",
    };
    CodecError::open_failed(codec, format!("cannot handle {} streams", media))
}

impl CodecLibrary for BuiltinCodecs {
    fn open_decoder(
        &self,
        codec: &str,
        params: &StreamParams,
        options: CodecOptions,
    ) -> Result<Box<dyn Decoder>> {
        debug!(codec, ?params, "opening decoder");
        match (PcmKind::from_name(codec), params) {
            (Some(kind), StreamParams::Audio(audio)) => {
                Ok(Box::new(PcmDecoder::open(kind, *audio, options)?))
            }
            (None, StreamParams::Video(video)) if codec == "rawvideo" => {
                Ok(Box::new(RawVideoDecoder::open(*video, options)?))
            }
            (Some(_), _) => Err(wrong_media(codec, params)),
            (None, _) if codec == "rawvideo" => Err(wrong_media(codec, params)),
            (None, _) => Err(CodecError::UnknownCodec(codec.to_string())),
        }
    }

    fn open_encoder(
        &self,
        codec: &str,
        params: &StreamParams,
        options: CodecOptions,
    ) -> Result<Box<dyn Encoder>> {
        debug!(codec, ?params, "opening encoder");
        match (PcmKind::from_name(codec), params) {
            (Some(kind), StreamParams::Audio(audio)) => {
                Ok(Box::new(PcmEncoder::open(kind, *audio, options)?))
            }
            (None, StreamParams::Video(video)) if codec == "rawvideo" => {
                Ok(Box::new(RawVideoEncoder::open(*video, options)?))
            }
            (Some(_), _) => Err(wrong_media(codec, params)),
            (None, _) if codec == "rawvideo" => Err(wrong_media(codec, params)),
            (None, _) => Err(CodecError::UnknownCodec(codec.to_string())),
        }
    }

    fn open_resampler(&self, input: AudioParams, output: AudioParams) -> Result<Box<dyn Resampler>> {
        debug!(?input, ?output, "opening resampler");
        Ok(Box::new(LinearResampler::new(input, output)?))
    }

    fn open_scaler(&self, input: VideoParams, output: VideoParams) -> Result<Box<dyn Scaler>> {
        debug!(?input, ?output, "opening scaler");
        Ok(Box::new(NearestScaler::new(input, output)?))
    }

    fn open_effects(&self, description: &str, input: &StreamParams) -> Result<Box<dyn EffectsGraph>> {
        debug!(description, "opening effects graph");
        Ok(Box::new(EffectChain::parse(description, input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagraph_core::{ChannelLayout, PixelFormat, SampleFormat};

    fn audio() -> StreamParams {
        StreamParams::Audio(AudioParams {
            sample_rate: 48000,
            layout: ChannelLayout::Stereo,
            format: SampleFormat::S16,
        })
    }

    fn video() -> StreamParams {
        StreamParams::Video(VideoParams {
            width: 16,
            height: 16,
            format: PixelFormat::Yuv420p,
        })
    }

    #[test]
    fn test_open_by_name() {
        let codecs = BuiltinCodecs::new();
        assert!(codecs.open_decoder("pcm_s16le", &audio(), CodecOptions::new()).is_ok());
        assert!(codecs.open_encoder("rawvideo", &video(), CodecOptions::new()).is_ok());
        assert_eq!(
            codecs
                .open_decoder("pcm_f32le", &audio(), CodecOptions::new())
                .unwrap()
                .name(),
            "pcm_f32le"
        );
    }

    #[test]
    fn test_media_mismatch_and_unknown() {
        let codecs = BuiltinCodecs::new();
        assert!(matches!(
            codecs.open_encoder("pcm_s16le", &video(), CodecOptions::new()).err(),
            Some(CodecError::OpenFailed { .. })
        ));
        assert!(matches!(
            codecs.open_decoder("rawvideo", &audio(), CodecOptions::new()).err(),
            Some(CodecError::OpenFailed { .. })
        ));
        assert!(matches!(
            codecs.open_decoder("h264", &video(), CodecOptions::new()).err(),
            Some(CodecError::UnknownCodec(_))
        ));
    }
}
