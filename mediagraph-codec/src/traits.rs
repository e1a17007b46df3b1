//! The codec library contract.
//!
//! Stages never touch codec internals. They open contexts through a
//! [`CodecLibrary`] and drive them through these traits:
//!
//! - [`Decoder`] / [`Encoder`] - compressed <-> raw conversion
//! - [`Resampler`] / [`Scaler`] - format conversion
//! - [`EffectsGraph`] - push/pull filter graphs
//!
//! Every context may hold frames back internally. Callers extract the
//! remainder at end of stream with repeated `drain` calls until `None`.

use crate::error::Result;
use crate::options::CodecOptions;
use mediagraph_core::{
    AudioBuffer, ChannelLayout, Frame, FrameData, Packet, PixelFormat, Rational, SampleFormat, TimeBase,
    VideoBuffer,
};

/// Audio stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub format: SampleFormat,
}

impl AudioParams {
    /// Parameters describing an existing buffer.
    pub fn of(buffer: &AudioBuffer) -> Self {
        Self {
            sample_rate: buffer.sample_rate,
            layout: buffer.layout,
            format: buffer.format,
        }
    }
}

/// Video stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl VideoParams {
    /// Parameters describing an existing picture.
    pub fn of(buffer: &VideoBuffer) -> Self {
        Self {
            width: buffer.width,
            height: buffer.height,
            format: buffer.format,
        }
    }
}

/// Parameters of either media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamParams {
    Audio(AudioParams),
    Video(VideoParams),
}

impl StreamParams {
    /// Parameters describing an existing frame.
    pub fn of(frame: &Frame) -> Self {
        match &frame.data {
            FrameData::Audio(audio) => Self::Audio(AudioParams::of(audio)),
            FrameData::Video(video) => Self::Video(VideoParams::of(video)),
        }
    }
}

/// What an opened encoder reports about its output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParameters {
    /// Canonical codec name.
    pub codec: String,
    /// Codec profile, -1 when not applicable.
    pub profile: i32,
    /// Codec level, -1 when not applicable.
    pub level: i32,
    /// Time base of frame and packet timestamps.
    pub time_base: TimeBase,
    /// Samples per input frame for fixed-block audio codecs.
    pub frame_size: Option<usize>,
    /// Out-of-band configuration data.
    pub extradata: Vec<u8>,
    /// Interlaced coding was requested.
    pub interlaced: bool,
    /// Pixel aspect ratio for video.
    pub sample_aspect_ratio: Rational,
    /// Stream the encoder consumes.
    pub stream: StreamParams,
}

/// Compressed-to-raw converter.
pub trait Decoder: Send {
    /// Codec name.
    fn name(&self) -> &str;

    /// Decode a packet into zero or more frames.
    ///
    /// Output frames carry the timestamp of the packet that produced them.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>>;

    /// Take one buffered frame at end of stream.
    fn drain(&mut self) -> Result<Option<Frame>>;
}

/// Raw-to-compressed converter.
pub trait Encoder: Send {
    /// Output stream description.
    fn parameters(&self) -> &EncoderParameters;

    /// Encode a frame whose pts is in the encoder time base.
    ///
    /// Returns `None` while the encoder is still buffering.
    fn encode(&mut self, frame: &Frame) -> Result<Option<Packet>>;

    /// Take one buffered packet at end of stream.
    fn drain(&mut self) -> Result<Option<Packet>>;
}

/// Sample rate, layout and format converter.
pub trait Resampler: Send {
    /// Convert one buffer. The output length depends on the rate ratio.
    fn convert(&mut self, input: &AudioBuffer) -> Result<AudioBuffer>;

    /// Take buffered samples at end of stream.
    fn drain(&mut self) -> Result<Option<AudioBuffer>>;
}

/// Picture size and pixel format converter.
pub trait Scaler: Send {
    fn scale(&mut self, input: &VideoBuffer) -> Result<VideoBuffer>;
}

/// A configured push/pull filter graph.
pub trait EffectsGraph: Send {
    /// Feed one frame in.
    fn push(&mut self, frame: Frame) -> Result<()>;

    /// Take one output frame, `None` when nothing is ready.
    fn pull(&mut self) -> Result<Option<Frame>>;

    /// Signal end of input so buffered frames become pullable.
    fn close(&mut self) -> Result<()>;
}

/// Factory for every codec and filter context.
pub trait CodecLibrary: Send + Sync {
    /// Open a decoder producing frames with `params`.
    fn open_decoder(
        &self,
        codec: &str,
        params: &StreamParams,
        options: CodecOptions,
    ) -> Result<Box<dyn Decoder>>;

    /// Open an encoder consuming frames with `params`.
    fn open_encoder(
        &self,
        codec: &str,
        params: &StreamParams,
        options: CodecOptions,
    ) -> Result<Box<dyn Encoder>>;

    /// Open a resampler between two audio configurations.
    fn open_resampler(&self, input: AudioParams, output: AudioParams) -> Result<Box<dyn Resampler>>;

    /// Open a scaler between two picture configurations.
    fn open_scaler(&self, input: VideoParams, output: VideoParams) -> Result<Box<dyn Scaler>>;

    /// Build an effects graph from a textual description.
    fn open_effects(&self, description: &str, input: &StreamParams) -> Result<Box<dyn EffectsGraph>>;
}
