//! Source stages: turn external input units into frames.

use super::{audio_params, correlate, video_params};
use crate::options::StageOptions;
use crate::stage::{wired, InputUnit, Stage, StageContext, StageKind, Wiring};
use crate::{PipelineError, Result};
use mediagraph_codec::{AudioParams, Decoder, StreamParams, VideoParams};
use mediagraph_core::{
    timestamp::samples_to_ticks, AudioBuffer, CorrelationQueue, Frame, FrameInfo, Packet, TimeBase,
    VideoBuffer, NO_PTS,
};
use tracing::trace;

/// Raw sample bytes to audio frames.
pub struct RawAudioInput {
    params: AudioParams,
    wiring: Option<Wiring>,
}

impl RawAudioInput {
    pub const NAME: &'static str = "raw audio input";

    pub fn new(params: AudioParams) -> Self {
        Self { params, wiring: None }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        Ok(Self::new(audio_params(options, "")?))
    }
}

impl Stage for RawAudioInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn accept(&mut self, unit: InputUnit) -> Result<()> {
        let wiring = wired(&mut self.wiring, Self::NAME)?;
        let buffer = AudioBuffer::from_bytes(
            self.params.format,
            self.params.layout,
            self.params.sample_rate,
            &unit.payload,
        )?;
        let mut frame = Frame::audio(buffer, unit.metadata.pts).with_info(unit.info);
        frame.dts = unit.metadata.dts;
        wiring.downstream.send(frame, TimeBase::MPEG)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Tightly packed picture bytes to video frames.
pub struct RawVideoInput {
    params: VideoParams,
    interlaced: bool,
    wiring: Option<Wiring>,
}

impl RawVideoInput {
    pub const NAME: &'static str = "raw video input";

    pub fn new(params: VideoParams, interlaced: bool) -> Self {
        Self {
            params,
            interlaced,
            wiring: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let params = video_params(options, "")?;
        let interlaced = options.boolean("interlaced", false)?;
        Ok(Self::new(params, interlaced))
    }
}

impl Stage for RawVideoInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn accept(&mut self, unit: InputUnit) -> Result<()> {
        let wiring = wired(&mut self.wiring, Self::NAME)?;
        let mut picture = VideoBuffer::from_packed(
            self.params.format,
            self.params.width,
            self.params.height,
            &unit.payload,
        )?;
        picture.keyframe = true;
        picture.interlaced = self.interlaced;
        picture.top_field_first = self.interlaced;

        let mut frame = Frame::video(picture, unit.metadata.pts).with_info(unit.info);
        frame.dts = unit.metadata.dts;
        wiring.downstream.send(frame, TimeBase::MPEG)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Decoder plus the bookkeeping shared by both encoded inputs.
struct Decoding {
    decoder: Box<dyn Decoder>,
    pending: CorrelationQueue,
}

fn open_decoder(wiring: &mut Wiring, codec: &str, params: StreamParams) -> Result<Decoding> {
    let options = std::mem::take(&mut wiring.codec_options);
    let decoder = wiring.codecs.open_decoder(codec, &params, options)?;
    Ok(Decoding {
        decoder,
        pending: CorrelationQueue::new(),
    })
}

fn packet_of(unit: &InputUnit) -> Packet {
    Packet::new(unit.payload.clone()).with_timestamps(unit.metadata.pts, unit.metadata.dts)
}

/// Decodes compressed audio packets.
///
/// A packet may decode to several frames. The first carries the packet pts,
/// later ones advance by the samples already emitted.
pub struct EncodedAudioInput {
    codec: String,
    params: AudioParams,
    wiring: Option<Wiring>,
    decoding: Option<Decoding>,
    /// Source pts and info of the frames emitted by the current decode call.
    /// Cleared before every call so each call consumes its own entry.
    current: Option<(i64, FrameInfo)>,
    next_pts: i64,
}

impl EncodedAudioInput {
    pub const NAME: &'static str = "encoded audio input";

    pub fn new(codec: impl Into<String>, params: AudioParams) -> Self {
        Self {
            codec: codec.into(),
            params,
            wiring: None,
            decoding: None,
            current: None,
            next_pts: NO_PTS,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let codec = options.required_string("codec")?;
        Ok(Self::new(codec, audio_params(options, "")?))
    }

    fn forward(&mut self, mut frame: Frame) -> Result<()> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;

        let info = match &self.current {
            Some((source_pts, info)) if *source_pts == frame.pts => info.clone(),
            _ => {
                let info = correlate(&mut decoding.pending, frame.pts, true)?;
                self.current = Some((frame.pts, info.clone()));
                self.next_pts = frame.pts;
                info
            }
        };

        let nb_samples = frame.as_audio().map_or(0, AudioBuffer::nb_samples);
        frame.pts = self.next_pts;
        frame.dts = self.next_pts;
        if self.next_pts != NO_PTS {
            self.next_pts += samples_to_ticks(nb_samples, self.params.sample_rate, TimeBase::MPEG);
        }

        wired(&mut self.wiring, Self::NAME)?
            .downstream
            .send(frame.with_info(info), TimeBase::MPEG)
    }
}

impl Stage for EncodedAudioInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        let mut wiring = Wiring::from(ctx);
        self.decoding = Some(open_decoder(&mut wiring, &self.codec, StreamParams::Audio(self.params))?);
        self.wiring = Some(wiring);
        Ok(())
    }

    fn accept(&mut self, unit: InputUnit) -> Result<()> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let packet = packet_of(&unit);
        decoding.pending.insert(packet.pts, unit.info);
        let frames = decoding.decoder.decode(&packet)?;
        trace!(pts = packet.pts, frames = frames.len(), "decoded audio packet");
        self.current = None;
        for frame in frames {
            self.forward(frame)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            let drained = match self.decoding.as_mut() {
                Some(decoding) => decoding.decoder.drain()?,
                None => None,
            };
            match drained {
                Some(frame) => {
                    self.current = None;
                    self.forward(frame)?;
                }
                None => break,
            }
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Decodes compressed video packets.
///
/// Decoders may hold pictures back or reorder them, so the info of each
/// input unit is keyed by the decode timestamp the output frame reports.
pub struct EncodedVideoInput {
    codec: String,
    params: VideoParams,
    wiring: Option<Wiring>,
    decoding: Option<Decoding>,
}

impl EncodedVideoInput {
    pub const NAME: &'static str = "encoded video input";

    pub fn new(codec: impl Into<String>, params: VideoParams) -> Self {
        Self {
            codec: codec.into(),
            params,
            wiring: None,
            decoding: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let codec = options.required_string("codec")?;
        Ok(Self::new(codec, video_params(options, "")?))
    }

    fn forward(&mut self, frame: Frame) -> Result<()> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let info = correlate(&mut decoding.pending, frame.pts, false)?;
        wired(&mut self.wiring, Self::NAME)?
            .downstream
            .send(frame.with_info(info), TimeBase::MPEG)
    }
}

impl Stage for EncodedVideoInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        let mut wiring = Wiring::from(ctx);
        self.decoding = Some(open_decoder(&mut wiring, &self.codec, StreamParams::Video(self.params))?);
        self.wiring = Some(wiring);
        Ok(())
    }

    fn accept(&mut self, unit: InputUnit) -> Result<()> {
        let decoding = self
            .decoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let packet = packet_of(&unit);
        let key = if packet.dts != NO_PTS { packet.dts } else { packet.pts };
        decoding.pending.insert(key, unit.info);
        let frames = decoding.decoder.decode(&packet)?;
        trace!(dts = packet.dts, frames = frames.len(), "decoded video packet");
        for frame in frames {
            self.forward(frame)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            let drained = match self.decoding.as_mut() {
                Some(decoding) => decoding.decoder.drain()?,
                None => None,
            };
            match drained {
                Some(frame) => self.forward(frame)?,
                None => break,
            }
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}
