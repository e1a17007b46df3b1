//! Sink stages: write frames and packets to the output channel.
//!
//! Every record carries 90 kHz timestamps. Encoded sinks stash the frame
//! info under the pts they hand the encoder and pick it up again from the
//! packet that comes out.

use super::{audio_params, correlate, video_params, OutputPin};
use crate::options::StageOptions;
use crate::output::{AudioHeader, MediaHeader, VideoHeader};
use crate::stage::{wired, Stage, StageContext, StageKind, Wiring};
use crate::{PipelineError, Result};
use mediagraph_codec::{AudioParams, Encoder, EncoderParameters, StreamParams, VideoParams};
use mediagraph_core::{
    timestamp::samples_to_ticks, AudioBuffer, CorrelationQueue, Frame, FrameInfo, Packet, Rational,
    TimeBase, NO_PTS,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Encoders are opened one at a time across the process.
static ENCODER_OPEN: Mutex<()> = Mutex::new(());

/// Codec name written for unencoded output.
const RAW: &str = "raw";

fn audio_header(codec: &str, profile: i32, level: i32, params: &AudioParams, extradata: &[u8]) -> AudioHeader {
    AudioHeader {
        codec: codec.to_string(),
        profile,
        level,
        sample_rate: params.sample_rate,
        sample_format: params.format.name().to_string(),
        channel_layout: params.layout.name(),
        extradata: extradata.to_vec(),
    }
}

/// Writes audio frames as they are.
pub struct RawAudioOutput {
    pin: OutputPin,
    wiring: Option<Wiring>,
}

impl RawAudioOutput {
    pub const NAME: &'static str = "raw audio output";

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        Ok(Self {
            pin: OutputPin::from_options(options)?,
            wiring: None,
        })
    }
}

impl Stage for RawAudioOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let wiring = wired(&mut self.wiring, Self::NAME)?;
        let audio = frame
            .as_audio()
            .ok_or_else(|| PipelineError::unsupported("raw audio output got a video frame"))?;
        let pts = time_base.convert(frame.pts, TimeBase::MPEG);
        let header = MediaHeader::Audio(audio_header(RAW, -1, -1, &AudioParams::of(audio), &[]));
        let record = self.pin.frame(&frame.info, (pts, pts, 0), audio.to_bytes(), header);
        wiring.output.write_frame(record)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Writes pictures with their planes packed tightly.
pub struct RawVideoOutput {
    pin: OutputPin,
    wiring: Option<Wiring>,
}

impl RawVideoOutput {
    pub const NAME: &'static str = "raw video output";

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        Ok(Self {
            pin: OutputPin::from_options(options)?,
            wiring: None,
        })
    }
}

impl Stage for RawVideoOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let wiring = wired(&mut self.wiring, Self::NAME)?;
        let picture = frame
            .as_video()
            .ok_or_else(|| PipelineError::unsupported("raw video output got an audio frame"))?;
        let pts = time_base.convert(frame.pts, TimeBase::MPEG);
        let header = MediaHeader::Video(VideoHeader {
            codec: RAW.to_string(),
            profile: -1,
            level: -1,
            keyframe: picture.keyframe,
            interlaced: picture.interlaced,
            width: picture.width,
            height: picture.height,
            pixel_format: picture.format.name().to_string(),
            pixel_aspect_ratio: picture.sample_aspect_ratio,
            frame_rate: None,
            extradata: Vec::new(),
        });
        let record = self.pin.frame(&frame.info, (pts, pts, 0), picture.to_packed(), header);
        wiring.output.write_frame(record)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Encoder state shared by both encoded sinks.
struct Encoding {
    encoder: Box<dyn Encoder>,
    pending: CorrelationQueue,
}

impl Encoding {
    fn time_base(&self) -> TimeBase {
        self.encoder.parameters().time_base
    }

    /// Stash `info`, encode `frame` (pts already in the codec time base).
    fn encode(&mut self, frame: &Frame, info: FrameInfo) -> Result<Option<Packet>> {
        self.pending.insert(frame.pts, info);
        Ok(self.encoder.encode(frame)?)
    }
}

fn open_encoder(wiring: &mut Wiring, codec: &str, params: StreamParams) -> Result<Encoding> {
    let options = std::mem::take(&mut wiring.codec_options);
    let encoder = {
        let _guard = ENCODER_OPEN.lock();
        wiring.codecs.open_encoder(codec, &params, options)?
    };
    let parameters = encoder.parameters();
    debug!(
        codec = %parameters.codec,
        time_base = %parameters.time_base,
        frame_size = ?parameters.frame_size,
        "encoder opened"
    );
    Ok(Encoding {
        encoder,
        pending: CorrelationQueue::new(),
    })
}

/// Encodes audio in blocks of the codec frame size.
///
/// Incoming samples collect in an operating buffer. Whenever a full block is
/// available it is encoded with a pts derived from the frame that completed
/// it, so blocks keep a continuous 90 kHz timeline.
pub struct EncodedAudioOutput {
    codec: String,
    params: AudioParams,
    pin: OutputPin,
    skip_initial_packets: u32,
    skipped: u32,
    wiring: Option<Wiring>,
    encoding: Option<Encoding>,
    buffer: AudioBuffer,
    /// 90 kHz pts of the first buffered sample.
    operating_pts: i64,
    /// Info of the frame most recently buffered.
    operating_info: FrameInfo,
}

impl EncodedAudioOutput {
    pub const NAME: &'static str = "encoded audio output";

    pub fn new(codec: impl Into<String>, params: AudioParams, pin: OutputPin, skip_initial_packets: u32) -> Self {
        Self {
            codec: codec.into(),
            params,
            pin,
            skip_initial_packets,
            skipped: 0,
            wiring: None,
            encoding: None,
            buffer: AudioBuffer::new(params.format, params.layout, params.sample_rate, 0),
            operating_pts: NO_PTS,
            operating_info: FrameInfo::default(),
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let codec = options.required_string("codec")?;
        let pin = OutputPin::from_options(options)?;
        let params = audio_params(options, "")?;
        let skip = options.unsigned("skip_initial_packets", 0)?;
        Ok(Self::new(codec, params, pin, skip))
    }

    fn ticks(&self, nb_samples: usize) -> i64 {
        samples_to_ticks(nb_samples, self.params.sample_rate, TimeBase::MPEG)
    }

    /// Encode up to `count` buffered samples as one block.
    fn encode_block(&mut self, count: usize) -> Result<()> {
        let encoding = self
            .encoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let block = self.buffer.take_front(count);
        let nb_samples = block.nb_samples();
        let codec_pts = TimeBase::MPEG.convert(self.operating_pts, encoding.time_base());
        let packet = encoding.encode(&Frame::audio(block, codec_pts), self.operating_info.clone())?;
        if self.operating_pts != NO_PTS {
            self.operating_pts += self.ticks(nb_samples);
        }
        match packet {
            Some(packet) => self.emit(packet),
            None => Ok(()),
        }
    }

    fn emit(&mut self, packet: Packet) -> Result<()> {
        let (encoding, wiring) = match (self.encoding.as_mut(), self.wiring.as_mut()) {
            (Some(encoding), Some(wiring)) => (encoding, wiring),
            _ => return Err(PipelineError::NotInitialized(Self::NAME.to_string())),
        };
        let info = correlate(&mut encoding.pending, packet.pts, true)?;
        if self.skipped < self.skip_initial_packets {
            self.skipped += 1;
            trace!(pts = packet.pts, "skipping initial packet");
            return Ok(());
        }

        let time_base = encoding.time_base();
        let parameters = encoding.encoder.parameters();
        let header = MediaHeader::Audio(audio_header(
            &parameters.codec,
            parameters.profile,
            parameters.level,
            &self.params,
            &parameters.extradata,
        ));
        let timing = (
            time_base.convert(packet.pts, TimeBase::MPEG),
            time_base.convert(packet.dts, TimeBase::MPEG),
            time_base.convert(packet.duration, TimeBase::MPEG),
        );
        wiring.output.write_frame(self.pin.frame(&info, timing, packet.data, header))
    }

    /// Samples per encoded block, or everything buffered when the codec
    /// takes any size.
    fn block_size(&self) -> Option<usize> {
        self.encoding
            .as_ref()
            .and_then(|e| e.encoder.parameters().frame_size)
    }
}

impl Stage for EncodedAudioOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        let mut wiring = Wiring::from(ctx);
        self.encoding = Some(open_encoder(&mut wiring, &self.codec, StreamParams::Audio(self.params))?);
        self.wiring = Some(wiring);
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let audio = frame
            .as_audio()
            .ok_or_else(|| PipelineError::unsupported("encoded audio output got a video frame"))?;
        if AudioParams::of(audio) != self.params {
            return Err(PipelineError::unsupported(format!(
                "encoder for {} expects {}/{}/{} Hz, got {}/{}/{} Hz",
                self.codec,
                self.params.format,
                self.params.layout,
                self.params.sample_rate,
                audio.format,
                audio.layout,
                audio.sample_rate
            )));
        }

        let pts = time_base.convert(frame.pts, TimeBase::MPEG);
        self.operating_pts = if pts == NO_PTS {
            NO_PTS
        } else {
            pts - self.ticks(self.buffer.nb_samples())
        };
        self.buffer.append(audio)?;
        self.operating_info = frame.info;

        match self.block_size() {
            Some(size) => {
                while self.buffer.nb_samples() >= size {
                    self.encode_block(size)?;
                }
            }
            None => self.encode_block(self.buffer.nb_samples())?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.nb_samples() > 0 {
            self.encode_block(self.buffer.nb_samples())?;
        }
        loop {
            let drained = match self.encoding.as_mut() {
                Some(encoding) => encoding.encoder.drain()?,
                None => None,
            };
            match drained {
                Some(packet) => self.emit(packet)?,
                None => break,
            }
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Encodes pictures, opening the encoder on the first frame.
///
/// The interlace flag of that frame selects interlaced coding through the
/// `flags` codec option.
pub struct EncodedVideoOutput {
    codec: String,
    params: VideoParams,
    pin: OutputPin,
    wiring: Option<Wiring>,
    encoding: Option<Encoding>,
}

impl EncodedVideoOutput {
    pub const NAME: &'static str = "encoded video output";

    pub fn new(codec: impl Into<String>, params: VideoParams, pin: OutputPin) -> Self {
        Self {
            codec: codec.into(),
            params,
            pin,
            wiring: None,
            encoding: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let codec = options.required_string("codec")?;
        let pin = OutputPin::from_options(options)?;
        let params = video_params(options, "")?;
        Ok(Self::new(codec, params, pin))
    }

    fn emit(&mut self, packet: Packet) -> Result<()> {
        let (encoding, wiring) = match (self.encoding.as_mut(), self.wiring.as_mut()) {
            (Some(encoding), Some(wiring)) => (encoding, wiring),
            _ => return Err(PipelineError::NotInitialized(Self::NAME.to_string())),
        };
        let info = correlate(&mut encoding.pending, packet.pts, false)?;
        let parameters: &EncoderParameters = encoding.encoder.parameters();
        let tb = parameters.time_base.as_rational();

        let duration = if packet.duration == 0 {
            90000 * tb.num / tb.den
        } else {
            parameters.time_base.convert(packet.duration, TimeBase::MPEG)
        };
        let timing = (
            parameters.time_base.convert(packet.pts, TimeBase::MPEG),
            parameters.time_base.convert(packet.dts, TimeBase::MPEG),
            duration,
        );
        let header = MediaHeader::Video(VideoHeader {
            codec: parameters.codec.clone(),
            profile: parameters.profile,
            level: parameters.level,
            keyframe: packet.is_keyframe(),
            interlaced: parameters.interlaced,
            width: self.params.width,
            height: self.params.height,
            pixel_format: self.params.format.name().to_string(),
            pixel_aspect_ratio: parameters.sample_aspect_ratio,
            frame_rate: Some(Rational::new(tb.den, tb.num)),
            extradata: parameters.extradata.clone(),
        });
        wiring.output.write_frame(self.pin.frame(&info, timing, packet.data, header))
    }
}

impl Stage for EncodedVideoOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn execute(&mut self, mut frame: Frame, time_base: TimeBase) -> Result<()> {
        let picture = frame
            .as_video()
            .ok_or_else(|| PipelineError::unsupported("encoded video output got an audio frame"))?;
        if VideoParams::of(picture) != self.params {
            return Err(PipelineError::unsupported(format!(
                "encoder for {} expects {}x{} {}, got {}x{} {}",
                self.codec,
                self.params.width,
                self.params.height,
                self.params.format,
                picture.width,
                picture.height,
                picture.format
            )));
        }

        if self.encoding.is_none() {
            let interlaced = picture.interlaced;
            let wiring = wired(&mut self.wiring, Self::NAME)?;
            let flags = wiring.codec_options.take("flags").unwrap_or_default();
            let ildct = if interlaced { "+ildct" } else { "-ildct" };
            wiring.codec_options.set("flags", format!("{}{}", flags, ildct));
            self.encoding = Some(open_encoder(wiring, &self.codec, StreamParams::Video(self.params))?);
        }
        let encoding = self
            .encoding
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;

        frame.pts = time_base.convert(frame.pts, encoding.time_base());
        let info = std::mem::take(&mut frame.info);
        if let Some(packet) = encoding.encode(&frame, info)? {
            self.emit(packet)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            let drained = match self.encoding.as_mut() {
                Some(encoding) => encoding.encoder.drain()?,
                None => None,
            };
            match drained {
                Some(packet) => self.emit(packet)?,
                None => break,
            }
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}
