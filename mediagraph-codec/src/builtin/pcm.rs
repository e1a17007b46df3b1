//! Little-endian interleaved PCM codecs.

use crate::error::{CodecError, Result};
use crate::options::CodecOptions;
use crate::traits::{AudioParams, Decoder, Encoder, EncoderParameters, StreamParams};
use byteorder::{ByteOrder, LittleEndian};
use mediagraph_core::{AudioBuffer, Frame, Packet, PacketFlags, Rational, TimeBase};
use std::collections::VecDeque;

/// Samples per packet when the caller does not choose.
const DEFAULT_FRAME_SIZE: usize = 1024;

/// Sample coding of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PcmKind {
    S16le,
    F32le,
}

impl PcmKind {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "pcm_s16le" => Some(Self::S16le),
            "pcm_f32le" => Some(Self::F32le),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::S16le => "pcm_s16le",
            Self::F32le => "pcm_f32le",
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::S16le => 2,
            Self::F32le => 4,
        }
    }

    fn read(&self, bytes: &[u8]) -> f32 {
        match self {
            Self::S16le => LittleEndian::read_i16(bytes) as f32 / 32768.0,
            Self::F32le => LittleEndian::read_f32(bytes),
        }
    }

    fn write(&self, value: f32, out: &mut [u8]) {
        match self {
            Self::S16le => {
                let v = (value * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                LittleEndian::write_i16(out, v);
            }
            Self::F32le => LittleEndian::write_f32(out, value),
        }
    }
}

/// Decodes PCM packets into frames of the requested sample format.
pub struct PcmDecoder {
    kind: PcmKind,
    params: AudioParams,
}

impl PcmDecoder {
    pub(crate) fn open(kind: PcmKind, params: AudioParams, options: CodecOptions) -> Result<Self> {
        options.ensure_consumed(kind.name())?;
        if params.sample_rate == 0 {
            return Err(CodecError::open_failed(kind.name(), "sample rate must be positive"));
        }
        Ok(Self { kind, params })
    }
}

impl Decoder for PcmDecoder {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let channels = self.params.layout.channels() as usize;
        let frame_bytes = self.kind.width() * channels;
        if packet.data.is_empty() {
            return Ok(Vec::new());
        }
        if packet.data.len() % frame_bytes != 0 {
            return Err(CodecError::DecodeFailed(format!(
                "{} byte packet is not a multiple of {} byte sample frames",
                packet.data.len(),
                frame_bytes
            )));
        }

        let nb_samples = packet.data.len() / frame_bytes;
        let mut buffer = AudioBuffer::new(
            self.params.format,
            self.params.layout,
            self.params.sample_rate,
            nb_samples,
        );
        for (i, sample_frame) in packet.data.chunks_exact(frame_bytes).enumerate() {
            for (ch, bytes) in sample_frame.chunks_exact(self.kind.width()).enumerate() {
                buffer.set_sample(ch, i, self.kind.read(bytes));
            }
        }

        let mut frame = Frame::audio(buffer, packet.pts);
        frame.dts = packet.dts;
        Ok(vec![frame])
    }

    fn drain(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }
}

/// Encodes interleaved PCM, optionally holding packets back.
pub struct PcmEncoder {
    kind: PcmKind,
    parameters: EncoderParameters,
    input: AudioParams,
    delay: usize,
    pending: VecDeque<Packet>,
}

impl PcmEncoder {
    pub(crate) fn open(kind: PcmKind, input: AudioParams, mut options: CodecOptions) -> Result<Self> {
        let frame_size = options
            .take_parsed::<usize>("frame_size")?
            .unwrap_or(DEFAULT_FRAME_SIZE);
        let delay = options.take_parsed::<usize>("delay")?.unwrap_or(0);
        options.ensure_consumed(kind.name())?;

        if frame_size == 0 {
            return Err(CodecError::open_failed(kind.name(), "frame_size must be positive"));
        }
        if input.sample_rate == 0 {
            return Err(CodecError::open_failed(kind.name(), "sample rate must be positive"));
        }

        Ok(Self {
            kind,
            parameters: EncoderParameters {
                codec: kind.name().to_string(),
                profile: -1,
                level: -1,
                time_base: TimeBase::from_sample_rate(input.sample_rate),
                frame_size: Some(frame_size),
                extradata: Vec::new(),
                interlaced: false,
                sample_aspect_ratio: Rational::zero(),
                stream: StreamParams::Audio(input),
            },
            input,
            delay,
            pending: VecDeque::new(),
        })
    }
}

impl Encoder for PcmEncoder {
    fn parameters(&self) -> &EncoderParameters {
        &self.parameters
    }

    fn encode(&mut self, frame: &Frame) -> Result<Option<Packet>> {
        let audio = frame
            .as_audio()
            .ok_or_else(|| CodecError::EncodeFailed(format!("{} cannot encode video", self.kind.name())))?;
        if AudioParams::of(audio) != self.input {
            return Err(CodecError::EncodeFailed(format!(
                "frame is {}/{}/{} Hz, encoder expects {}/{}/{} Hz",
                audio.format,
                audio.layout,
                audio.sample_rate,
                self.input.format,
                self.input.layout,
                self.input.sample_rate
            )));
        }

        let width = self.kind.width();
        let channels = audio.channels();
        let mut data = vec![0u8; audio.nb_samples() * channels * width];
        for i in 0..audio.nb_samples() {
            for ch in 0..channels {
                let at = (i * channels + ch) * width;
                self.kind.write(audio.sample(ch, i), &mut data[at..at + width]);
            }
        }

        let mut packet = Packet::new(data).with_timestamps(frame.pts, frame.pts);
        packet.duration = audio.nb_samples() as i64;
        packet.flags |= PacketFlags::KEYFRAME;

        self.pending.push_back(packet);
        if self.pending.len() > self.delay {
            Ok(self.pending.pop_front())
        } else {
            Ok(None)
        }
    }

    fn drain(&mut self) -> Result<Option<Packet>> {
        Ok(self.pending.pop_front())
    }
}
