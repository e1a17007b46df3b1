//! Uncompressed video codec with configurable buffering.
//!
//! The payload is the tightly packed picture. `delay` holds frames back the
//! way a decoder waiting on references or an encoder with look-ahead does,
//! and `reorder` swaps each pair of pictures like B-frame coding.

use crate::error::{CodecError, Result};
use crate::options::CodecOptions;
use crate::traits::{Decoder, Encoder, EncoderParameters, StreamParams, VideoParams};
use mediagraph_core::{Frame, Packet, PacketFlags, Rational, TimeBase, VideoBuffer, NO_PTS};
use std::collections::VecDeque;

const NAME: &str = "rawvideo";

/// Decodes packed pictures.
pub struct RawVideoDecoder {
    params: VideoParams,
    delay: usize,
    pending: VecDeque<Frame>,
}

impl RawVideoDecoder {
    pub(crate) fn open(params: VideoParams, mut options: CodecOptions) -> Result<Self> {
        let delay = options.take_parsed::<usize>("delay")?.unwrap_or(0);
        options.ensure_consumed(NAME)?;
        Ok(Self {
            params,
            delay,
            pending: VecDeque::new(),
        })
    }
}

impl Decoder for RawVideoDecoder {
    fn name(&self) -> &str {
        NAME
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let mut picture = VideoBuffer::from_packed(
            self.params.format,
            self.params.width,
            self.params.height,
            &packet.data,
        )
        .map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
        picture.keyframe = true;

        let pts = if packet.dts != NO_PTS { packet.dts } else { packet.pts };
        let mut frame = Frame::video(picture, pts);
        frame.dts = packet.dts;

        self.pending.push_back(frame);
        if self.pending.len() > self.delay {
            Ok(self.pending.pop_front().into_iter().collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn drain(&mut self) -> Result<Option<Frame>> {
        Ok(self.pending.pop_front())
    }
}

/// Encodes packed pictures.
pub struct RawVideoEncoder {
    parameters: EncoderParameters,
    input: VideoParams,
    delay: usize,
    reorder: bool,
    submitted: u64,
    pending: VecDeque<Packet>,
    decode_order: VecDeque<i64>,
}

impl RawVideoEncoder {
    pub(crate) fn open(input: VideoParams, mut options: CodecOptions) -> Result<Self> {
        let frame_rate = options
            .take_parsed::<Rational>("frame_rate")?
            .unwrap_or(Rational::from_int(25));
        let delay = options.take_parsed::<usize>("delay")?.unwrap_or(0);
        let reorder = match options.take("reorder") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(CodecError::InvalidOption {
                key: "reorder".into(),
                value: v,
            })?,
        };
        let interlaced = match options.take("flags") {
            None => false,
            Some(flags) => parse_flags(&flags)?,
        };
        let profile = options.take_parsed::<i32>("profile")?.unwrap_or(-1);
        let level = options.take_parsed::<i32>("level")?.unwrap_or(-1);
        options.ensure_consumed(NAME)?;

        if frame_rate.num <= 0 {
            return Err(CodecError::open_failed(NAME, format!("frame rate {} is not positive", frame_rate)));
        }
        if reorder && delay == 0 {
            return Err(CodecError::open_failed(NAME, "reorder needs a delay of at least 1"));
        }

        Ok(Self {
            parameters: EncoderParameters {
                codec: NAME.to_string(),
                profile,
                level,
                time_base: TimeBase::new(frame_rate.den, frame_rate.num),
                frame_size: None,
                extradata: Vec::new(),
                interlaced,
                sample_aspect_ratio: Rational::new(1, 1),
                stream: StreamParams::Video(input),
            },
            input,
            delay,
            reorder,
            submitted: 0,
            pending: VecDeque::new(),
            decode_order: VecDeque::new(),
        })
    }

    fn emit(&mut self) -> Option<Packet> {
        let mut packet = self.pending.pop_front()?;
        if let Some(dts) = self.decode_order.pop_front() {
            packet.dts = dts;
        }
        Some(packet)
    }
}

impl Encoder for RawVideoEncoder {
    fn parameters(&self) -> &EncoderParameters {
        &self.parameters
    }

    fn encode(&mut self, frame: &Frame) -> Result<Option<Packet>> {
        let picture = frame
            .as_video()
            .ok_or_else(|| CodecError::EncodeFailed("rawvideo cannot encode audio".into()))?;
        if VideoParams::of(picture) != self.input {
            return Err(CodecError::EncodeFailed(format!(
                "frame is {}x{} {}, encoder expects {}x{} {}",
                picture.width,
                picture.height,
                picture.format,
                self.input.width,
                self.input.height,
                self.input.format
            )));
        }

        let mut packet = Packet::new(picture.to_packed()).with_timestamps(frame.pts, frame.pts);
        packet.duration = 1;
        packet.flags |= PacketFlags::KEYFRAME;

        self.submitted += 1;
        self.decode_order.push_back(frame.pts);
        self.pending.push_back(packet);
        if self.reorder && self.submitted % 2 == 0 && self.pending.len() >= 2 {
            let last = self.pending.len() - 1;
            self.pending.swap(last - 1, last);
        }

        if self.pending.len() > self.delay {
            Ok(self.emit())
        } else {
            Ok(None)
        }
    }

    fn drain(&mut self) -> Result<Option<Packet>> {
        Ok(self.emit())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// `+flag-flag` list; only interlaced DCT is meaningful here.
fn parse_flags(flags: &str) -> Result<bool> {
    let mut interlaced = false;
    let mut rest = flags.trim();
    while !rest.is_empty() {
        let (enable, body) = match rest.as_bytes()[0] {
            b'+' => (true, &rest[1..]),
            b'-' => (false, &rest[1..]),
            _ => (true, rest),
        };
        let end = body.find(['+', '-']).unwrap_or(body.len());
        match &body[..end] {
            "ildct" => interlaced = enable,
            "" => {}
            other => {
                return Err(CodecError::InvalidOption {
                    key: "flags".into(),
                    value: other.to_string(),
                })
            }
        }
        rest = &body[end..];
    }
    Ok(interlaced)
}
