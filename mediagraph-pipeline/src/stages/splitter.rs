//! Planar stereo to mono.

use crate::options::StageOptions;
use crate::stage::{wired, Stage, StageContext, StageKind, Wiring};
use crate::{PipelineError, Result};
use mediagraph_codec::AudioParams;
use mediagraph_core::{AudioBuffer, ChannelLayout, Frame, SampleFormat, TimeBase};
use std::fmt;
use std::str::FromStr;

/// Which channels a splitter forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// Left channel to every child.
    LeftOnly,
    /// Right channel to every child.
    RightOnly,
    /// Left to even children, right to the odd child after each.
    #[default]
    LeftRight,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftOnly => write!(f, "left_only"),
            Self::RightOnly => write!(f, "right_only"),
            Self::LeftRight => write!(f, "left_right"),
        }
    }
}

impl FromStr for SplitMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left_only" => Ok(Self::LeftOnly),
            "right_only" => Ok(Self::RightOnly),
            "left_right" => Ok(Self::LeftRight),
            other => Err(PipelineError::config(format!("unknown split mode '{}'", other))),
        }
    }
}

/// Splits planar stereo frames into mono frames.
pub struct StereoSplitter {
    params: AudioParams,
    mode: SplitMode,
    wiring: Option<Wiring>,
}

impl StereoSplitter {
    pub const NAME: &'static str = "stereo splitter";

    pub fn new(params: AudioParams, mode: SplitMode) -> Result<Self> {
        if !matches!(params.format, SampleFormat::S16p | SampleFormat::F32p) {
            return Err(PipelineError::unsupported(format!(
                "stereo splitter needs s16p or fltp, not {}",
                params.format
            )));
        }
        if params.layout != ChannelLayout::Stereo {
            return Err(PipelineError::unsupported(format!(
                "stereo splitter needs stereo input, not {}",
                params.layout
            )));
        }
        Ok(Self {
            params,
            mode,
            wiring: None,
        })
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let params = AudioParams {
            sample_rate: options.unsigned("sample_rate", 48000)?,
            layout: options.parsed("channel_layout", ChannelLayout::Stereo, "channel layout")?,
            format: options.parsed("sample_format", SampleFormat::S16p, "sample format")?,
        };
        let mode = options.parsed("split_mode", SplitMode::default(), "left_only, right_only or left_right")?;
        Self::new(params, mode)
    }

    /// One channel of a planar frame as a mono buffer.
    fn mono(&self, audio: &AudioBuffer, channel: usize) -> Result<AudioBuffer> {
        Ok(AudioBuffer::from_bytes(
            self.params.format,
            ChannelLayout::Mono,
            audio.sample_rate,
            &audio.planes()[channel],
        )?)
    }
}

impl Stage for StereoSplitter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        self.wiring = Some(ctx.into());
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let audio = frame
            .as_audio()
            .ok_or_else(|| PipelineError::unsupported("stereo splitter got a video frame"))?;
        if audio.format != self.params.format || audio.layout != ChannelLayout::Stereo {
            return Err(PipelineError::unsupported(format!(
                "stereo splitter configured for stereo {} got {} {}",
                self.params.format, audio.layout, audio.format
            )));
        }

        let mono = |buffer: AudioBuffer| {
            let mut out = Frame::audio(buffer, frame.pts).with_info(frame.info.clone());
            out.dts = frame.dts;
            out
        };
        let left = mono(self.mono(audio, 0)?);
        let right = mono(self.mono(audio, 1)?);

        let downstream = &mut wired(&mut self.wiring, Self::NAME)?.downstream;
        let children = downstream.len();
        match self.mode {
            SplitMode::LeftOnly => {
                for i in 0..children {
                    downstream.send_to(i, left.clone(), time_base)?;
                }
            }
            SplitMode::RightOnly => {
                for i in 0..children {
                    downstream.send_to(i, right.clone(), time_base)?;
                }
            }
            SplitMode::LeftRight => {
                for i in (0..children).step_by(2) {
                    downstream.send_to(i, left.clone(), time_base)?;
                    if i + 1 < children {
                        downstream.send_to(i + 1, right.clone(), time_base)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}
