//! A small linear effects graph.
//!
//! The description is a comma separated chain, e.g. `volume=-6,delay=2`:
//!
//! | filter | media | effect |
//! |---|---|---|
//! | `null`, `anull` | any | pass through |
//! | `volume=<dB>` | audio | gain |
//! | `negate` | video | invert every plane |
//! | `delay=<n>` | any | hold `n` frames back until close |

use crate::error::{CodecError, Result};
use crate::traits::{EffectsGraph, StreamParams};
use mediagraph_core::{Frame, FrameData, MediaType};
use std::collections::VecDeque;

enum Effect {
    Null,
    Volume { gain: f32 },
    Negate,
    Delay { frames: usize, held: VecDeque<Frame> },
}

impl Effect {
    fn parse(spec: &str, media: MediaType) -> Result<Self> {
        let (name, arg) = match spec.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (spec.trim(), None),
        };
        let invalid = |reason: &str| CodecError::InvalidGraph(format!("{}: {}", spec.trim(), reason));

        let effect = match (name, arg) {
            ("null" | "anull", None) => Effect::Null,
            ("volume", Some(db)) => {
                let db: f32 = db.parse().map_err(|_| invalid("gain must be a number of dB"))?;
                Effect::Volume {
                    gain: 10.0_f32.powf(db / 20.0),
                }
            }
            ("negate", None) => Effect::Negate,
            ("delay", Some(n)) => Effect::Delay {
                frames: n.parse().map_err(|_| invalid("delay must be a frame count"))?,
                held: VecDeque::new(),
            },
            ("null" | "anull" | "negate", Some(_)) => return Err(invalid("takes no argument")),
            ("volume" | "delay", None) => return Err(invalid("needs an argument")),
            _ => return Err(invalid("unknown filter")),
        };

        match (&effect, media) {
            (Effect::Volume { .. }, MediaType::Video) => Err(invalid("audio filter on a video stream")),
            (Effect::Negate, MediaType::Audio) => Err(invalid("video filter on an audio stream")),
            _ => Ok(effect),
        }
    }

    fn apply(&mut self, mut frame: Frame) -> Option<Frame> {
        match self {
            Effect::Null => Some(frame),
            Effect::Volume { gain } => {
                if let FrameData::Audio(audio) = &mut frame.data {
                    for ch in 0..audio.channels() {
                        for i in 0..audio.nb_samples() {
                            let v = audio.sample(ch, i) * *gain;
                            audio.set_sample(ch, i, v.clamp(-1.0, 1.0));
                        }
                    }
                }
                Some(frame)
            }
            Effect::Negate => {
                if let FrameData::Video(video) = &mut frame.data {
                    for p in 0..video.num_planes() {
                        for y in 0..video.format.plane_height(p, video.height) {
                            video.row_mut(p, y).iter_mut().for_each(|b| *b = 255 - *b);
                        }
                    }
                }
                Some(frame)
            }
            Effect::Delay { frames, held } => {
                held.push_back(frame);
                if held.len() > *frames {
                    held.pop_front()
                } else {
                    None
                }
            }
        }
    }

    fn take_held(&mut self) -> Vec<Frame> {
        match self {
            Effect::Delay { held, .. } => held.drain(..).collect(),
            _ => Vec::new(),
        }
    }
}

/// Chain of effects applied in order.
pub struct EffectChain {
    effects: Vec<Effect>,
    output: VecDeque<Frame>,
    media: MediaType,
    closed: bool,
}

impl EffectChain {
    /// Parse a description for a stream.
    pub fn parse(description: &str, input: &StreamParams) -> Result<Self> {
        let media = match input {
            StreamParams::Audio(_) => MediaType::Audio,
            StreamParams::Video(_) => MediaType::Video,
        };
        if description.trim().is_empty() {
            return Err(CodecError::InvalidGraph("empty description".into()));
        }
        let effects = description
            .split(',')
            .map(|spec| Effect::parse(spec, media))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            effects,
            output: VecDeque::new(),
            media,
            closed: false,
        })
    }

    /// Run a frame through the effects starting at `from`.
    fn run_from(&mut self, from: usize, frame: Frame) {
        let mut current = Some(frame);
        for effect in &mut self.effects[from..] {
            current = match current {
                Some(frame) => effect.apply(frame),
                None => return,
            };
        }
        if let Some(frame) = current {
            self.output.push_back(frame);
        }
    }
}

impl EffectsGraph for EffectChain {
    fn push(&mut self, frame: Frame) -> Result<()> {
        if self.closed {
            return Err(CodecError::InvalidGraph("push after close".into()));
        }
        if frame.media_type() != self.media {
            return Err(CodecError::InvalidGraph(format!(
                "{} frame pushed into a {} graph",
                frame.media_type(),
                self.media
            )));
        }
        self.run_from(0, frame);
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Frame>> {
        Ok(self.output.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for i in 0..self.effects.len() {
            for frame in self.effects[i].take_held() {
                self.run_from(i + 1, frame);
            }
        }
        Ok(())
    }
}
