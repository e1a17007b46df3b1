//! The stage contract.
//!
//! Every node of a graph is a [`Stage`]. Sources take external input units
//! through [`Stage::accept`]; everything else receives frames through
//! [`Stage::execute`] and pushes results to its [`Downstream`] children.
//! `flush` drains whatever the stage buffers through the normal path and
//! then flushes the children.

use crate::config::DispatchMode;
use crate::output::SharedOutput;
use crate::{PipelineError, Result};
use mediagraph_codec::{CodecLibrary, CodecOptions};
use mediagraph_core::{Frame, FrameInfo, TimeBase, NO_PTS};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Capability tag of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Source,
    Transform,
    Sink,
    Fanout,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Transform => write!(f, "transform"),
            Self::Sink => write!(f, "sink"),
            Self::Fanout => write!(f, "fanout"),
        }
    }
}

/// Timestamps supplied with an input unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitMetadata {
    pub pts: i64,
    pub dts: i64,
}

impl UnitMetadata {
    /// Metadata with `dts` equal to `pts`.
    pub fn at(pts: i64) -> Self {
        Self { pts, dts: pts }
    }
}

impl Default for UnitMetadata {
    fn default() -> Self {
        Self {
            pts: NO_PTS,
            dts: NO_PTS,
        }
    }
}

/// One external input delivered to the root stage.
#[derive(Debug, Clone, PartialEq)]
pub struct InputUnit {
    pub metadata: UnitMetadata,
    /// Caller metadata to reattach to whatever this unit becomes.
    pub info: FrameInfo,
    /// Raw samples, pixels or an encoded packet.
    pub payload: Vec<u8>,
}

/// Everything a stage receives at `init`.
pub struct StageContext {
    /// Children, already built and initialised.
    pub downstream: Downstream,
    /// Options for any codec the stage opens.
    pub codec_options: CodecOptions,
    /// Shared output channel.
    pub output: SharedOutput,
    /// Session dispatch mode.
    pub mode: DispatchMode,
    /// Codec library.
    pub codecs: Arc<dyn CodecLibrary>,
}

/// A node of the processing tree.
pub trait Stage: Send {
    /// Registry name.
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind;

    /// Wire the stage. Called once, after every child is initialised.
    fn init(&mut self, ctx: StageContext) -> Result<()>;

    /// Take an external input unit. Only sources accept them.
    fn accept(&mut self, unit: InputUnit) -> Result<()> {
        let _ = unit;
        Err(PipelineError::config(format!(
            "{} stage {} does not take input units",
            self.kind(),
            self.name()
        )))
    }

    /// Process one frame whose timestamps are in `time_base`.
    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let _ = (frame, time_base);
        Err(PipelineError::config(format!(
            "{} stage {} does not take frames",
            self.kind(),
            self.name()
        )))
    }

    /// Drain buffered output, then flush children.
    fn flush(&mut self) -> Result<()>;
}

/// Ordered children of a stage.
#[derive(Default)]
pub struct Downstream {
    children: Vec<Box<dyn Stage>>,
}

impl Downstream {
    pub fn new(children: Vec<Box<dyn Stage>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Execute `frame` on every child. All but the last get a deep copy.
    pub fn send(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        if let Some((last, rest)) = self.children.split_last_mut() {
            for child in rest {
                child.execute(frame.clone(), time_base)?;
            }
            last.execute(frame, time_base)?;
        }
        Ok(())
    }

    /// Execute `frame` on one child only.
    pub fn send_to(&mut self, index: usize, frame: Frame, time_base: TimeBase) -> Result<()> {
        match self.children.get_mut(index) {
            Some(child) => child.execute(frame, time_base),
            None => Err(PipelineError::config(format!(
                "no downstream stage at index {} of {}",
                index,
                self.children.len()
            ))),
        }
    }

    /// Flush every child in order.
    pub fn flush(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.flush()?;
        }
        Ok(())
    }

    /// Hand the children over, e.g. to fan-out workers.
    pub fn into_children(self) -> Vec<Box<dyn Stage>> {
        self.children
    }
}

impl fmt::Debug for Downstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.children.iter().map(|c| c.name().to_string()))
            .finish()
    }
}

/// Initialisation state shared by most stages.
pub(crate) struct Wiring {
    pub(crate) downstream: Downstream,
    pub(crate) output: SharedOutput,
    pub(crate) codecs: Arc<dyn CodecLibrary>,
    pub(crate) codec_options: CodecOptions,
}

impl From<StageContext> for Wiring {
    fn from(ctx: StageContext) -> Self {
        Self {
            downstream: ctx.downstream,
            output: ctx.output,
            codecs: ctx.codecs,
            codec_options: ctx.codec_options,
        }
    }
}

/// Borrow the wiring of an initialised stage.
pub(crate) fn wired<'a>(wiring: &'a mut Option<Wiring>, stage: &str) -> Result<&'a mut Wiring> {
    wiring
        .as_mut()
        .ok_or_else(|| PipelineError::NotInitialized(stage.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagraph_core::{AudioBuffer, ChannelLayout, SampleFormat};
    use parking_lot::Mutex;

    struct Recorder {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    impl Stage for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn kind(&self) -> StageKind {
            StageKind::Sink
        }

        fn init(&mut self, _ctx: StageContext) -> Result<()> {
            Ok(())
        }

        fn execute(&mut self, frame: Frame, _time_base: TimeBase) -> Result<()> {
            self.seen.lock().push(frame.pts);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.seen.lock().push(-1);
            Ok(())
        }
    }

    #[test]
    fn test_send_reaches_every_child() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let children: Vec<Box<dyn Stage>> = (0..3)
            .map(|_| Box::new(Recorder { seen: seen.clone() }) as Box<dyn Stage>)
            .collect();
        let mut downstream = Downstream::new(children);
        let frame = Frame::audio(AudioBuffer::new(SampleFormat::S16, ChannelLayout::Mono, 8000, 4), 10);
        downstream.send(frame, TimeBase::MPEG).unwrap();
        downstream.flush().unwrap();

        assert_eq!(*seen.lock(), vec![10, 10, 10, -1, -1, -1]);
    }

    #[test]
    fn test_source_rejects_frames_by_default() {
        struct Source;
        impl Stage for Source {
            fn name(&self) -> &str {
                "source"
            }
            fn kind(&self) -> StageKind {
                StageKind::Source
            }
            fn init(&mut self, _ctx: StageContext) -> Result<()> {
                Ok(())
            }
            fn flush(&mut self) -> Result<()> {
                Ok(())
            }
        }
        let frame = Frame::audio(AudioBuffer::new(SampleFormat::S16, ChannelLayout::Mono, 8000, 1), 0);
        assert!(Source.execute(frame, TimeBase::MPEG).is_err());
        assert!(Source.accept(InputUnit {
            metadata: UnitMetadata::at(0),
            info: FrameInfo::default(),
            payload: Vec::new(),
        })
        .is_err());
    }
}
