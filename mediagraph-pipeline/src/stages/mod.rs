//! Built-in stages.
//!
//! | name | kind |
//! |---|---|
//! | `raw audio input`, `raw video input` | source |
//! | `encoded audio input`, `encoded video input` | source |
//! | `audio resampler`, `video rescaler`, `effects processor` | transform |
//! | `stereo splitter`, `silence detect`, `black detect` | transform |
//! | `raw audio output`, `raw video output` | sink |
//! | `encoded audio output`, `encoded video output` | sink |
//!
//! Sources emit frames in 90 kHz units. Sinks write [`OutputFrame`]s with
//! 90 kHz timestamps whatever the codec time base.

mod convert;
mod detect;
mod input;
mod output;
mod splitter;

pub use convert::{AudioResampler, EffectsProcessor, VideoRescaler};
pub use detect::{BlackDetect, SilenceDetect};
pub use input::{EncodedAudioInput, EncodedVideoInput, RawAudioInput, RawVideoInput};
pub use output::{EncodedAudioOutput, EncodedVideoOutput, RawAudioOutput, RawVideoOutput};
pub use splitter::{SplitMode, StereoSplitter};

use crate::options::StageOptions;
use crate::output::OutputFrame;
use crate::registry::StageRegistry;
use crate::stage::{Stage, StageKind};
use crate::{PipelineError, Result};
use mediagraph_codec::{AudioParams, VideoParams};
use mediagraph_core::{ChannelLayout, CorrelationQueue, Error as CoreError, FrameInfo, PixelFormat, SampleFormat};

pub(crate) fn register_builtin(registry: &mut StageRegistry) {
    fn boxed<S: Stage + 'static>(stage: Result<S>) -> Result<Box<dyn Stage>> {
        Ok(Box::new(stage?))
    }

    registry.register(RawAudioInput::NAME, StageKind::Source, |o| boxed(RawAudioInput::from_options(o)));
    registry.register(RawVideoInput::NAME, StageKind::Source, |o| boxed(RawVideoInput::from_options(o)));
    registry.register(EncodedAudioInput::NAME, StageKind::Source, |o| {
        boxed(EncodedAudioInput::from_options(o))
    });
    registry.register(EncodedVideoInput::NAME, StageKind::Source, |o| {
        boxed(EncodedVideoInput::from_options(o))
    });
    registry.register(AudioResampler::NAME, StageKind::Transform, |o| boxed(AudioResampler::from_options(o)));
    registry.register(VideoRescaler::NAME, StageKind::Transform, |o| boxed(VideoRescaler::from_options(o)));
    registry.register(EffectsProcessor::NAME, StageKind::Transform, |o| {
        boxed(EffectsProcessor::from_options(o))
    });
    registry.register(StereoSplitter::NAME, StageKind::Transform, |o| boxed(StereoSplitter::from_options(o)));
    registry.register(SilenceDetect::NAME, StageKind::Transform, |o| boxed(SilenceDetect::from_options(o)));
    registry.register(BlackDetect::NAME, StageKind::Transform, |o| boxed(BlackDetect::from_options(o)));
    registry.register(RawAudioOutput::NAME, StageKind::Sink, |o| boxed(RawAudioOutput::from_options(o)));
    registry.register(RawVideoOutput::NAME, StageKind::Sink, |o| boxed(RawVideoOutput::from_options(o)));
    registry.register(EncodedAudioOutput::NAME, StageKind::Sink, |o| {
        boxed(EncodedAudioOutput::from_options(o))
    });
    registry.register(EncodedVideoOutput::NAME, StageKind::Sink, |o| {
        boxed(EncodedVideoOutput::from_options(o))
    });
}

/// Read `<prefix>sample_rate`, `<prefix>channel_layout` and `<prefix>sample_format`.
pub(crate) fn audio_params(options: &mut StageOptions, prefix: &str) -> Result<AudioParams> {
    let sample_rate = options.unsigned(&format!("{}sample_rate", prefix), 48000)?;
    let layout = options.parsed(
        &format!("{}channel_layout", prefix),
        ChannelLayout::Stereo,
        "channel layout",
    )?;
    let format = options.parsed(&format!("{}sample_format", prefix), SampleFormat::S16, "sample format")?;
    if sample_rate == 0 {
        return Err(PipelineError::config(format!(
            "stage {} needs a positive {}sample_rate",
            options.stage(),
            prefix
        )));
    }
    Ok(AudioParams {
        sample_rate,
        layout,
        format,
    })
}

/// Read `<prefix>width`, `<prefix>height` and `<prefix>pixel_format`.
pub(crate) fn video_params(options: &mut StageOptions, prefix: &str) -> Result<VideoParams> {
    let width = options.unsigned(&format!("{}width", prefix), 0)?;
    let height = options.unsigned(&format!("{}height", prefix), 0)?;
    let format = options.parsed(&format!("{}pixel_format", prefix), PixelFormat::Yuv420p, "pixel format")?;
    if width == 0 || height == 0 {
        return Err(PipelineError::config(format!(
            "stage {} needs positive {}width and {}height",
            options.stage(),
            prefix,
            prefix
        )));
    }
    Ok(VideoParams { width, height, format })
}

/// Where a sink's records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPin {
    pub pin: String,
    /// -1 when the controller did not assign one.
    pub stream_id: i64,
}

impl OutputPin {
    pub fn new(pin: impl Into<String>, stream_id: i64) -> Self {
        Self {
            pin: pin.into(),
            stream_id,
        }
    }

    pub(crate) fn from_options(options: &mut StageOptions) -> Result<Self> {
        Ok(Self {
            pin: options.required_string("pin_name")?,
            stream_id: options.int("stream_id", -1)?,
        })
    }

    pub(crate) fn frame(
        &self,
        info: &FrameInfo,
        timing: (i64, i64, i64),
        payload: Vec<u8>,
        header: crate::output::MediaHeader,
    ) -> OutputFrame {
        let (pts, dts, duration) = timing;
        OutputFrame {
            pin: self.pin.clone(),
            stream_id: self.stream_id,
            info: info.data.clone(),
            pts,
            dts,
            duration,
            flags: info.flags.bits(),
            payload,
            header,
        }
    }
}

/// Look up the metadata stashed for `pts`.
pub(crate) fn correlate(queue: &mut CorrelationQueue, pts: i64, drop_stale: bool) -> Result<FrameInfo> {
    queue
        .match_and_remove(pts, drop_stale)
        .map_err(|e| PipelineError::Core(CoreError::from(e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DispatchMode;
    use crate::output::{MemoryChannel, SharedOutput};
    use crate::stage::{Downstream, StageContext};
    use mediagraph_codec::{BuiltinCodecs, CodecOptions};
    use mediagraph_core::{Frame, TimeBase};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// What a [`Collector`] has seen. Clones share storage.
    #[derive(Clone, Default)]
    pub(crate) struct Collected {
        frames: Arc<Mutex<Vec<(Frame, TimeBase)>>>,
        flushes: Arc<Mutex<usize>>,
    }

    impl Collected {
        pub(crate) fn frames(&self) -> Vec<Frame> {
            self.frames.lock().iter().map(|(f, _)| f.clone()).collect()
        }

        pub(crate) fn time_bases(&self) -> Vec<TimeBase> {
            self.frames.lock().iter().map(|(_, tb)| *tb).collect()
        }

        pub(crate) fn flushes(&self) -> usize {
            *self.flushes.lock()
        }
    }

    struct Collector(Collected);

    impl Stage for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        fn kind(&self) -> StageKind {
            StageKind::Sink
        }

        fn init(&mut self, _ctx: StageContext) -> Result<()> {
            Ok(())
        }

        fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
            self.0.frames.lock().push((frame, time_base));
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            *self.0.flushes.lock() += 1;
            Ok(())
        }
    }

    pub(crate) fn collect(seen: &Collected) -> Box<dyn Stage> {
        Box::new(Collector(seen.clone()))
    }

    pub(crate) fn context_with(
        children: Vec<Box<dyn Stage>>,
        codec_options: CodecOptions,
        output: SharedOutput,
    ) -> StageContext {
        StageContext {
            downstream: Downstream::new(children),
            codec_options,
            output,
            mode: DispatchMode::Sync,
            codecs: Arc::new(BuiltinCodecs::new()),
        }
    }

    pub(crate) fn context(children: Vec<Box<dyn Stage>>) -> StageContext {
        context_with(children, CodecOptions::new(), SharedOutput::new(MemoryChannel::new()))
    }

    #[test]
    fn test_audio_params_defaults_and_prefix() {
        let mut options = StageOptions::new(
            "audio resampler",
            [
                ("output_sample_rate".to_string(), "16000".to_string()),
                ("output_channel_layout".to_string(), "4".to_string()),
            ]
            .into(),
        );
        let input = audio_params(&mut options, "input_").unwrap();
        let output = audio_params(&mut options, "output_").unwrap();
        assert_eq!(input.sample_rate, 48000);
        assert_eq!(input.layout, ChannelLayout::Stereo);
        assert_eq!(output.sample_rate, 16000);
        assert_eq!(output.layout, ChannelLayout::Mono);
        assert_eq!(output.format, SampleFormat::S16);
    }

    #[test]
    fn test_video_params_need_size() {
        let mut options = StageOptions::new("raw video input", Default::default());
        assert!(matches!(
            video_params(&mut options, ""),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_output_pin_requires_name() {
        let mut options = StageOptions::new("raw audio output", Default::default());
        assert!(OutputPin::from_options(&mut options).is_err());
        let mut options = StageOptions::new(
            "raw audio output",
            [("pin_name".to_string(), "left".to_string())].into(),
        );
        let pin = OutputPin::from_options(&mut options).unwrap();
        assert_eq!(pin.stream_id, -1);
    }
}
