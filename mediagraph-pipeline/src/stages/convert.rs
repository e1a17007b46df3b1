//! Format conversion and effects.

use super::{audio_params, video_params};
use crate::options::StageOptions;
use crate::stage::{wired, Stage, StageContext, StageKind, Wiring};
use crate::{PipelineError, Result};
use mediagraph_codec::{AudioParams, EffectsGraph, Resampler, Scaler, StreamParams, VideoParams};
use mediagraph_core::{timestamp::samples_to_ticks, Frame, FrameData, FrameInfo, TimeBase, NO_PTS};
use tracing::debug;

/// Sample rate, layout and format conversion.
///
/// Output frames are stamped in 90 kHz units.
pub struct AudioResampler {
    input: AudioParams,
    output: AudioParams,
    wiring: Option<Wiring>,
    resampler: Option<Box<dyn Resampler>>,
    /// Where drained samples continue, with the info of the last frame.
    tail: Option<(i64, FrameInfo)>,
}

impl AudioResampler {
    pub const NAME: &'static str = "audio resampler";

    pub fn new(input: AudioParams, output: AudioParams) -> Self {
        Self {
            input,
            output,
            wiring: None,
            resampler: None,
            tail: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let input = audio_params(options, "input_")?;
        let output = audio_params(options, "output_")?;
        Ok(Self::new(input, output))
    }

    fn next_pts(&self, pts: i64, nb_samples: usize) -> i64 {
        if pts == NO_PTS {
            NO_PTS
        } else {
            pts + samples_to_ticks(nb_samples, self.output.sample_rate, TimeBase::MPEG)
        }
    }
}

impl Stage for AudioResampler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        let wiring = Wiring::from(ctx);
        self.resampler = Some(wiring.codecs.open_resampler(self.input, self.output)?);
        self.wiring = Some(wiring);
        Ok(())
    }

    fn execute(&mut self, frame: Frame, time_base: TimeBase) -> Result<()> {
        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let audio = frame
            .as_audio()
            .ok_or_else(|| PipelineError::unsupported("audio resampler got a video frame"))?;
        let converted = resampler.convert(audio)?;

        let pts = time_base.convert(frame.pts, TimeBase::MPEG);
        self.tail = Some((self.next_pts(pts, converted.nb_samples()), frame.info.clone()));

        let mut out = Frame::audio(converted, pts).with_info(frame.info);
        out.dts = pts;
        wired(&mut self.wiring, Self::NAME)?.downstream.send(out, TimeBase::MPEG)
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            let drained = match self.resampler.as_mut() {
                Some(resampler) => resampler.drain()?,
                None => None,
            };
            let Some(buffer) = drained else { break };
            let (pts, info) = self.tail.take().unwrap_or((NO_PTS, FrameInfo::default()));
            self.tail = Some((self.next_pts(pts, buffer.nb_samples()), info.clone()));
            let mut out = Frame::audio(buffer, pts).with_info(info);
            out.dts = pts;
            wired(&mut self.wiring, Self::NAME)?.downstream.send(out, TimeBase::MPEG)?;
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Picture size and pixel format conversion.
pub struct VideoRescaler {
    input: VideoParams,
    output: VideoParams,
    wiring: Option<Wiring>,
    scaler: Option<Box<dyn Scaler>>,
}

impl VideoRescaler {
    pub const NAME: &'static str = "video rescaler";

    pub fn new(input: VideoParams, output: VideoParams) -> Self {
        Self {
            input,
            output,
            wiring: None,
            scaler: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let input = video_params(options, "input_")?;
        let output = video_params(options, "output_")?;
        Ok(Self::new(input, output))
    }
}

impl Stage for VideoRescaler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn init(&mut self, ctx: StageContext) -> Result<()> {
        let wiring = Wiring::from(ctx);
        self.scaler = Some(wiring.codecs.open_scaler(self.input, self.output)?);
        self.wiring = Some(wiring);
        Ok(())
    }

    fn execute(&mut self, mut frame: Frame, time_base: TimeBase) -> Result<()> {
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| PipelineError::NotInitialized(Self::NAME.to_string()))?;
        let picture = frame
            .as_video()
            .ok_or_else(|| PipelineError::unsupported("video rescaler got an audio frame"))?;
        let scaled = scaler.scale(picture)?;
        frame.data = FrameData::Video(scaled);
        wired(&mut self.wiring, Self::NAME)?.downstream.send(frame, time_base)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Runs frames through a textual effects graph.
///
/// The graph is configured from the first frame, so its input parameters
/// need not be declared up front.
pub struct EffectsProcessor {
    description: String,
    wiring: Option<Wiring>,
    graph: Option<(Box<dyn EffectsGraph>, TimeBase)>,
}

impl EffectsProcessor {
    pub const NAME: &'static str = "effects processor";

    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            wiring: None,
            graph: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        Ok(Self::new(options.required_string("graph")?))
    }

    /// Forward everything the graph has ready.
    fn pull_all(&mut self) -> Result<()> {
        let wiring = wired(&mut self.wiring, Self::NAME)?;
        if let Some((graph, time_base)) = self.graph.as_mut() {
            while let Some(frame) = graph.pull()? {
                wiring.downstream.send(frame, *time_base)?;
            }
        }
        Ok(())
    }
}

impl Stage for EffectsProcessor {
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
        if self.graph.is_none() {
            let wiring = wired(&mut self.wiring, Self::NAME)?;
            let params = StreamParams::of(&frame);
            let graph = wiring.codecs.open_effects(&self.description, &params)?;
            debug!(graph = %self.description, ?params, "effects graph configured");
            self.graph = Some((graph, time_base));
        }
        if let Some((graph, _)) = self.graph.as_mut() {
            graph.push(frame)?;
        }
        self.pull_all()
    }

    fn flush(&mut self) -> Result<()> {
        if let Some((graph, _)) = self.graph.as_mut() {
            graph.close()?;
        }
        self.pull_all()?;
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::tests::{collect, context, Collected};
    use mediagraph_core::{AudioBuffer, ChannelLayout, PixelFormat, SampleFormat, VideoBuffer};

    fn stereo(rate: u32) -> AudioParams {
        AudioParams {
            sample_rate: rate,
            layout: ChannelLayout::Stereo,
            format: SampleFormat::S16,
        }
    }

    #[test]
    fn test_resampler_stamps_mpeg() {
        let seen = Collected::default();
        let mut stage = AudioResampler::new(stereo(48000), stereo(24000));
        stage.init(context(vec![collect(&seen)])).unwrap();

        let input = AudioBuffer::new(SampleFormat::S16, ChannelLayout::Stereo, 48000, 480);
        stage.execute(Frame::audio(input, 480), TimeBase::from_sample_rate(48000)).unwrap();
        stage.flush().unwrap();

        let frames = seen.frames();
        assert_eq!(frames[0].pts, 900);
        assert_eq!(frames[0].as_audio().unwrap().nb_samples(), 240);
        assert_eq!(seen.time_bases(), vec![TimeBase::MPEG]);
        assert_eq!(seen.flushes(), 1);
    }

    #[test]
    fn test_resampler_rejects_video() {
        let mut stage = AudioResampler::new(stereo(48000), stereo(48000));
        stage.init(context(Vec::new())).unwrap();
        let picture = VideoBuffer::new(PixelFormat::Gray8, 2, 2);
        assert!(stage.execute(Frame::video(picture, 0), TimeBase::MPEG).is_err());
    }

    #[test]
    fn test_rescaler() {
        let seen = Collected::default();
        let input = VideoParams {
            width: 4,
            height: 4,
            format: PixelFormat::Gray8,
        };
        let output = VideoParams {
            width: 2,
            height: 2,
            format: PixelFormat::Gray8,
        };
        let mut stage = VideoRescaler::new(input, output);
        stage.init(context(vec![collect(&seen)])).unwrap();
        let picture = VideoBuffer::new(PixelFormat::Gray8, 4, 4);
        stage
            .execute(Frame::video(picture, 3600).with_info(FrameInfo::new(vec![5])), TimeBase::MPEG)
            .unwrap();

        let frames = seen.frames();
        assert_eq!(frames[0].as_video().unwrap().width, 2);
        assert_eq!(frames[0].info.data, vec![5]);
        assert_eq!(frames[0].pts, 3600);
    }

    #[test]
    fn test_effects_drained_on_flush() {
        let seen = Collected::default();
        let mut stage = EffectsProcessor::new("delay=1");
        stage.init(context(vec![collect(&seen)])).unwrap();
        let tone = |pts| Frame::audio(AudioBuffer::new(SampleFormat::S16, ChannelLayout::Mono, 8000, 8), pts);

        stage.execute(tone(0), TimeBase::MPEG).unwrap();
        assert!(seen.frames().is_empty());
        stage.execute(tone(900), TimeBase::MPEG).unwrap();
        assert_eq!(seen.frames().len(), 1);
        stage.flush().unwrap();

        assert_eq!(seen.frames().iter().map(|f| f.pts).collect::<Vec<_>>(), vec![0, 900]);
    }

    #[test]
    fn test_effects_bad_graph_fails_on_first_frame() {
        let mut stage = EffectsProcessor::new("negate");
        stage.init(context(Vec::new())).unwrap();
        let tone = Frame::audio(AudioBuffer::new(SampleFormat::S16, ChannelLayout::Mono, 8000, 8), 0);
        assert!(matches!(
            stage.execute(tone, TimeBase::MPEG),
            Err(PipelineError::Codec(_))
        ));
    }
}
