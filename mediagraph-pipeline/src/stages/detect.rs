//! Silence and black detection.
//!
//! Both detectors debounce their decision: the state only changes once the
//! opposite condition has held for longer than a configured duration, and
//! both counters restart whenever it does. Detectors start in the
//! silent/black state and raise their flag on every frame seen in it.

use crate::options::StageOptions;
use crate::stage::{wired, Stage, StageContext, StageKind, Wiring};
use crate::{PipelineError, Result};
use mediagraph_core::{Frame, InfoFlags, PixelFormat, Rational, TimeBase, VideoBuffer};
use tracing::debug;

/// Two-counter debounce.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hysteresis {
    active: bool,
    active_count: u64,
    inactive_count: u64,
    active_threshold: u64,
    inactive_threshold: u64,
}

impl Hysteresis {
    fn new(active_threshold: u64, inactive_threshold: u64) -> Self {
        Self {
            active: true,
            active_count: 0,
            inactive_count: 0,
            active_threshold,
            inactive_threshold,
        }
    }

    /// Count `amount` units of one condition and return the state.
    fn observe(&mut self, condition: bool, amount: u64) -> bool {
        if condition {
            self.active_count += amount;
            if self.active_count > self.active_threshold {
                self.reset(true);
            }
        } else {
            self.inactive_count += amount;
            if self.inactive_count > self.inactive_threshold {
                self.reset(false);
            }
        }
        self.active
    }

    fn reset(&mut self, active: bool) {
        self.active_count = 0;
        self.inactive_count = 0;
        self.active = active;
    }
}

/// Flags audio whose mean absolute level stays under a noise floor.
pub struct SilenceDetect {
    noise: f64,
    silence_duration: f64,
    noise_duration: f64,
    state: Option<Hysteresis>,
    wiring: Option<Wiring>,
}

impl SilenceDetect {
    pub const NAME: &'static str = "silence detect";

    pub fn new(noise: f64, silence_duration: f64, noise_duration: f64) -> Self {
        Self {
            noise,
            silence_duration,
            noise_duration,
            state: None,
            wiring: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let noise = options.float("noise", 0.001)?;
        let silence_duration = options.float("silence_duration", 2.25)?;
        let noise_duration = options.float("noise_duration", 0.025)?;
        if !(0.0..=1.0).contains(&noise) || silence_duration < 0.0 || noise_duration < 0.0 {
            return Err(PipelineError::config(format!(
                "silence detect needs noise in [0, 1] and non-negative durations, got {}, {}, {}",
                noise, silence_duration, noise_duration
            )));
        }
        Ok(Self::new(noise, silence_duration, noise_duration))
    }
}

impl Stage for SilenceDetect {
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

    fn execute(&mut self, mut frame: Frame, time_base: TimeBase) -> Result<()> {
        let audio = frame
            .as_audio()
            .ok_or_else(|| PipelineError::unsupported("silence detect got a video frame"))?;

        // Thresholds and counters are in samples across all channels.
        let per_second = f64::from(audio.sample_rate) * audio.channels() as f64;
        let (silence, noise) = (self.silence_duration, self.noise_duration);
        let state = self
            .state
            .get_or_insert_with(|| Hysteresis::new((silence * per_second) as u64, (noise * per_second) as u64));

        let count = audio.nb_samples() * audio.channels();
        let level = if count == 0 {
            0.0
        } else {
            let sum: f64 = (0..audio.channels())
                .flat_map(|ch| (0..audio.nb_samples()).map(move |i| (ch, i)))
                .map(|(ch, i)| f64::from(audio.sample(ch, i).abs()))
                .sum();
            sum / count as f64
        };

        let was_silent = state.active;
        let silent = state.observe(level < self.noise, count as u64);
        if silent != was_silent {
            debug!(pts = frame.pts, silent, "silence state changed");
        }
        if silent {
            frame.info.flags |= InfoFlags::SILENT;
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.send(frame, time_base)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

/// Flags video where most pixels are darker than a threshold.
pub struct BlackDetect {
    percentage: u32,
    threshold: u32,
    state: Hysteresis,
    wiring: Option<Wiring>,
}

impl BlackDetect {
    pub const NAME: &'static str = "black detect";

    pub fn new(
        percentage: u32,
        threshold: u32,
        black_duration: f64,
        non_black_duration: f64,
        frame_rate: Rational,
    ) -> Self {
        let frames = |seconds: f64| (seconds * frame_rate.num as f64 / frame_rate.den as f64) as u64;
        Self {
            percentage,
            threshold,
            state: Hysteresis::new(frames(black_duration), frames(non_black_duration)),
            wiring: None,
        }
    }

    pub fn from_options(options: &mut StageOptions) -> Result<Self> {
        let percentage = options.unsigned("percentage_below_threshold", 98)?;
        let threshold = options.unsigned("threshold", 32)?;
        let black_duration = options.float("black_duration", 2.25)?;
        let non_black_duration = options.float("non_black_duration", 0.025)?;
        let frame_rate = options.rational("frame_rate", Rational::from_int(25))?;
        if percentage > 100 || black_duration < 0.0 || non_black_duration < 0.0 || frame_rate.num <= 0 {
            return Err(PipelineError::config(format!(
                "black detect options out of range: percentage {}, durations {} and {}, frame rate {}",
                percentage, black_duration, non_black_duration, frame_rate
            )));
        }
        Ok(Self::new(
            percentage,
            threshold,
            black_duration,
            non_black_duration,
            frame_rate,
        ))
    }

    /// Percentage of dark pixels, judged on luma or the brightest component.
    fn dark_percentage(&self, picture: &VideoBuffer) -> u64 {
        let (width, height) = (picture.width as usize, picture.height as usize);
        if width == 0 || height == 0 {
            return 0;
        }
        let dark: usize = (0..height)
            .map(|y| {
                let row = picture.row(0, y);
                match picture.format {
                    PixelFormat::Bgr24 => row
                        .chunks_exact(3)
                        .filter(|px| px.iter().all(|&c| u32::from(c) < self.threshold))
                        .count(),
                    _ => row[..width].iter().filter(|&&v| u32::from(v) < self.threshold).count(),
                }
            })
            .sum();
        (dark * 100 / (width * height)) as u64
    }
}

impl Stage for BlackDetect {
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

    fn execute(&mut self, mut frame: Frame, time_base: TimeBase) -> Result<()> {
        let picture = frame
            .as_video()
            .ok_or_else(|| PipelineError::unsupported("black detect got an audio frame"))?;
        let is_black = self.dark_percentage(picture) >= u64::from(self.percentage);

        let was_black = self.state.active;
        let black = self.state.observe(is_black, 1);
        if black != was_black {
            debug!(pts = frame.pts, black, "black state changed");
        }
        if black {
            frame.info.flags |= InfoFlags::BLACK;
        }
        wired(&mut self.wiring, Self::NAME)?.downstream.send(frame, time_base)
    }

    fn flush(&mut self) -> Result<()> {
        wired(&mut self.wiring, Self::NAME)?.downstream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::tests::{collect, context, Collected};
    use mediagraph_core::{AudioBuffer, ChannelLayout, SampleFormat};

    #[test]
    fn test_hysteresis_flips_after_threshold() {
        let mut state = Hysteresis::new(2, 1);
        assert!(state.observe(false, 1));
        // Second noisy unit crosses the threshold of 1.
        assert!(!state.observe(false, 1));
        assert!(!state.observe(true, 2));
        assert!(state.observe(true, 1));
        assert_eq!(state.active_count, 0);
    }

    fn tone(level: f32, pts: i64) -> Frame {
        // 100 ms of mono at 1 kHz.
        let buffer = AudioBuffer::from_channels(SampleFormat::F32, ChannelLayout::Mono, 1000, &[vec![level; 100]]);
        Frame::audio(buffer, pts)
    }

    #[test]
    fn test_silence_detect_debounces() {
        let seen = Collected::default();
        // Silence after more than 0.25 s, noise after more than 0.15 s.
        let mut stage = SilenceDetect::new(0.01, 0.25, 0.15);
        stage.init(context(vec![collect(&seen)])).unwrap();

        let levels = [0.5, 0.5, 0.0, 0.0, 0.0, 0.5];
        for (i, level) in levels.iter().enumerate() {
            stage.execute(tone(*level, i as i64), TimeBase::MPEG).unwrap();
        }

        let silent: Vec<bool> = seen
            .frames()
            .iter()
            .map(|f| f.info.flags.contains(InfoFlags::SILENT))
            .collect();
        assert_eq!(silent, vec![true, false, false, false, true, true]);
    }

    fn picture(value: u8) -> Frame {
        let mut buffer = VideoBuffer::new(PixelFormat::Gray8, 10, 10);
        buffer.fill_plane(0, value);
        Frame::video(buffer, 0)
    }

    #[test]
    fn test_black_detect_counts_frames() {
        let seen = Collected::default();
        // One frame at 1 fps flips to black, none flips back.
        let mut stage = BlackDetect::new(98, 32, 1.0, 0.0, Rational::from_int(1));
        stage.init(context(vec![collect(&seen)])).unwrap();

        for value in [200, 0, 0, 200] {
            stage.execute(picture(value), TimeBase::MPEG).unwrap();
        }
        let black: Vec<bool> = seen
            .frames()
            .iter()
            .map(|f| f.info.flags.contains(InfoFlags::BLACK))
            .collect();
        assert_eq!(black, vec![false, false, true, false]);
    }

    #[test]
    fn test_black_percentage() {
        let stage = BlackDetect::new(50, 32, 0.0, 0.0, Rational::from_int(25));
        let mut buffer = VideoBuffer::new(PixelFormat::Gray8, 4, 1);
        buffer.row_mut(0, 0).copy_from_slice(&[0, 10, 100, 200]);
        assert_eq!(stage.dark_percentage(&buffer), 50);
    }

    #[test]
    fn test_options_validated() {
        let mut options = StageOptions::new(
            "black detect",
            [("percentage_below_threshold".to_string(), "120".to_string())].into(),
        );
        assert!(BlackDetect::from_options(&mut options).is_err());
    }
}
