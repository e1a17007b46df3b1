//! Linear interpolation resampler.
//!
//! Fast, low-quality resampling: each output sample interpolates between the
//! two neighbouring input samples. Channel layout changes up- or down-mix,
//! and the output is written in the requested sample format.

use crate::error::{CodecError, Result};
use crate::traits::{AudioParams, Resampler};
use mediagraph_core::{AudioBuffer, ChannelLayout};

/// Linear interpolation resampler.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    input: AudioParams,
    output: AudioParams,
    /// Input samples advanced per output sample.
    ratio: f64,
    /// Fractional position relative to the start of the next input buffer.
    position: f64,
    /// Last sample of the previous buffer, per output channel.
    prev_samples: Vec<f32>,
}

impl LinearResampler {
    /// Create a new linear resampler.
    pub fn new(input: AudioParams, output: AudioParams) -> Result<Self> {
        if input.sample_rate == 0 || output.sample_rate == 0 {
            return Err(CodecError::UnsupportedConversion(format!(
                "sample rate {} -> {}",
                input.sample_rate, output.sample_rate
            )));
        }
        if input.layout.channels() == 0 || output.layout.channels() == 0 {
            return Err(CodecError::UnsupportedConversion(format!(
                "channel layout {} -> {}",
                input.layout, output.layout
            )));
        }

        Ok(Self {
            input,
            output,
            ratio: input.sample_rate as f64 / output.sample_rate as f64,
            position: 0.0,
            prev_samples: vec![0.0; output.layout.channels() as usize],
        })
    }

    #[inline]
    fn interpolate(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Map the input channels onto the output layout.
    fn remix(&self, input: &AudioBuffer) -> Vec<Vec<f32>> {
        let source: Vec<Vec<f32>> = (0..input.channels()).map(|ch| input.channel(ch)).collect();
        match (self.input.layout, self.output.layout) {
            (ChannelLayout::Stereo, ChannelLayout::Mono) => {
                let mixed = source[0]
                    .iter()
                    .zip(&source[1])
                    .map(|(l, r)| (l + r) * 0.5)
                    .collect();
                vec![mixed]
            }
            (inp, out) => (0..out.channels() as usize)
                .map(|ch| source[ch % inp.channels() as usize].clone())
                .collect(),
        }
    }
}

impl Resampler for LinearResampler {
    fn convert(&mut self, input: &AudioBuffer) -> Result<AudioBuffer> {
        if AudioParams::of(input) != self.input {
            return Err(CodecError::UnsupportedConversion(format!(
                "resampler configured for {}/{}/{} Hz got {}/{}/{} Hz",
                self.input.format,
                self.input.layout,
                self.input.sample_rate,
                input.format,
                input.layout,
                input.sample_rate
            )));
        }

        let channels = self.remix(input);
        let input_len = input.nb_samples();
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels.len()];

        if input_len > 0 {
            let mut pos = self.position;
            while (pos as usize) < input_len {
                let idx = pos as usize;
                let frac = (pos - idx as f64) as f32;
                for (ch, samples) in channels.iter().enumerate() {
                    let s0 = if idx > 0 { samples[idx - 1] } else { self.prev_samples[ch] };
                    output[ch].push(Self::interpolate(s0, samples[idx], frac));
                }
                pos += self.ratio;
            }
            self.position = pos - input_len as f64;
            for (ch, samples) in channels.iter().enumerate() {
                self.prev_samples[ch] = samples[input_len - 1];
            }
        }

        Ok(AudioBuffer::from_channels(
            self.output.format,
            self.output.layout,
            self.output.sample_rate,
            &output,
        ))
    }

    fn drain(&mut self) -> Result<Option<AudioBuffer>> {
        // Only the interpolation state is carried between calls.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagraph_core::SampleFormat;

    fn params(rate: u32, layout: ChannelLayout, format: SampleFormat) -> AudioParams {
        AudioParams {
            sample_rate: rate,
            layout,
            format,
        }
    }

    #[test]
    fn test_invalid_rates() {
        let ok = params(48000, ChannelLayout::Stereo, SampleFormat::S16);
        assert!(LinearResampler::new(params(0, ChannelLayout::Stereo, SampleFormat::S16), ok).is_err());
        assert!(LinearResampler::new(ok, params(0, ChannelLayout::Stereo, SampleFormat::S16)).is_err());
    }

    #[test]
    fn test_downsample_halves_length() {
        let mut resampler = LinearResampler::new(
            params(48000, ChannelLayout::Mono, SampleFormat::F32),
            params(24000, ChannelLayout::Mono, SampleFormat::F32),
        )
        .unwrap();
        let input = AudioBuffer::from_channels(
            SampleFormat::F32,
            ChannelLayout::Mono,
            48000,
            &[vec![0.5; 480]],
        );
        let out = resampler.convert(&input).unwrap();
        assert_eq!(out.nb_samples(), 240);
        assert_eq!(out.sample_rate, 24000);
        // Steady state after the first interpolated sample.
        assert!((out.sample(0, 10) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_to_mono_and_format() {
        let mut resampler = LinearResampler::new(
            params(8000, ChannelLayout::Stereo, SampleFormat::F32p),
            params(8000, ChannelLayout::Mono, SampleFormat::S16),
        )
        .unwrap();
        let input = AudioBuffer::from_channels(
            SampleFormat::F32p,
            ChannelLayout::Stereo,
            8000,
            &[vec![0.5, 0.5, 0.5], vec![0.0, 0.0, 0.0]],
        );
        let out = resampler.convert(&input).unwrap();
        assert_eq!(out.format, SampleFormat::S16);
        assert_eq!(out.channels(), 1);
        assert_eq!(out.nb_samples(), 3);
        assert!((out.sample(0, 2) - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_rejects_mismatched_input() {
        let mut resampler = LinearResampler::new(
            params(8000, ChannelLayout::Mono, SampleFormat::S16),
            params(16000, ChannelLayout::Mono, SampleFormat::S16),
        )
        .unwrap();
        let wrong = AudioBuffer::new(SampleFormat::F32, ChannelLayout::Mono, 8000, 4);
        assert!(resampler.convert(&wrong).is_err());
    }
}
