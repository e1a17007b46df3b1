//! Audio sample formats and channel layouts.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Sample format for audio data.
///
/// Multi-byte samples are stored in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit.
    S16,
    /// Signed 32-bit.
    S32,
    /// 32-bit float.
    F32,
    /// Unsigned 8-bit planar.
    U8p,
    /// Signed 16-bit planar.
    S16p,
    /// Signed 32-bit planar.
    S32p,
    /// 32-bit float planar.
    F32p,
}

impl SampleFormat {
    /// Get the number of bytes per sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 | Self::U8p => 1,
            Self::S16 | Self::S16p => 2,
            Self::S32 | Self::S32p | Self::F32 | Self::F32p => 4,
        }
    }

    /// Check if this is a planar format.
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::U8p | Self::S16p | Self::S32p | Self::F32p)
    }

    /// Check if this is a floating-point format.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F32p)
    }

    /// Largest magnitude of an integer sample, 1.0 for float formats.
    pub fn full_scale(&self) -> f64 {
        match self {
            Self::U8 | Self::U8p => 128.0,
            Self::S16 | Self::S16p => i16::MAX as f64,
            Self::S32 | Self::S32p => i32::MAX as f64,
            Self::F32 | Self::F32p => 1.0,
        }
    }

    /// Wire name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "flt",
            Self::U8p => "u8p",
            Self::S16p => "s16p",
            Self::S32p => "s32p",
            Self::F32p => "fltp",
        }
    }

    /// Map a numeric format code as used by the control process.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::U8),
            1 => Some(Self::S16),
            2 => Some(Self::S32),
            3 => Some(Self::F32),
            5 => Some(Self::U8p),
            6 => Some(Self::S16p),
            7 => Some(Self::S32p),
            8 => Some(Self::F32p),
            _ => None,
        }
    }

    /// Decode one sample into the -1.0..1.0 range.
    pub fn read_sample(&self, bytes: &[u8]) -> f32 {
        match self {
            Self::U8 | Self::U8p => (bytes[0] as f32 - 128.0) / 128.0,
            Self::S16 | Self::S16p => i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            Self::S32 | Self::S32p => {
                i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
            }
            Self::F32 | Self::F32p => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Encode one sample from the -1.0..1.0 range, clipping integer formats.
    pub fn write_sample(&self, value: f32, out: &mut [u8]) {
        match self {
            Self::U8 | Self::U8p => {
                out[0] = (value * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8;
            }
            Self::S16 | Self::S16p => {
                let v = (value * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                out[..2].copy_from_slice(&v.to_ne_bytes());
            }
            Self::S32 | Self::S32p => {
                let v = (value as f64 * 2_147_483_648.0)
                    .round()
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                out[..4].copy_from_slice(&v.to_ne_bytes());
            }
            Self::F32 | Self::F32p => out[..4].copy_from_slice(&value.to_ne_bytes()),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let format = match s {
            "u8" => Self::U8,
            "s16" => Self::S16,
            "s32" => Self::S32,
            "flt" => Self::F32,
            "u8p" => Self::U8p,
            "s16p" => Self::S16p,
            "s32p" => Self::S32p,
            "fltp" => Self::F32p,
            other => match other.parse::<i64>().ok().and_then(Self::from_code) {
                Some(format) => format,
                None => return Err(Error::unsupported(format!("sample format '{}'", other))),
            },
        };
        Ok(format)
    }
}

/// Channel layout for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Mono (1 channel).
    Mono,
    /// Stereo (2 channels: left, right).
    #[default]
    Stereo,
    /// Unnamed layout with the given channel count.
    Custom(u32),
}

impl ChannelLayout {
    /// Get the number of channels.
    pub fn channels(&self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Custom(n) => *n,
        }
    }

    /// Create a layout from channel count.
    pub fn from_channels(channels: u32) -> Self {
        match channels {
            1 => Self::Mono,
            2 => Self::Stereo,
            n => Self::Custom(n),
        }
    }

    /// Map a channel mask as used by the control process.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0x4 => Some(Self::Mono),
            0x3 => Some(Self::Stereo),
            _ => None,
        }
    }

    /// Wire name of the layout.
    pub fn name(&self) -> String {
        match self {
            Self::Mono => "mono".to_string(),
            Self::Stereo => "stereo".to_string(),
            Self::Custom(n) => format!("{}c", n),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ChannelLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mono" => Ok(Self::Mono),
            "stereo" => Ok(Self::Stereo),
            other => {
                if let Some(count) = other.strip_suffix('c').and_then(|n| n.parse::<u32>().ok()) {
                    if count > 0 {
                        return Ok(Self::from_channels(count));
                    }
                }
                other
                    .parse::<i64>()
                    .ok()
                    .and_then(Self::from_code)
                    .ok_or_else(|| Error::unsupported(format!("channel layout '{}'", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_parse() {
        for format in [SampleFormat::U8, SampleFormat::S16, SampleFormat::S16p, SampleFormat::F32, SampleFormat::F32p] {
            assert_eq!(format.name().parse::<SampleFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!("8".parse::<SampleFormat>().unwrap(), SampleFormat::F32p);
        assert_eq!("1".parse::<SampleFormat>().unwrap(), SampleFormat::S16);
        assert_eq!("3".parse::<ChannelLayout>().unwrap(), ChannelLayout::Stereo);
        assert_eq!("4".parse::<ChannelLayout>().unwrap(), ChannelLayout::Mono);
        assert!("4".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_custom_layout() {
        let layout: ChannelLayout = "6c".parse().unwrap();
        assert_eq!(layout.channels(), 6);
        assert_eq!(layout.name(), "6c");
        assert!("0c".parse::<ChannelLayout>().is_err());
    }

    #[test]
    fn test_sample_conversion() {
        let mut buf = [0u8; 4];
        SampleFormat::S16.write_sample(0.5, &mut buf);
        assert!((SampleFormat::S16.read_sample(&buf) - 0.5).abs() < 1e-4);

        SampleFormat::S16.write_sample(4.0, &mut buf);
        assert_eq!(i16::from_ne_bytes([buf[0], buf[1]]), i16::MAX);

        SampleFormat::F32p.write_sample(-0.25, &mut buf);
        assert_eq!(SampleFormat::F32p.read_sample(&buf), -0.25);

        SampleFormat::U8.write_sample(0.0, &mut buf);
        assert_eq!(buf[0], 128);
    }
}
