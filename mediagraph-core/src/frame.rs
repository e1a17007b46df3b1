//! Decoded frame abstractions.
//!
//! A [`Frame`] is an owned audio or video payload plus its presentation
//! timestamp and the opaque [`FrameInfo`] blob supplied by the caller.
//! Cloning a frame deep-copies both, so every fan-out branch can mutate its
//! own copy without coordination.

use crate::error::{Error, Result};
use crate::rational::Rational;
use crate::sample::{ChannelLayout, SampleFormat};
use crate::timestamp::NO_PTS;
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

/// Row alignment for video planes.
const ALIGNMENT: usize = 32;

bitflags! {
    /// Detection flags carried with the per-frame metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFlags: u32 {
        /// Audio judged silent by a silence detector.
        const SILENT = 0x0001;
        /// Video judged black by a black detector.
        const BLACK = 0x0002;
    }
}

/// Opaque per-frame metadata round-tripped from input to output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Flags raised by detection stages.
    pub flags: InfoFlags,
    /// Caller-supplied bytes, never interpreted.
    pub data: Vec<u8>,
}

impl FrameInfo {
    /// Wrap caller bytes with no flags set.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            flags: InfoFlags::empty(),
            data: data.into(),
        }
    }
}

/// Kind of payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp.
    Yuv420p,
    /// Planar YUV 4:2:0, full range.
    Yuvj420p,
    /// Packed BGR 8:8:8, 24bpp.
    Bgr24,
    /// 8-bit grayscale.
    Gray8,
}

impl PixelFormat {
    /// Get the number of planes.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuvj420p => 3,
            Self::Bgr24 | Self::Gray8 => 1,
        }
    }

    /// Bytes in one row of `plane` for a picture `width` pixels wide.
    pub fn plane_width(&self, plane: usize, width: u32) -> usize {
        let width = width as usize;
        match (self, plane) {
            (Self::Yuv420p | Self::Yuvj420p, 0) => width,
            (Self::Yuv420p | Self::Yuvj420p, _) => width.div_ceil(2),
            (Self::Bgr24, _) => width * 3,
            (Self::Gray8, _) => width,
        }
    }

    /// Rows in `plane` for a picture `height` pixels tall.
    pub fn plane_height(&self, plane: usize, height: u32) -> usize {
        let height = height as usize;
        match (self, plane) {
            (Self::Yuv420p | Self::Yuvj420p, p) if p > 0 => height.div_ceil(2),
            _ => height,
        }
    }

    /// Size of a tightly packed picture in bytes.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        (0..self.num_planes())
            .map(|p| self.plane_width(p, width) * self.plane_height(p, height))
            .sum()
    }

    /// Wire name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuvj420p => "yuvj420p",
            Self::Bgr24 => "bgr24",
            Self::Gray8 => "gray",
        }
    }

    /// Map a numeric format code as used by the control process.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Yuv420p),
            3 => Some(Self::Bgr24),
            8 => Some(Self::Gray8),
            12 => Some(Self::Yuvj420p),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yuv420p" => Ok(Self::Yuv420p),
            "yuvj420p" => Ok(Self::Yuvj420p),
            "bgr24" => Ok(Self::Bgr24),
            "gray" | "gray8" => Ok(Self::Gray8),
            other => other
                .parse::<i64>()
                .ok()
                .and_then(Self::from_code)
                .ok_or_else(|| Error::unsupported(format!("pixel format '{}'", other))),
        }
    }
}

/// Video picture with aligned planes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoBuffer {
    /// Pixel format.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Intra-coded picture.
    pub keyframe: bool,
    /// Interlaced content.
    pub interlaced: bool,
    /// Top field first, meaningful when interlaced.
    pub top_field_first: bool,
    /// Pixel aspect ratio.
    pub sample_aspect_ratio: Rational,
    planes: Vec<Vec<u8>>,
    strides: Vec<usize>,
}

impl VideoBuffer {
    /// Allocate a zeroed picture.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let mut planes = Vec::with_capacity(format.num_planes());
        let mut strides = Vec::with_capacity(format.num_planes());
        for p in 0..format.num_planes() {
            let stride = align(format.plane_width(p, width));
            planes.push(vec![0u8; stride * format.plane_height(p, height)]);
            strides.push(stride);
        }
        Self {
            format,
            width,
            height,
            keyframe: false,
            interlaced: false,
            top_field_first: false,
            sample_aspect_ratio: Rational::new(1, 1),
            planes,
            strides,
        }
    }

    /// Copy a tightly packed picture into aligned planes.
    pub fn from_packed(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let needed = format.frame_size(width, height);
        if data.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: data.len(),
            });
        }
        let mut buffer = Self::new(format, width, height);
        let mut offset = 0;
        for p in 0..format.num_planes() {
            let row_bytes = format.plane_width(p, width);
            for y in 0..format.plane_height(p, height) {
                buffer.row_mut(p, y).copy_from_slice(&data[offset..offset + row_bytes]);
                offset += row_bytes;
            }
        }
        Ok(buffer)
    }

    /// Pack the visible rows of every plane without padding.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.format.frame_size(self.width, self.height));
        for p in 0..self.planes.len() {
            for y in 0..self.format.plane_height(p, self.height) {
                out.extend_from_slice(self.row(p, y));
            }
        }
        out
    }

    /// Get the number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Get a plane's data, including row padding.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.as_slice())
    }

    /// Get the stride (bytes per row) for a plane.
    pub fn stride(&self, plane: usize) -> usize {
        self.strides.get(plane).copied().unwrap_or(0)
    }

    /// Visible bytes of one row.
    ///
    /// # Panics
    ///
    /// Panics if the plane or row is out of range.
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let start = y * self.strides[plane];
        let len = self.format.plane_width(plane, self.width);
        &self.planes[plane][start..start + len]
    }

    /// Mutable visible bytes of one row.
    ///
    /// # Panics
    ///
    /// Panics if the plane or row is out of range.
    pub fn row_mut(&mut self, plane: usize, y: usize) -> &mut [u8] {
        let start = y * self.strides[plane];
        let len = self.format.plane_width(plane, self.width);
        &mut self.planes[plane][start..start + len]
    }

    /// Set every byte of a plane.
    pub fn fill_plane(&mut self, plane: usize, value: u8) {
        if let Some(p) = self.planes.get_mut(plane) {
            p.fill(value);
        }
    }
}

/// Audio samples, one plane per channel for planar formats.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample format.
    pub format: SampleFormat,
    /// Channel layout.
    pub layout: ChannelLayout,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    nb_samples: usize,
    planes: Vec<Vec<u8>>,
}

impl AudioBuffer {
    /// Allocate `nb_samples` of silence.
    pub fn new(format: SampleFormat, layout: ChannelLayout, sample_rate: u32, nb_samples: usize) -> Self {
        let channels = layout.channels() as usize;
        let bps = format.bytes_per_sample();
        let planes = if format.is_planar() {
            vec![vec![0u8; nb_samples * bps]; channels]
        } else {
            vec![vec![0u8; nb_samples * bps * channels]]
        };
        let mut buffer = Self {
            format,
            layout,
            sample_rate,
            nb_samples,
            planes,
        };
        if matches!(format, SampleFormat::U8 | SampleFormat::U8p) {
            buffer.planes.iter_mut().for_each(|p| p.fill(0x80));
        }
        buffer
    }

    /// Interpret raw bytes, planes laid out one after another.
    pub fn from_bytes(
        format: SampleFormat,
        layout: ChannelLayout,
        sample_rate: u32,
        data: &[u8],
    ) -> Result<Self> {
        let frame_bytes = format.bytes_per_sample() * layout.channels() as usize;
        if frame_bytes == 0 {
            return Err(Error::invalid_param("channel layout has no channels"));
        }
        if data.len() % frame_bytes != 0 {
            return Err(Error::invalid_param(format!(
                "{} bytes is not a whole number of {}-byte sample frames",
                data.len(),
                frame_bytes
            )));
        }
        let nb_samples = data.len() / frame_bytes;
        if nb_samples == 0 {
            return Ok(Self::new(format, layout, sample_rate, 0));
        }
        let planes = if format.is_planar() {
            data.chunks(nb_samples * format.bytes_per_sample())
                .map(|c| c.to_vec())
                .collect()
        } else {
            vec![data.to_vec()]
        };
        Ok(Self {
            format,
            layout,
            sample_rate,
            nb_samples,
            planes,
        })
    }

    /// Build a buffer from normalized per-channel samples.
    ///
    /// All channels must hold the same number of samples.
    pub fn from_channels(
        format: SampleFormat,
        layout: ChannelLayout,
        sample_rate: u32,
        channels: &[Vec<f32>],
    ) -> Self {
        let nb_samples = channels.first().map_or(0, |c| c.len());
        let mut buffer = Self::new(format, layout, sample_rate, nb_samples);
        for (ch, samples) in channels.iter().enumerate().take(layout.channels() as usize) {
            for (i, &v) in samples.iter().enumerate().take(nb_samples) {
                buffer.set_sample(ch, i, v);
            }
        }
        buffer
    }

    /// Samples per channel.
    pub fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.layout.channels() as usize
    }

    /// Raw planes.
    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    fn offset(&self, channel: usize, index: usize) -> (usize, usize) {
        let bps = self.format.bytes_per_sample();
        if self.format.is_planar() {
            (channel, index * bps)
        } else {
            (0, (index * self.channels() + channel) * bps)
        }
    }

    /// Read one sample as a normalized float.
    ///
    /// # Panics
    ///
    /// Panics if the channel or index is out of range.
    pub fn sample(&self, channel: usize, index: usize) -> f32 {
        let (plane, at) = self.offset(channel, index);
        let bps = self.format.bytes_per_sample();
        self.format.read_sample(&self.planes[plane][at..at + bps])
    }

    /// Write one sample from a normalized float.
    ///
    /// # Panics
    ///
    /// Panics if the channel or index is out of range.
    pub fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
        let (plane, at) = self.offset(channel, index);
        let bps = self.format.bytes_per_sample();
        let format = self.format;
        format.write_sample(value, &mut self.planes[plane][at..at + bps]);
    }

    /// All samples of one channel as normalized floats.
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        (0..self.nb_samples).map(|i| self.sample(channel, i)).collect()
    }

    /// Concatenate the planes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.planes.concat()
    }

    /// Append the samples of `other`, which must share format and layout.
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.format != self.format || other.layout != self.layout {
            return Err(Error::invalid_param(format!(
                "cannot append {}/{} samples to a {}/{} buffer",
                other.format, other.layout, self.format, self.layout
            )));
        }
        for (dst, src) in self.planes.iter_mut().zip(&other.planes) {
            dst.extend_from_slice(src);
        }
        self.nb_samples += other.nb_samples;
        Ok(())
    }

    /// Remove and return the first `count` samples (fewer if not available).
    pub fn take_front(&mut self, count: usize) -> AudioBuffer {
        let count = count.min(self.nb_samples);
        let bytes = if self.format.is_planar() {
            count * self.format.bytes_per_sample()
        } else {
            count * self.format.bytes_per_sample() * self.channels()
        };
        let planes = self
            .planes
            .iter_mut()
            .map(|p| p.drain(..bytes).collect())
            .collect();
        self.nb_samples -= count;
        AudioBuffer {
            format: self.format,
            layout: self.layout,
            sample_rate: self.sample_rate,
            nb_samples: count,
            planes,
        }
    }
}

/// Frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    Audio(AudioBuffer),
    Video(VideoBuffer),
}

/// A decoded frame travelling through the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Payload.
    pub data: FrameData,
    /// Presentation timestamp, in the time base passed alongside the frame.
    pub pts: i64,
    /// Decode timestamp, [`NO_PTS`] when unknown.
    pub dts: i64,
    /// Caller metadata.
    pub info: FrameInfo,
}

impl Frame {
    /// Create an audio frame.
    pub fn audio(buffer: AudioBuffer, pts: i64) -> Self {
        Self {
            data: FrameData::Audio(buffer),
            pts,
            dts: NO_PTS,
            info: FrameInfo::default(),
        }
    }

    /// Create a video frame.
    pub fn video(buffer: VideoBuffer, pts: i64) -> Self {
        Self {
            data: FrameData::Video(buffer),
            pts,
            dts: NO_PTS,
            info: FrameInfo::default(),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_info(mut self, info: FrameInfo) -> Self {
        self.info = info;
        self
    }

    /// Kind of payload.
    pub fn media_type(&self) -> MediaType {
        match self.data {
            FrameData::Audio(_) => MediaType::Audio,
            FrameData::Video(_) => MediaType::Video,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioBuffer> {
        match &self.data {
            FrameData::Audio(a) => Some(a),
            FrameData::Video(_) => None,
        }
    }

    pub fn as_audio_mut(&mut self) -> Option<&mut AudioBuffer> {
        match &mut self.data {
            FrameData::Audio(a) => Some(a),
            FrameData::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoBuffer> {
        match &self.data {
            FrameData::Video(v) => Some(v),
            FrameData::Audio(_) => None,
        }
    }

    pub fn as_video_mut(&mut self) -> Option<&mut VideoBuffer> {
        match &mut self.data {
            FrameData::Video(v) => Some(v),
            FrameData::Audio(_) => None,
        }
    }
}

fn align(bytes: usize) -> usize {
    bytes.div_ceil(ALIGNMENT) * ALIGNMENT
}
