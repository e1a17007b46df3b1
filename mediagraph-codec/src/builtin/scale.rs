//! Nearest-neighbour picture scaler.

use crate::error::{CodecError, Result};
use crate::traits::{Scaler, VideoParams};
use mediagraph_core::{PixelFormat, VideoBuffer};

/// How source planes map onto destination planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneMapping {
    /// Same plane layout on both sides.
    Direct,
    /// Luma only; destination chroma is neutral.
    LumaToYuv,
    /// Source chroma is dropped.
    YuvToLuma,
}

/// Scales planes independently by pixel replication.
#[derive(Debug, Clone)]
pub struct NearestScaler {
    input: VideoParams,
    output: VideoParams,
    mapping: PlaneMapping,
}

impl NearestScaler {
    /// Create a scaler. Only conversions that keep the plane structure are available.
    pub fn new(input: VideoParams, output: VideoParams) -> Result<Self> {
        use PixelFormat::*;

        if input.width == 0 || input.height == 0 || output.width == 0 || output.height == 0 {
            return Err(CodecError::UnsupportedConversion(format!(
                "{}x{} -> {}x{}",
                input.width, input.height, output.width, output.height
            )));
        }

        let mapping = match (input.format, output.format) {
            (a, b) if a == b => PlaneMapping::Direct,
            (Yuv420p, Yuvj420p) | (Yuvj420p, Yuv420p) => PlaneMapping::Direct,
            (Gray8, Yuv420p | Yuvj420p) => PlaneMapping::LumaToYuv,
            (Yuv420p | Yuvj420p, Gray8) => PlaneMapping::YuvToLuma,
            (a, b) => {
                return Err(CodecError::UnsupportedConversion(format!("{} -> {}", a, b)));
            }
        };

        Ok(Self {
            input,
            output,
            mapping,
        })
    }

    fn scale_plane(src: &VideoBuffer, src_plane: usize, dst: &mut VideoBuffer, dst_plane: usize) {
        // Samples per pixel inside a row, 3 for packed BGR.
        let bpp = src.format.plane_width(src_plane, 1).max(1);
        let src_w = src.format.plane_width(src_plane, src.width) / bpp;
        let src_h = src.format.plane_height(src_plane, src.height);
        let dst_w = dst.format.plane_width(dst_plane, dst.width) / bpp;
        let dst_h = dst.format.plane_height(dst_plane, dst.height);

        for y in 0..dst_h {
            let sy = y * src_h / dst_h;
            let src_row = src.row(src_plane, sy);
            let dst_row = dst.row_mut(dst_plane, y);
            for x in 0..dst_w {
                let sx = x * src_w / dst_w;
                dst_row[x * bpp..(x + 1) * bpp].copy_from_slice(&src_row[sx * bpp..(sx + 1) * bpp]);
            }
        }
    }
}

impl Scaler for NearestScaler {
    fn scale(&mut self, input: &VideoBuffer) -> Result<VideoBuffer> {
        if VideoParams::of(input) != self.input {
            return Err(CodecError::UnsupportedConversion(format!(
                "scaler configured for {}x{} {} got {}x{} {}",
                self.input.width,
                self.input.height,
                self.input.format,
                input.width,
                input.height,
                input.format
            )));
        }

        let mut out = VideoBuffer::new(self.output.format, self.output.width, self.output.height);
        out.keyframe = input.keyframe;
        out.interlaced = input.interlaced;
        out.top_field_first = input.top_field_first;
        out.sample_aspect_ratio = input.sample_aspect_ratio;

        match self.mapping {
            PlaneMapping::Direct => {
                for p in 0..input.num_planes() {
                    Self::scale_plane(input, p, &mut out, p);
                }
            }
            PlaneMapping::LumaToYuv => {
                Self::scale_plane(input, 0, &mut out, 0);
                out.fill_plane(1, 128);
                out.fill_plane(2, 128);
            }
            PlaneMapping::YuvToLuma => Self::scale_plane(input, 0, &mut out, 0),
        }
        Ok(out)
    }
}
