//! Owned pixel buffers for montage frames and canvases.
//!
//! Frames are stored as flat sample vectors (8- or 16-bit) with an explicit
//! [`PixelKind`], so grid placement and text burn-in are plain slice
//! arithmetic. The `image` crate only appears at the decode/encode boundary.

use anyhow::{anyhow, bail, Result};
use image::{DynamicImage, ImageBuffer};

use crate::error_codes::{CodedError, FRAME_DTYPE_UNSUPPORTED};

/// Pixel layout of one frame. Integer samples only; the maximum representable
/// value drives overlay and margin tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelKind {
    Gray8,
    Gray16,
    Rgb8,
    Rgb16,
    Rgba8,
    Rgba16,
}

impl PixelKind {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray8 | Self::Gray16 => 1,
            Self::Rgb8 | Self::Rgb16 => 3,
            Self::Rgba8 | Self::Rgba16 => 4,
        }
    }

    /// Channels that carry color, excluding alpha.
    pub fn color_channels(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba16 => 3,
            other => other.channels(),
        }
    }

    pub fn max_value(self) -> u32 {
        match self {
            Self::Gray8 | Self::Rgb8 | Self::Rgba8 => u32::from(u8::MAX),
            Self::Gray16 | Self::Rgb16 | Self::Rgba16 => u32::from(u16::MAX),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Gray8 => "gray8",
            Self::Gray16 => "gray16",
            Self::Rgb8 => "rgb8",
            Self::Rgb16 => "rgb16",
            Self::Rgba8 => "rgba8",
            Self::Rgba16 => "rgba16",
        }
    }

    fn wide(self) -> bool {
        matches!(self, Self::Gray16 | Self::Rgb16 | Self::Rgba16)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

/// One frame (or the montage canvas): fixed size, fixed pixel kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuf {
    width: u32,
    height: u32,
    kind: PixelKind,
    samples: Samples,
}

impl FrameBuf {
    /// Allocate a buffer with every sample set to `value` (clamped to the
    /// sample range). Alpha channels are set like any other channel.
    pub fn filled(width: u32, height: u32, kind: PixelKind, value: u32) -> Self {
        let len = width as usize * height as usize * kind.channels();
        let samples = if kind.wide() {
            Samples::U16(vec![value.min(u32::from(u16::MAX)) as u16; len])
        } else {
            Samples::U8(vec![value.min(u32::from(u8::MAX)) as u8; len])
        };
        Self {
            width,
            height,
            kind,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    /// Convert a decoded image into an owned buffer.
    ///
    /// Gray+alpha inputs are widened to RGBA of matching depth; float-sample
    /// images are rejected, the montage data model is integer pixels.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        let width = image.width();
        let height = image.height();
        let (kind, samples) = match image {
            DynamicImage::ImageLuma8(buf) => (PixelKind::Gray8, Samples::U8(buf.into_raw())),
            DynamicImage::ImageLuma16(buf) => (PixelKind::Gray16, Samples::U16(buf.into_raw())),
            DynamicImage::ImageRgb8(buf) => (PixelKind::Rgb8, Samples::U8(buf.into_raw())),
            DynamicImage::ImageRgb16(buf) => (PixelKind::Rgb16, Samples::U16(buf.into_raw())),
            DynamicImage::ImageRgba8(buf) => (PixelKind::Rgba8, Samples::U8(buf.into_raw())),
            DynamicImage::ImageRgba16(buf) => (PixelKind::Rgba16, Samples::U16(buf.into_raw())),
            image @ DynamicImage::ImageLumaA8(_) => {
                (PixelKind::Rgba8, Samples::U8(image.into_rgba8().into_raw()))
            }
            image @ DynamicImage::ImageLumaA16(_) => {
                (PixelKind::Rgba16, Samples::U16(image.into_rgba16().into_raw()))
            }
            other => {
                return Err(CodedError::shape(
                    FRAME_DTYPE_UNSUPPORTED,
                    format!("unsupported pixel format {:?}", other.color()),
                )
                .into())
            }
        };
        Ok(Self {
            width,
            height,
            kind,
            samples,
        })
    }

    /// Hand the buffer back to the `image` crate for encoding.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let invalid = || anyhow!("sample buffer does not match {}x{} {}", w, h, self.kind.label());
        Ok(match (&self.samples, self.kind) {
            (Samples::U8(data), PixelKind::Gray8) => {
                DynamicImage::ImageLuma8(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            (Samples::U8(data), PixelKind::Rgb8) => {
                DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            (Samples::U8(data), PixelKind::Rgba8) => {
                DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            (Samples::U16(data), PixelKind::Gray16) => {
                DynamicImage::ImageLuma16(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            (Samples::U16(data), PixelKind::Rgb16) => {
                DynamicImage::ImageRgb16(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            (Samples::U16(data), PixelKind::Rgba16) => {
                DynamicImage::ImageRgba16(ImageBuffer::from_raw(w, h, data.clone()).ok_or_else(invalid)?)
            }
            _ => return Err(invalid()),
        })
    }

    /// Copy `src` in full onto this buffer with its top-left corner at
    /// `(x, y)`. Pixel kinds must match and the block must fit.
    pub fn copy_from(&mut self, src: &FrameBuf, x: u32, y: u32) -> Result<()> {
        if src.kind != self.kind {
            bail!(
                "cannot place a {} frame onto a {} canvas",
                src.kind.label(),
                self.kind.label()
            );
        }
        if u64::from(x) + u64::from(src.width) > u64::from(self.width)
            || u64::from(y) + u64::from(src.height) > u64::from(self.height)
        {
            bail!(
                "{}x{} block at ({}, {}) does not fit a {}x{} canvas",
                src.width,
                src.height,
                x,
                y,
                self.width,
                self.height
            );
        }

        let channels = self.kind.channels();
        let dst_stride = self.width as usize * channels;
        let src_stride = src.width as usize * channels;
        let x_offset = x as usize * channels;
        match (&mut self.samples, &src.samples) {
            (Samples::U8(dst), Samples::U8(data)) => {
                copy_rows(dst, data, dst_stride, src_stride, x_offset, y as usize, src.height as usize)
            }
            (Samples::U16(dst), Samples::U16(data)) => {
                copy_rows(dst, data, dst_stride, src_stride, x_offset, y as usize, src.height as usize)
            }
            _ => bail!("sample storage does not match pixel kind"),
        }
        Ok(())
    }

    /// Multiply every sample by `factor`, saturating at the sample range.
    pub fn scale_intensity(&mut self, factor: f32) {
        match &mut self.samples {
            Samples::U8(data) => {
                for sample in data.iter_mut() {
                    *sample = (f32::from(*sample) * factor)
                        .round()
                        .clamp(0.0, f32::from(u8::MAX)) as u8;
                }
            }
            Samples::U16(data) => {
                for sample in data.iter_mut() {
                    *sample = (f32::from(*sample) * factor)
                        .round()
                        .clamp(0.0, f32::from(u16::MAX)) as u16;
                }
            }
        }
    }

    /// Set the color channels of every pixel where `mask` holds `255` to
    /// `value`. Alpha is left untouched so annotated frames keep their
    /// transparency. `mask` is one byte per pixel.
    pub fn burn_mask(&mut self, mask: &[u8], value: u32) -> Result<()> {
        let pixels = self.width as usize * self.height as usize;
        if mask.len() != pixels {
            bail!(
                "mask holds {} pixels, frame holds {}",
                mask.len(),
                pixels
            );
        }

        let channels = self.kind.channels();
        let color_channels = self.kind.color_channels();
        match &mut self.samples {
            Samples::U8(data) => {
                let value = value.min(u32::from(u8::MAX)) as u8;
                for (pixel, &tone) in mask.iter().enumerate() {
                    if tone == u8::MAX {
                        let base = pixel * channels;
                        data[base..base + color_channels].fill(value);
                    }
                }
            }
            Samples::U16(data) => {
                let value = value.min(u32::from(u16::MAX)) as u16;
                for (pixel, &tone) in mask.iter().enumerate() {
                    if tone == u8::MAX {
                        let base = pixel * channels;
                        data[base..base + color_channels].fill(value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Read one sample, widened to `u32`. Intended for tests and canvas
    /// sampling; panics on out-of-range coordinates.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> u32 {
        assert!(x < self.width && y < self.height && channel < self.kind.channels());
        let index =
            (y as usize * self.width as usize + x as usize) * self.kind.channels() + channel;
        match &self.samples {
            Samples::U8(data) => u32::from(data[index]),
            Samples::U16(data) => u32::from(data[index]),
        }
    }
}

fn copy_rows<T: Copy>(
    dst: &mut [T],
    src: &[T],
    dst_stride: usize,
    src_stride: usize,
    x_offset: usize,
    y_offset: usize,
    rows: usize,
) {
    for row in 0..rows {
        let dst_start = (y_offset + row) * dst_stride + x_offset;
        let src_start = row * src_stride;
        dst[dst_start..dst_start + src_stride]
            .copy_from_slice(&src[src_start..src_start + src_stride]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_clamps_to_sample_range() {
        let buf = FrameBuf::filled(2, 2, PixelKind::Gray8, 70_000);
        assert_eq!(buf.sample(0, 0, 0), 255);

        let wide = FrameBuf::filled(2, 2, PixelKind::Gray16, 70_000);
        assert_eq!(wide.sample(1, 1, 0), 65_535);
    }

    #[test]
    fn copy_from_places_block_at_offset() {
        let mut canvas = FrameBuf::filled(4, 4, PixelKind::Rgb8, 0);
        let block = FrameBuf::filled(2, 2, PixelKind::Rgb8, 9);

        canvas.copy_from(&block, 2, 1).expect("block should fit");

        assert_eq!(canvas.sample(2, 1, 0), 9);
        assert_eq!(canvas.sample(3, 2, 2), 9);
        assert_eq!(canvas.sample(1, 1, 0), 0);
        assert_eq!(canvas.sample(2, 3, 0), 0);
    }

    #[test]
    fn copy_from_rejects_out_of_bounds_block() {
        let mut canvas = FrameBuf::filled(4, 4, PixelKind::Gray8, 0);
        let block = FrameBuf::filled(3, 3, PixelKind::Gray8, 1);
        assert!(canvas.copy_from(&block, 2, 2).is_err());
    }

    #[test]
    fn copy_from_rejects_kind_mismatch() {
        let mut canvas = FrameBuf::filled(4, 4, PixelKind::Gray8, 0);
        let block = FrameBuf::filled(2, 2, PixelKind::Rgb8, 1);
        assert!(canvas.copy_from(&block, 0, 0).is_err());
    }

    #[test]
    fn scale_intensity_saturates_instead_of_wrapping() {
        let mut buf = FrameBuf::filled(1, 1, PixelKind::Gray8, 200);
        buf.scale_intensity(2.0);
        assert_eq!(buf.sample(0, 0, 0), 255);

        let mut wide = FrameBuf::filled(1, 1, PixelKind::Gray16, 60_000);
        wide.scale_intensity(1.5);
        assert_eq!(wide.sample(0, 0, 0), 65_535);
    }

    #[test]
    fn burn_mask_sets_color_channels_and_keeps_alpha() {
        let mut buf = FrameBuf::filled(2, 1, PixelKind::Rgba8, 10);
        buf.burn_mask(&[255, 0], 200).expect("mask should apply");

        assert_eq!(buf.sample(0, 0, 0), 200);
        assert_eq!(buf.sample(0, 0, 2), 200);
        assert_eq!(buf.sample(0, 0, 3), 10, "alpha should be untouched");
        assert_eq!(buf.sample(1, 0, 0), 10, "unmasked pixel should be untouched");
    }

    #[test]
    fn burn_mask_rejects_wrong_mask_size() {
        let mut buf = FrameBuf::filled(2, 2, PixelKind::Gray8, 0);
        assert!(buf.burn_mask(&[255; 3], 1).is_err());
    }

    #[test]
    fn dynamic_roundtrip_preserves_sixteen_bit_samples() {
        let image = image::GrayImage::from_pixel(3, 2, image::Luma([7u8]));
        let buf = FrameBuf::from_dynamic(DynamicImage::ImageLuma8(image)).expect("gray8 decodes");
        assert_eq!(buf.kind(), PixelKind::Gray8);

        let mut wide = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::new(2, 2);
        wide.put_pixel(1, 0, image::Luma([40_000u16]));
        let buf = FrameBuf::from_dynamic(DynamicImage::ImageLuma16(wide)).expect("gray16 decodes");
        assert_eq!(buf.sample(1, 0, 0), 40_000);

        let round = buf.to_dynamic().expect("buffer is consistent");
        assert_eq!(round.color(), image::ColorType::L16);
    }

    #[test]
    fn float_samples_are_rejected() {
        let float = DynamicImage::ImageRgb32F(image::Rgb32FImage::new(2, 2));
        let error = FrameBuf::from_dynamic(float).expect_err("float frames are unsupported");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, FRAME_DTYPE_UNSUPPORTED);
    }
}
