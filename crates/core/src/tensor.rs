//! Host tensor conventions.
//!
//! The workflow runtime exchanges images as `(B, H, W, C)` float
//! tensors with `C` in {3, 4} and values in `[0.0, 1.0]`, masks as
//! `(B, H, W)` floats where `1.0` means "selected", and latents as an
//! opaque handle whose `samples` field is `(B, C', H/8, W/8)`.
//! This module pins those layouts down and provides the conversions
//! between tensors and [`image`] buffers used by the flusher and the
//! vision rasterizer.

use image::{GrayImage, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::CoreError;

/// Image tensor: `(B, H, W, C)`, `C` in {3, 4}, values in `[0.0, 1.0]`.
pub type ImageTensor = Array4<f32>;

/// Mask tensor: `(B, H, W)`, values in `[0.0, 1.0]`.
pub type MaskTensor = Array3<f32>;

/// Spatial downscale factor between pixel space and latent space.
pub const LATENT_SCALE: u32 = 8;

/// Channel count of an empty latent.
const LATENT_CHANNELS: usize = 4;

// ---------------------------------------------------------------------------
// Latent
// ---------------------------------------------------------------------------

/// A latent batch as produced and consumed by the host sampler.
#[derive(Debug, Clone)]
pub struct Latent {
    /// `(B, C', H/8, W/8)`.
    pub samples: Array4<f32>,
}

impl Latent {
    /// A zero latent of the requested pixel resolution with batch 1.
    pub fn empty(width: u32, height: u32) -> Self {
        let h = (height / LATENT_SCALE) as usize;
        let w = (width / LATENT_SCALE) as usize;
        Self {
            samples: Array4::zeros((1, LATENT_CHANNELS, h, w)),
        }
    }

    /// Extract a single batch element as a new batch-1 latent.
    pub fn slice_batch(&self, index: usize) -> Self {
        let single = self
            .samples
            .index_axis(Axis(0), index)
            .to_owned()
            .insert_axis(Axis(0));
        Self { samples: single }
    }

    pub fn batch_size(&self) -> usize {
        self.samples.shape()[0]
    }

    /// Pixel-space width implied by the latent resolution.
    pub fn width(&self) -> u32 {
        self.samples.shape()[3] as u32 * LATENT_SCALE
    }

    /// Pixel-space height implied by the latent resolution.
    pub fn height(&self) -> u32 {
        self.samples.shape()[2] as u32 * LATENT_SCALE
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Convert an RGB buffer into a batch-1 image tensor.
pub fn image_to_tensor(img: &RgbImage) -> ImageTensor {
    let (w, h) = (img.width() as usize, img.height() as usize);
    Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
        f32::from(img.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

/// Convert one `(H, W, C)` frame of an image tensor into an RGB buffer.
///
/// Alpha channels are dropped; values are clamped into `[0, 1]` before
/// quantization.
pub fn frame_to_image(frame: ArrayView3<'_, f32>) -> Result<RgbImage, CoreError> {
    let shape = frame.shape();
    let (h, w, c) = (shape[0], shape[1], shape[2]);
    if c < 3 {
        return Err(CoreError::TensorShape(format!(
            "expected at least 3 channels, got {c}"
        )));
    }
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let px = |ch: usize| {
            (frame[[y as usize, x as usize, ch]].clamp(0.0, 1.0) * 255.0).round() as u8
        };
        Rgb([px(0), px(1), px(2)])
    }))
}

/// Convert a grayscale buffer into a batch-1 mask tensor.
pub fn gray_to_mask(img: &GrayImage) -> MaskTensor {
    let (w, h) = (img.width() as usize, img.height() as usize);
    Array3::from_shape_fn((1, h, w), |(_, y, x)| {
        f32::from(img.get_pixel(x as u32, y as u32)[0]) / 255.0
    })
}

/// Check that two resolutions share an aspect ratio within one pixel.
///
/// Used to validate resizes that exist purely for coordinate
/// compatibility between prediction space and image space.
pub fn aspect_preserved(from: (u32, u32), to: (u32, u32)) -> bool {
    let (fw, fh) = (from.0 as f64, from.1 as f64);
    let (tw, th) = (to.0 as f64, to.1 as f64);
    if fh == 0.0 || th == 0.0 {
        return false;
    }
    // Project the source aspect onto the target height and compare widths.
    let projected_w = fw / fh * th;
    (projected_w - tw).abs() <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_latent_shape() {
        let latent = Latent::empty(512, 768);
        assert_eq!(latent.samples.shape(), &[1, 4, 96, 64]);
        assert_eq!(latent.width(), 512);
        assert_eq!(latent.height(), 768);
    }

    #[test]
    fn slice_batch_keeps_resolution() {
        let batch = Latent {
            samples: Array4::zeros((3, 4, 8, 8)),
        };
        let single = batch.slice_batch(1);
        assert_eq!(single.batch_size(), 1);
        assert_eq!(single.width(), 64);
        assert_eq!(single.height(), 64);
    }

    #[test]
    fn image_tensor_round_trip() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(3, 1, Rgb([255, 128, 0]));
        let tensor = image_to_tensor(&img);
        assert_eq!(tensor.shape(), &[1, 2, 4, 3]);
        assert!((tensor[[0, 1, 3, 0]] - 1.0).abs() < 1e-6);

        let back = frame_to_image(tensor.index_axis(Axis(0), 0)).unwrap();
        assert_eq!(back.get_pixel(3, 1), &Rgb([255, 128, 0]));
    }

    #[test]
    fn mask_values_normalized() {
        let mut gray = GrayImage::new(2, 2);
        gray.put_pixel(0, 0, image::Luma([255]));
        let mask = gray_to_mask(&gray);
        assert_eq!(mask.shape(), &[1, 2, 2]);
        assert_eq!(mask[[0, 0, 0]], 1.0);
        assert_eq!(mask[[0, 1, 1]], 0.0);
    }

    #[test]
    fn aspect_tolerance_is_one_pixel() {
        assert!(aspect_preserved((1024, 1024), (512, 512)));
        assert!(aspect_preserved((1023, 1024), (512, 512)));
        assert!(!aspect_preserved((1024, 512), (512, 512)));
    }
}
