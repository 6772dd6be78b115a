use crate::common::*;

pub const CLIP_PIXEL_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_PIXEL_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];
pub const CLIP_IMAGE_SIZE: usize = 224;

/// Prepares images for the CLIP vision tower.
///
/// The shortest side is resized to the crop size, the center square is
/// cropped, and the pixels are rescaled to `[0, 1]` and normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipImageProcessor {
    crop_size: usize,
    pixel_mean: [f32; 3],
    pixel_std: [f32; 3],
}

impl ClipImageProcessor {
    pub fn new(crop_size: usize) -> Result<Self> {
        ensure!(crop_size > 0, "crop_size must be positive");
        Ok(Self {
            crop_size,
            pixel_mean: CLIP_PIXEL_MEAN,
            pixel_std: CLIP_PIXEL_STD,
        })
    }

    pub fn crop_size(&self) -> usize {
        self.crop_size
    }

    /// Process a `[3, h, w]` uint8 image into a `[3, crop, crop]` float image.
    pub fn preprocess(&self, image: &Tensor) -> Result<Tensor> {
        let crop = self.crop_size as i64;
        let (channels, h, w) = image.size3()?;
        ensure!(
            channels == 3,
            "expect 3 channels, but get {} channels",
            channels
        );

        let scale = crop as f64 / h.min(w) as f64;
        let new_h = ((h as f64 * scale).round() as i64).max(crop);
        let new_w = ((w as f64 * scale).round() as i64).max(crop);
        let resized = vision::image::resize(image, new_w, new_h)?;

        let top = (new_h - crop) / 2;
        let left = (new_w - crop) / 2;

        let output = tch::no_grad(|| {
            let mean = Tensor::of_slice(&self.pixel_mean).view([3, 1, 1]);
            let std = Tensor::of_slice(&self.pixel_std).view([3, 1, 1]);
            let cropped = resized.narrow(1, top, crop).narrow(2, left, crop);
            (cropped.to_kind(Kind::Float) / 255.0 - mean) / std
        });

        Ok(output)
    }
}
