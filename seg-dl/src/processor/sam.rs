use crate::common::*;

pub const SAM_PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
pub const SAM_PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];
pub const SAM_IMAGE_SIZE: usize = 1024;

/// Resizes images so that the longest side matches a target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeLongestSide {
    target_length: usize,
}

impl ResizeLongestSide {
    pub fn new(target_length: usize) -> Result<Self> {
        ensure!(target_length > 0, "target_length must be positive");
        Ok(Self { target_length })
    }

    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Compute the `[h, w]` output size for an `[h, w]` input size.
    pub fn output_size(&self, h: usize, w: usize) -> [usize; 2] {
        let scale = self.target_length as f64 / h.max(w) as f64;
        let new_h = (h as f64 * scale + 0.5) as usize;
        let new_w = (w as f64 * scale + 0.5) as usize;
        [new_h, new_w]
    }

    /// Resize a `[3, h, w]` uint8 image.
    pub fn apply_image(&self, image: &Tensor) -> Result<Tensor> {
        let (_c, h, w) = image.size3()?;
        let [new_h, new_w] = self.output_size(h as usize, w as usize);
        let resized = vision::image::resize(image, new_w as i64, new_h as i64)?;
        Ok(resized)
    }
}

/// Normalizes and pads images for the segmentation encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamTransform {
    resize: ResizeLongestSide,
    pixel_mean: [f32; 3],
    pixel_std: [f32; 3],
}

impl SamTransform {
    pub fn new(image_size: usize) -> Result<Self> {
        Ok(Self {
            resize: ResizeLongestSide::new(image_size)?,
            pixel_mean: SAM_PIXEL_MEAN,
            pixel_std: SAM_PIXEL_STD,
        })
    }

    pub fn image_size(&self) -> usize {
        self.resize.target_length()
    }

    /// Resize, normalize and pad a `[3, h, w]` uint8 image.
    ///
    /// It returns the `[3, size, size]` float image together with the
    /// `[h, w]` size before padding.
    pub fn forward(&self, image: &Tensor) -> Result<(Tensor, [i64; 2])> {
        let size = self.image_size() as i64;
        let resized = self.resize.apply_image(image)?;
        let (channels, h, w) = resized.size3()?;
        ensure!(
            channels == 3,
            "expect 3 channels, but get {} channels",
            channels
        );

        let output = tch::no_grad(|| {
            let mean = Tensor::of_slice(&self.pixel_mean).view([3, 1, 1]);
            let std = Tensor::of_slice(&self.pixel_std).view([3, 1, 1]);
            let normalized = (resized.to_kind(Kind::Float) - mean) / std;

            // pad bottom and right
            normalized
                .view([1, channels, h, w])
                .zero_pad2d(0, size - w, 0, size - h)
                .view([channels, size, size])
        });

        Ok((output, [h, w]))
    }
}
