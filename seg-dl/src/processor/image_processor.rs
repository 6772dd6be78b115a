use super::{ClipImageProcessor, SamTransform};
use crate::common::*;

/// The images derived from one source image.
#[derive(Debug)]
pub struct ProcessedImage {
    /// `[3, size, size]` normalized and padded image for the mask decoder.
    pub image: Tensor,
    /// `[3, crop, crop]` image for the vision tower.
    pub image_clip: Tensor,
    /// `[h, w]` size of the resized image before padding.
    pub resize: [i64; 2],
    /// `[h, w]` size of the source image.
    pub orig_size: [i64; 2],
}

/// Loads images and runs both encoder preprocessing paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageProcessor {
    sam: SamTransform,
    clip: ClipImageProcessor,
}

impl ImageProcessor {
    pub fn new(image_size: usize, clip_image_size: usize) -> Result<Self> {
        Ok(Self {
            sam: SamTransform::new(image_size)?,
            clip: ClipImageProcessor::new(clip_image_size)?,
        })
    }

    pub fn image_size(&self) -> usize {
        self.sam.image_size()
    }

    /// Load an image file as a `[3, h, w]` uint8 tensor.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Tensor> {
        let path = path.as_ref();
        let image = vision::image::load(path)
            .with_context(|| format!("unable to load image '{}'", path.display()))?;
        Ok(image)
    }

    /// Preprocess a `[3, h, w]` uint8 image.
    pub fn process(&self, image: &Tensor) -> Result<ProcessedImage> {
        let (_c, h, w) = image.size3()?;
        let image_clip = self.clip.preprocess(image)?;
        let (image, resize) = self.sam.forward(image)?;

        Ok(ProcessedImage {
            image,
            image_clip,
            resize,
            orig_size: [h, w],
        })
    }

    /// Load an image file and preprocess it.
    pub fn load_and_process(&self, path: impl AsRef<Path>) -> Result<ProcessedImage> {
        let image = self.load(path)?;
        self.process(&image)
    }
}
