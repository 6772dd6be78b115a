use crate::{
    common::*,
    conversation::ConversationTemplate,
    processor::{ImageProcessor, ProcessedImage},
};

/// Label value of pixels excluded from the mask loss.
pub const IGNORE_LABEL: i64 = 255;

/// One segmentation training or validation sample.
#[derive(Debug, TensorLike)]
pub struct Sample {
    #[tensor_like(clone)]
    pub image_path: PathBuf,
    /// `[3, size, size]` float image for the mask decoder.
    pub images: Tensor,
    /// `[3, crop, crop]` float image for the vision tower.
    pub images_clip: Tensor,
    #[tensor_like(clone)]
    pub conversations: Vec<String>,
    /// `[n, h, w]` uint8 masks in the source image resolution.
    pub masks: Tensor,
    /// `[h, w]` int64 label map.
    pub label: Tensor,
    #[tensor_like(clone)]
    pub resize: [i64; 2],
    #[tensor_like(clone)]
    pub questions: Option<Vec<String>>,
    #[tensor_like(clone)]
    pub sampled_classes: Option<Vec<String>>,
    #[tensor_like(clone)]
    pub inference: bool,
    /// Set for samples carrying no mask supervision.
    #[tensor_like(clone)]
    pub text_only: bool,
}

impl Sample {
    /// Verify that masks agree with conversations and the label map.
    pub fn check(&self) -> Result<()> {
        let (num_masks, mask_h, mask_w) = self.masks.size3()?;
        let (label_h, label_w) = self.label.size2()?;

        ensure!(
            (mask_h, mask_w) == (label_h, label_w),
            "mask size {:?} differs from label size {:?} in '{}'",
            (mask_h, mask_w),
            (label_h, label_w),
            self.image_path.display()
        );

        let expect = if self.text_only {
            0
        } else {
            self.conversations.len() as i64
        };
        ensure!(
            num_masks == expect,
            "expect {} masks for {} conversations, but get {} in '{}'",
            expect,
            self.conversations.len(),
            num_masks,
            self.image_path.display()
        );

        Ok(())
    }
}

/// Shared settings that turn records into samples.
#[derive(Debug, Clone)]
pub struct SampleContext {
    pub processor: ImageProcessor,
    pub template: ConversationTemplate,
}

impl SampleContext {
    pub fn new(processor: ImageProcessor, template: ConversationTemplate) -> Self {
        Self {
            processor,
            template,
        }
    }

    pub fn load_image(&self, path: impl AsRef<Path>) -> Result<ProcessedImage> {
        self.processor.load_and_process(path)
    }

    /// Render a single question and answer exchange.
    pub fn single_turn(&self, question: &str, answer: &str) -> String {
        self.template
            .conversation()
            .user(question)
            .assistant(answer)
            .prompt()
    }
}

/// Convert a `[h, w]` array into a uint8 tensor.
pub fn array_to_tensor(array: &Array2<u8>) -> Tensor {
    let (h, w) = array.dim();
    let values: Vec<u8> = array.iter().copied().collect();
    Tensor::of_slice(&values).view([h as i64, w as i64])
}

/// Stack `[h, w]` masks into a `[n, h, w]` uint8 tensor.
///
/// An empty list yields a `[0, h, w]` tensor.
pub fn masks_to_tensor<M>(masks: &[M], h: i64, w: i64) -> Result<Tensor>
where
    M: Borrow<Array2<u8>>,
{
    let mut values = Vec::with_capacity(masks.len() * (h * w) as usize);

    for mask in masks {
        let mask = mask.borrow();
        ensure!(
            mask.dim() == (h as usize, w as usize),
            "mask size {:?} differs from image size {:?}",
            mask.dim(),
            (h, w)
        );
        values.extend(mask.iter().copied());
    }

    if masks.is_empty() {
        return Ok(Tensor::zeros(&[0, h, w], (Kind::Uint8, Device::Cpu)));
    }
    Ok(Tensor::of_slice(&values).view([masks.len() as i64, h, w]))
}

/// The `[h, w]` label map filled with [IGNORE_LABEL].
pub fn ignore_label(h: i64, w: i64) -> Tensor {
    Tensor::ones(&[h, w], INT64_CPU) * IGNORE_LABEL
}
