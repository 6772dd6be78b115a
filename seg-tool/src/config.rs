//! Data pipeline configuration format.

use crate::common::*;
use seg_dl::{
    conversation::TemplateKind,
    dataset::{HybridDatasetInit, TumorOptions},
    processor::{CLIP_IMAGE_SIZE, SAM_IMAGE_SIZE},
};

pub use dataset::*;
pub use tokenizer::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub image: ImageConfig,
    pub loader: LoaderConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The directory holding every data source.
        pub base_dir: PathBuf,
        /// The dataset configuration.
        pub kind: DatasetKind,
    }

    /// Variants of dataset and options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum DatasetKind {
        /// The weighted training mixture.
        Hybrid(HybridDatasetInit),
        /// Validation over a reasoning or referring split.
        Val {
            /// `name|split` or `dataset|split_by|split`.
            val_dataset: String,
        },
        /// Brain tumor slices for training.
        Tumor(TumorConfig),
        /// Brain tumor slices for validation.
        ValTumor(TumorConfig),
    }

    impl DatasetKind {
        /// Whether samples are visited in order for evaluation.
        pub fn is_validation(&self) -> bool {
            matches!(self, Self::Val { .. } | Self::ValTumor(_))
        }
    }

    /// Tumor dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TumorConfig {
        /// The split directory, such as `Training`, `Val` or `Test`.
        #[serde(default = "default_tumor_mode")]
        pub mode: String,
        #[serde(default)]
        pub options: TumorOptions,
    }

    fn default_tumor_mode() -> String {
        "Training".into()
    }
}

mod tokenizer {
    use super::*;

    /// Tokenizer options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum TokenizerConfig {
        /// A HuggingFace `tokenizer.json` file.
        HuggingFace {
            file: PathBuf,
            #[serde(default = "default_bos_token")]
            bos_token: String,
            #[serde(default = "default_pad_token")]
            pad_token: String,
            model_max_length: usize,
        },
        /// The hashing word tokenizer, for dry runs without a vocabulary.
        Whitespace {
            vocab_size: usize,
            model_max_length: usize,
        },
    }

    fn default_bos_token() -> String {
        "<s>".into()
    }

    fn default_pad_token() -> String {
        "<unk>".into()
    }
}

/// Conversation formatting options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub template: TemplateKind,
    #[serde(default)]
    pub use_mm_start_end: bool,
}

/// Image preprocessing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// The square input size of the segmenter.
    pub image_size: usize,
    /// The crop size of the text-image encoder.
    pub clip_image_size: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            image_size: SAM_IMAGE_SIZE,
            clip_image_size: CLIP_IMAGE_SIZE,
        }
    }
}

/// Batch loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub batch_size: NonZeroUsize,
    pub num_batches: usize,
    #[serde(default)]
    pub seed: u64,
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}
