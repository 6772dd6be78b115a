//! The data pipeline driver for the seg-dl project.

pub mod common;
pub mod config;
pub mod loader;
pub mod summary;
pub mod utils;

use crate::{
    common::*,
    config::{Config, DatasetConfig, DatasetKind, TokenizerConfig},
    loader::{BatchLoader, SampleOrder},
    summary::{BatchStats, RunSummary},
};
use seg_dl::{
    collate::BatchCollator,
    dataset::{SampleContext, SegDataset, TumorDataset, ValDataset},
    processor::ImageProcessor,
    tokenizer::{HfTokenizer, TextTokenizer, WhitespaceTokenizer},
};
use tracing::info_span;

/// The entry of the data pipeline program.
///
/// It returns the run directory, which holds the resolved configuration
/// and the batch summary.
pub fn start(config: Arc<Config>) -> Result<PathBuf> {
    let start_time = Local::now();
    let logging_dir = config
        .logging
        .dir
        .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));

    // create dirs and save config
    {
        fs::create_dir_all(&logging_dir)?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        fs::write(&path, text)?;
    }

    let tokenizer = build_tokenizer(&config.tokenizer)?;
    let template = config.prompt.template.template();
    let processor = ImageProcessor::new(config.image.image_size, config.image.clip_image_size)?;
    let context = SampleContext::new(processor, template.clone());

    // load dataset
    info!("loading dataset");
    let dataset = {
        let _span = info_span!("load_dataset").entered();
        build_dataset(&config.dataset, context)?
    };
    info!("{} samples per epoch", dataset.num_samples());

    let collator = BatchCollator::new(tokenizer, template, config.prompt.use_mm_start_end);
    let order = if config.dataset.kind.is_validation() {
        SampleOrder::Sequential
    } else {
        SampleOrder::Random
    };
    let loader = BatchLoader::new(
        &*dataset,
        &collator,
        order,
        config.loader.batch_size,
        config.loader.num_batches,
        config.loader.seed,
    )?;

    let mut summary = RunSummary::default();
    {
        let _span = info_span!("collate").entered();

        for (index, result) in loader.enumerate() {
            let batch = result.with_context(|| format!("failed to load batch {}", index))?;
            let stats = BatchStats::new(&batch);
            info!(
                "batch {}: {} samples, {} conversations, seq_len {}, {} supervised tokens",
                index,
                stats.num_samples,
                stats.num_conversations,
                stats.seq_len,
                stats.supervised_tokens
            );
            summary.add(&stats);
        }
    }

    {
        let path = logging_dir.join("summary.json");
        let text = serde_json::to_string_pretty(&summary)?;
        fs::write(&path, text)?;
    }
    info!(
        "collated {} batches, summary is saved to '{}'",
        summary.num_batches,
        logging_dir.display()
    );

    Ok(logging_dir)
}

/// Load the configured tokenizer.
pub fn build_tokenizer(config: &TokenizerConfig) -> Result<Arc<dyn TextTokenizer>> {
    let tokenizer: Arc<dyn TextTokenizer> = match config {
        TokenizerConfig::HuggingFace {
            file,
            bos_token,
            pad_token,
            model_max_length,
        } => Arc::new(HfTokenizer::open(
            file,
            bos_token,
            pad_token,
            *model_max_length,
        )?),
        TokenizerConfig::Whitespace {
            vocab_size,
            model_max_length,
        } => {
            warn!("using the whitespace tokenizer, token ids do not match any model");
            Arc::new(WhitespaceTokenizer::new(*vocab_size, *model_max_length)?)
        }
    };
    Ok(tokenizer)
}

/// Load the configured dataset.
pub fn build_dataset(
    config: &DatasetConfig,
    context: SampleContext,
) -> Result<Box<dyn SegDataset>> {
    let DatasetConfig { base_dir, kind } = config;
    ensure!(
        base_dir.is_dir(),
        "dataset directory '{}' does not exist",
        base_dir.display()
    );

    let dataset: Box<dyn SegDataset> = match kind {
        DatasetKind::Hybrid(init) => Box::new(init.clone().build(base_dir, context)?),
        DatasetKind::Val { val_dataset } => {
            Box::new(ValDataset::load(base_dir, val_dataset, context)?)
        }
        DatasetKind::Tumor(tumor) => Box::new(TumorDataset::training(
            base_dir,
            &tumor.mode,
            tumor.options.clone(),
            context,
        )?),
        DatasetKind::ValTumor(tumor) => Box::new(TumorDataset::validation(
            base_dir,
            &tumor.mode,
            tumor.options.clone(),
            context,
        )?),
    };
    Ok(dataset)
}
