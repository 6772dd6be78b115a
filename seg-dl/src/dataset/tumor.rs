//! Brain tumor slices with per-class `.npy` masks.
//!
//! The directory layout under `<base>/<mode>` is
//!
//! ```text
//! image/**/<slice>.jpg
//! mask/**/<slice>.npy
//! captions_per_slice/**/<slice>.txt
//! ```
//!
//! Mask values are stored one-indexed, 0 being background.

use super::{
    glob_files, ignore_label, load_npy_mask, masks_to_tensor, sibling_path, unique_values, Sample,
    SampleContext, SegDataset,
};
use crate::{
    common::*,
    conversation::{
        with_image, ANSWER_LIST, TUMOR_CLASS_NAMES, TUMOR_CLASS_QUESTIONS, WHOLE_TUMOR_QUESTION,
    },
};

/// A zero-based tumor class.
///
/// The stored mask value of a class is its index plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TumorClass(usize);

impl TumorClass {
    pub fn new(index: usize, num_classes: usize) -> Result<Self> {
        ensure!(
            index < num_classes,
            "class index {} is out of range for {} classes",
            index,
            num_classes
        );
        Ok(Self(index))
    }

    /// Convert a one-indexed stored mask value.
    pub fn from_stored(value: i64, num_classes: usize) -> Result<Self> {
        ensure!(
            value >= 1 && value as usize <= num_classes,
            "stored mask value {} is out of range for {} classes",
            value,
            num_classes
        );
        Ok(Self(value as usize - 1))
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn stored(&self) -> i64 {
        self.0 as i64 + 1
    }

    pub fn name(&self) -> &'static str {
        TUMOR_CLASS_NAMES.get(self.0).copied().unwrap_or("tumor")
    }

    fn question(&self) -> Result<&'static str> {
        TUMOR_CLASS_QUESTIONS
            .get(self.0)
            .copied()
            .ok_or_else(|| format_err!("no question defined for tumor class {}", self.0))
    }
}

/// One slice that survived indexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TumorSlice {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
    pub caption_path: PathBuf,
    /// Classes present in the mask, in ascending order.
    pub classes: Vec<TumorClass>,
    /// Whether any mask value is positive.
    pub has_foreground: bool,
}

/// The slice list of one split, built eagerly at construction.
#[derive(Debug, Clone)]
pub struct TumorIndex {
    slices: Vec<TumorSlice>,
    num_scanned: usize,
}

impl TumorIndex {
    /// Scan `<base_dir>/<mode>` and record the classes of every slice.
    ///
    /// Slices without foreground are dropped when `filter_empty_slices` is
    /// set. Stored values above `num_classes` are errors unless
    /// `merge_classes` is set, in which case they count as foreground but
    /// not as a class. Missing directories, unreadable masks and an empty
    /// result are errors.
    pub fn build(base_dir: impl AsRef<Path>, mode: &str, options: &TumorOptions) -> Result<Self> {
        let TumorOptions {
            num_classes,
            filter_empty_slices,
            merge_classes,
            ..
        } = *options;
        ensure!(num_classes > 0, "num_classes must be positive");
        let root = base_dir.as_ref().join(mode);
        let image_dir = root.join("image");
        let mask_dir = root.join("mask");
        let caption_dir = root.join("captions_per_slice");

        let image_paths = glob_files(&image_dir, "**/*.jpg")
            .with_context(|| format!("unable to list tumor images in '{}'", root.display()))?;
        let num_scanned = image_paths.len();

        let slices: Vec<TumorSlice> = image_paths
            .into_iter()
            .map(|image_path| -> Result<_> {
                let mask_path = sibling_path(&image_path, &image_dir, &mask_dir, "npy")?;
                let caption_path = sibling_path(&image_path, &image_dir, &caption_dir, "txt")?;
                let mask = load_npy_mask(&mask_path)?;
                let values: Vec<i64> = unique_values(&mask)
                    .into_iter()
                    .filter(|&value| value != 0)
                    .collect();

                let classes: Vec<TumorClass> = if merge_classes {
                    values
                        .iter()
                        .filter_map(|&value| TumorClass::from_stored(value, num_classes).ok())
                        .collect()
                } else {
                    values
                        .iter()
                        .map(|&value| {
                            TumorClass::from_stored(value, num_classes).with_context(|| {
                                format!("invalid mask '{}'", mask_path.display())
                            })
                        })
                        .try_collect()?
                };

                Ok(TumorSlice {
                    image_path,
                    mask_path,
                    caption_path,
                    classes,
                    has_foreground: values.iter().any(|&value| value > 0),
                })
            })
            .filter_ok(|slice| !filter_empty_slices || slice.has_foreground)
            .try_collect()?;

        let num_dropped = num_scanned - slices.len();
        if num_dropped > 0 {
            warn!(
                "{} out of {} slices without foreground are dropped in '{}'",
                num_dropped,
                num_scanned,
                root.display()
            );
        }
        ensure!(
            !slices.is_empty(),
            "no usable tumor slices found in '{}'",
            root.display()
        );

        Ok(Self {
            slices,
            num_scanned,
        })
    }

    pub fn slices(&self) -> &[TumorSlice] {
        &self.slices
    }

    pub fn num_scanned(&self) -> usize {
        self.num_scanned
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&TumorSlice> {
        self.slices.get(index).ok_or_else(|| {
            format_err!(
                "index {} is out of range for {} slices",
                index,
                self.slices.len()
            )
        })
    }
}

/// How a tumor sample chooses its target region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TumorOptions {
    pub num_classes: usize,
    /// Drop slices without foreground at construction.
    pub filter_empty_slices: bool,
    /// Only draw classes present in the slice.
    pub positive_classes_only: bool,
    /// Segment the union of all classes instead of a single class.
    pub merge_classes: bool,
    /// Number of copies of the conversation and mask in a training sample.
    pub conversations_per_sample: usize,
}

impl Default for TumorOptions {
    fn default() -> Self {
        Self {
            num_classes: 3,
            filter_empty_slices: true,
            positive_classes_only: true,
            merge_classes: true,
            conversations_per_sample: 3,
        }
    }
}

/// Tumor slices with a fixed tumor question.
///
/// The training variant repeats the conversation and mask
/// `conversations_per_sample` times, the validation variant returns one
/// conversation and marks the sample for inference.
#[derive(Debug, Clone)]
pub struct TumorDataset {
    index: TumorIndex,
    options: TumorOptions,
    context: SampleContext,
    inference: bool,
}

impl TumorDataset {
    pub fn training(
        base_dir: impl AsRef<Path>,
        mode: &str,
        options: TumorOptions,
        context: SampleContext,
    ) -> Result<Self> {
        Self::new(base_dir, mode, options, context, false)
    }

    pub fn validation(
        base_dir: impl AsRef<Path>,
        mode: &str,
        options: TumorOptions,
        context: SampleContext,
    ) -> Result<Self> {
        let options = TumorOptions {
            conversations_per_sample: 1,
            ..options
        };
        Self::new(base_dir, mode, options, context, true)
    }

    fn new(
        base_dir: impl AsRef<Path>,
        mode: &str,
        options: TumorOptions,
        context: SampleContext,
        inference: bool,
    ) -> Result<Self> {
        ensure!(
            options.conversations_per_sample > 0,
            "conversations_per_sample must be positive"
        );
        ensure!(
            options.num_classes <= TUMOR_CLASS_QUESTIONS.len(),
            "at most {} tumor classes are supported, but get {}",
            TUMOR_CLASS_QUESTIONS.len(),
            options.num_classes
        );
        let index = TumorIndex::build(base_dir, mode, &options)?;

        Ok(Self {
            index,
            options,
            context,
            inference,
        })
    }

    pub fn index(&self) -> &TumorIndex {
        &self.index
    }

    /// Read the caption of a class for the slice at `index`.
    ///
    /// The caption file holds one line per class in class order.
    pub fn caption(&self, index: usize, class: TumorClass) -> Result<String> {
        let slice = self.index.get(index)?;
        let path = &slice.caption_path;
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read caption file '{}'", path.display()))?;
        let line = content.lines().nth(class.index()).ok_or_else(|| {
            format_err!(
                "caption file '{}' has no line for class {}",
                path.display(),
                class.index()
            )
        })?;
        Ok(line.trim().to_owned())
    }

    fn pick_class(&self, slice: &TumorSlice, rng: &mut dyn RngCore) -> Result<TumorClass> {
        if self.options.positive_classes_only {
            slice.classes.choose(rng).copied().ok_or_else(|| {
                format_err!(
                    "slice '{}' has no foreground class",
                    slice.image_path.display()
                )
            })
        } else {
            TumorClass::new(rng.gen_range(0..self.options.num_classes), self.options.num_classes)
        }
    }
}

impl SegDataset for TumorDataset {
    fn num_samples(&self) -> usize {
        self.index.len()
    }

    fn sample(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let slice = self.index.get(index)?;
        let processed = self.context.load_image(&slice.image_path)?;
        let [h, w] = processed.orig_size;

        let stored = load_npy_mask(&slice.mask_path)?;
        ensure!(
            stored.dim() == (h as usize, w as usize),
            "mask '{}' has size {:?}, but the image has size {:?}",
            slice.mask_path.display(),
            stored.dim(),
            (h, w)
        );

        let (question, mask) = if self.options.merge_classes {
            let mask = stored.mapv(|value| (value > 0) as u8);
            (WHOLE_TUMOR_QUESTION, mask)
        } else {
            let class = self.pick_class(slice, rng)?;
            let value = class.stored();
            let mask = stored.mapv(|stored| (stored == value) as u8);
            (class.question()?, mask)
        };

        let question = with_image(question);
        let conversation = self.context.single_turn(&question, ANSWER_LIST[0]);

        let repeat = self.options.conversations_per_sample;
        let conversations = vec![conversation; repeat];
        let masks = vec![&mask; repeat];

        Ok(Sample {
            image_path: slice.image_path.clone(),
            images: processed.image,
            images_clip: processed.image_clip,
            conversations,
            masks: masks_to_tensor(&masks, h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: Some(vec![question]),
            sampled_classes: None,
            inference: self.inference,
            text_only: false,
        })
    }
}
