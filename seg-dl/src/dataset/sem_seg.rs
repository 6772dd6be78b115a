//! Semantic segmentation datasets with per-pixel class maps.
//!
//! Each dataset lives in `<base>/sem_seg/<name>/` with a `classes.txt`,
//! images in `images/**/*.jpg` and class maps in `labels/**/*.png` at the
//! same relative paths. Pixel values index into `classes.txt`, and 255
//! marks pixels to ignore.

use super::{
    array_to_tensor, glob_files, load_classes_file, load_label_map, masks_to_tensor,
    sibling_path, unique_values, Sample, SampleContext, SegDataset, IGNORE_LABEL,
};
use crate::{
    common::*,
    conversation::{random_answer, short_question},
};

const MAX_DRAWS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemSegRecord {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

#[derive(Debug, Clone)]
struct SemSegSource {
    name: String,
    classes: IndexSet<String>,
    records: Vec<SemSegRecord>,
}

impl SemSegSource {
    fn load(base_dir: &Path, name: &str) -> Result<Self> {
        let dir = base_dir.join("sem_seg").join(name);
        let classes = load_classes_file(dir.join("classes.txt"))?;
        let image_dir = dir.join("images");
        let label_dir = dir.join("labels");

        let records: Vec<_> = glob_files(&image_dir, "**/*.jpg")?
            .into_iter()
            .map(|image_path| -> Result<_> {
                let label_path = sibling_path(&image_path, &image_dir, &label_dir, "png")?;
                ensure!(
                    label_path.is_file(),
                    "label file '{}' is missing",
                    label_path.display()
                );
                Ok(SemSegRecord {
                    image_path,
                    label_path,
                })
            })
            .try_collect()?;
        ensure!(!records.is_empty(), "no images found in '{}'", dir.display());

        info!(
            "sem_seg ({}): {} classes, {} images",
            name,
            classes.len(),
            records.len()
        );

        Ok(Self {
            name: name.to_owned(),
            classes,
            records,
        })
    }
}

/// Semantic segmentation sampled by class.
///
/// Each sample draws a dataset, an image and up to
/// `num_classes_per_sample` of the classes present in the image.
#[derive(Debug, Clone)]
pub struct SemSegDataset {
    sources: Vec<SemSegSource>,
    samples_per_epoch: usize,
    num_classes_per_sample: usize,
    context: SampleContext,
}

impl SemSegDataset {
    pub fn load(
        base_dir: impl AsRef<Path>,
        names: &[String],
        samples_per_epoch: usize,
        num_classes_per_sample: usize,
        context: SampleContext,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        ensure!(!names.is_empty(), "no sem_seg datasets are given");
        ensure!(
            num_classes_per_sample > 0,
            "num_classes_per_sample must be positive"
        );
        let sources: Vec<_> = names
            .iter()
            .map(|name| SemSegSource::load(base_dir, name))
            .try_collect()?;

        Ok(Self {
            sources,
            samples_per_epoch,
            num_classes_per_sample,
            context,
        })
    }
}

impl SegDataset for SemSegDataset {
    fn num_samples(&self) -> usize {
        self.samples_per_epoch
    }

    fn sample(&self, _index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let source = self
            .sources
            .choose(rng)
            .ok_or_else(|| format_err!("no sem_seg datasets loaded"))?;

        for _ in 0..MAX_DRAWS {
            let record = source
                .records
                .choose(rng)
                .ok_or_else(|| format_err!("{} has no images", source.name))?;
            let label = load_label_map(&record.label_path)?;

            let present: Vec<u8> = unique_values(&label)
                .into_iter()
                .filter(|&value| {
                    value as i64 != IGNORE_LABEL && (value as usize) < source.classes.len()
                })
                .collect();
            if present.is_empty() {
                debug!(
                    "'{}' has no labeled class, drawing again",
                    record.label_path.display()
                );
                continue;
            }

            let processed = self.context.load_image(&record.image_path)?;
            let [h, w] = processed.orig_size;
            ensure!(
                label.dim() == (h as usize, w as usize),
                "label '{}' has size {:?}, but the image has size {:?}",
                record.label_path.display(),
                label.dim(),
                (h, w)
            );

            let num_picks = self.num_classes_per_sample.min(present.len());
            let picked: Vec<u8> = present.choose_multiple(rng, num_picks).copied().collect();

            let mut questions = vec![];
            let mut conversations = vec![];
            let mut sampled_classes = vec![];
            let mut masks = vec![];

            for class_id in picked {
                let class_name = source
                    .classes
                    .get_index(class_id as usize)
                    .ok_or_else(|| format_err!("class id {} is out of range", class_id))?
                    .to_lowercase();
                let question = short_question(rng, &class_name);
                let answer = random_answer(rng);
                conversations.push(self.context.single_turn(&question, answer));
                questions.push(question);
                masks.push(label.mapv(|value| (value == class_id) as u8));
                sampled_classes.push(class_name);
            }

            return Ok(Sample {
                image_path: record.image_path.clone(),
                images: processed.image,
                images_clip: processed.image_clip,
                conversations,
                masks: masks_to_tensor(&masks, h, w)?,
                label: array_to_tensor(&label).to_kind(Kind::Int64),
                resize: processed.resize,
                questions: Some(questions),
                sampled_classes: Some(sampled_classes),
                inference: false,
                text_only: false,
            });
        }

        bail!(
            "no labeled class found after {} draws from {}",
            MAX_DRAWS,
            source.name
        )
    }
}
