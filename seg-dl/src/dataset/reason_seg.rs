use super::{
    glob_files, ignore_label, load_json, masks_to_tensor, Sample, SampleContext, SegDataset,
};
use crate::{
    common::*,
    conversation::{long_question, random_answer, short_question},
};
use mask_rle::{render_shapes, Shape};

/// The polygon annotation stored next to each reasoning image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonSegAnnotation {
    pub text: Vec<String>,
    /// Whether `text` holds full sentences rather than short phrases.
    #[serde(default)]
    pub is_sentence: bool,
    pub shapes: Vec<Shape>,
}

impl ReasonSegAnnotation {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let annotation: Self = load_json(path.as_ref())?;
        ensure!(
            !annotation.text.is_empty(),
            "no text found in '{}'",
            path.as_ref().display()
        );
        Ok(annotation)
    }

    /// Render the target mask. Ignored regions carry the value 255.
    pub fn mask(&self, h: usize, w: usize) -> Array2<u8> {
        render_shapes(&self.shapes, h, w)
    }
}

/// An image with its annotation file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReasonSegRecord {
    pub image_path: PathBuf,
    pub annotation_path: PathBuf,
}

/// List the records of `<base>/reason_seg/<name>/<split>`.
pub fn reason_seg_records(
    base_dir: impl AsRef<Path>,
    name: &str,
    split: &str,
) -> Result<Vec<ReasonSegRecord>> {
    let dir = base_dir.as_ref().join("reason_seg").join(name).join(split);
    let records: Vec<_> = glob_files(&dir, "*.jpg")?
        .into_iter()
        .map(|image_path| {
            let annotation_path = image_path.with_extension("json");
            ensure!(
                annotation_path.is_file(),
                "annotation file '{}' is missing",
                annotation_path.display()
            );
            Ok(ReasonSegRecord {
                image_path,
                annotation_path,
            })
        })
        .try_collect()?;
    ensure!(
        !records.is_empty(),
        "no images found in '{}'",
        dir.display()
    );
    Ok(records)
}

/// Reasoning segmentation with free-form queries.
#[derive(Debug, Clone)]
pub struct ReasonSegDataset {
    records: Vec<ReasonSegRecord>,
    samples_per_epoch: usize,
    num_classes_per_sample: usize,
    context: SampleContext,
}

impl ReasonSegDataset {
    /// Load the `name|split` selection, for example `ReasonSeg|train`.
    pub fn load(
        base_dir: impl AsRef<Path>,
        selection: &str,
        samples_per_epoch: usize,
        num_classes_per_sample: usize,
        context: SampleContext,
    ) -> Result<Self> {
        let (name, split) = selection
            .split('|')
            .collect_tuple()
            .ok_or_else(|| format_err!("expect 'name|split', but get '{}'", selection))?;
        ensure!(
            num_classes_per_sample > 0,
            "num_classes_per_sample must be positive"
        );
        let records = reason_seg_records(base_dir, name, split)?;
        info!("reason_seg ({}): {} images", selection, records.len());

        Ok(Self {
            records,
            samples_per_epoch,
            num_classes_per_sample,
            context,
        })
    }
}

impl SegDataset for ReasonSegDataset {
    fn num_samples(&self) -> usize {
        self.samples_per_epoch
    }

    fn sample(&self, _index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let record = self
            .records
            .choose(rng)
            .ok_or_else(|| format_err!("no reason_seg records loaded"))?;
        let annotation = ReasonSegAnnotation::open(&record.annotation_path)?;
        let processed = self.context.load_image(&record.image_path)?;
        let [h, w] = processed.orig_size;
        let target = annotation
            .mask(h as usize, w as usize)
            .mapv(|value| (value == 1) as u8);

        let num_picks = self.num_classes_per_sample.min(annotation.text.len());
        let picked: Vec<&String> = annotation.text.choose_multiple(rng, num_picks).collect();

        let mut questions = vec![];
        let mut conversations = vec![];
        for text in &picked {
            let question = if annotation.is_sentence {
                long_question(rng, text)
            } else {
                short_question(rng, &text.to_lowercase())
            };
            let answer = random_answer(rng);
            conversations.push(self.context.single_turn(&question, answer));
            questions.push(question);
        }
        let masks = vec![&target; picked.len()];

        Ok(Sample {
            image_path: record.image_path.clone(),
            images: processed.image,
            images_clip: processed.image_clip,
            conversations,
            masks: masks_to_tensor(&masks, h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: Some(questions),
            sampled_classes: Some(picked.into_iter().cloned().collect()),
            inference: false,
            text_only: false,
        })
    }
}
