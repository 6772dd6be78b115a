use super::{
    ignore_label, masks_to_tensor, reason_seg_records, ImageInfo, ReasonSegAnnotation,
    ReasonSegRecord, ReferIndex, ReferSplit, Sample, SampleContext, SegDataset,
};
use crate::{common::*, conversation::with_image};

const VAL_ANSWER: &str = "[SEG].";

/// Deterministic validation over a reasoning or referring split.
///
/// The selection string picks the source: `name|split` reads a reasoning
/// split and `dataset|split_by|split` reads a referring split.
#[derive(Debug, Clone)]
pub struct ValDataset {
    source: ValSource,
    context: SampleContext,
}

#[derive(Debug, Clone)]
enum ValSource {
    ReasonSeg {
        records: Vec<ReasonSegRecord>,
    },
    ReferSeg {
        index: Box<ReferIndex>,
        split: ReferSplit,
    },
}

impl ValDataset {
    pub fn load(
        base_dir: impl AsRef<Path>,
        selection: &str,
        context: SampleContext,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let parts: Vec<&str> = selection.split('|').collect();

        let source = match *parts.as_slice() {
            [name, split] => ValSource::ReasonSeg {
                records: reason_seg_records(base_dir, name, split)?,
            },
            [dataset, split_by, split] => {
                let index = ReferIndex::load(base_dir, dataset, split_by)?;
                let split = index.split(split)?;
                ValSource::ReferSeg {
                    index: Box::new(index),
                    split,
                }
            }
            _ => bail!(
                "expect 'name|split' or 'dataset|split_by|split', but get '{}'",
                selection
            ),
        };

        let dataset = Self { source, context };
        info!("val dataset ({}): {} images", selection, dataset.num_samples());
        Ok(dataset)
    }

    fn reason_seg_sample(&self, record: &ReasonSegRecord) -> Result<Sample> {
        let annotation = ReasonSegAnnotation::open(&record.annotation_path)?;
        let processed = self.context.load_image(&record.image_path)?;
        let [h, w] = processed.orig_size;

        // only the first query is evaluated
        let text = &annotation.text[0];
        let question = val_question(text, annotation.is_sentence);
        let conversation = self.context.single_turn(&question, VAL_ANSWER);
        let mask = annotation.mask(h as usize, w as usize);

        Ok(Sample {
            image_path: record.image_path.clone(),
            images: processed.image,
            images_clip: processed.image_clip,
            conversations: vec![conversation],
            masks: masks_to_tensor(&[mask], h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: None,
            sampled_classes: None,
            inference: true,
            text_only: false,
        })
    }

    fn refer_seg_sample(
        &self,
        index: &ReferIndex,
        split: &ReferSplit,
        image: &ImageInfo,
    ) -> Result<Sample> {
        let refs = split.refs(image)?;
        let image_path = index.image_path(image);
        let processed = self.context.load_image(&image_path)?;
        let [h, w] = processed.orig_size;
        ensure!(
            [h as usize, w as usize] == [image.height, image.width],
            "image '{}' has size {:?}, but the annotation says {:?}",
            image_path.display(),
            [h, w],
            [image.height, image.width]
        );

        let mut conversations = vec![];
        let mut masks = vec![];
        for record in refs {
            let mask = index.mask(&record.ann_id, image)?;
            for sentence in &record.sentences {
                let question = val_question(&sentence.sent.trim().to_lowercase(), false);
                conversations.push(self.context.single_turn(&question, VAL_ANSWER));
                masks.push(mask.clone());
            }
        }
        ensure!(
            !conversations.is_empty(),
            "image {} has no sentences",
            image.id
        );

        Ok(Sample {
            image_path,
            images: processed.image,
            images_clip: processed.image_clip,
            conversations,
            masks: masks_to_tensor(&masks, h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: None,
            sampled_classes: None,
            inference: true,
            text_only: false,
        })
    }
}

fn val_question(text: &str, is_sentence: bool) -> String {
    if is_sentence {
        with_image(&format!(" {} Please output segmentation mask.", text))
    } else {
        with_image(&format!(
            " What is {} in this image? Please output segmentation mask.",
            text
        ))
    }
}

impl SegDataset for ValDataset {
    fn num_samples(&self) -> usize {
        match &self.source {
            ValSource::ReasonSeg { records } => records.len(),
            ValSource::ReferSeg { split, .. } => split.images.len(),
        }
    }

    fn sample(&self, index: usize, _rng: &mut dyn RngCore) -> Result<Sample> {
        let num_samples = self.num_samples();
        ensure!(
            index < num_samples,
            "index {} is out of range for {} samples",
            index,
            num_samples
        );

        match &self.source {
            ValSource::ReasonSeg { records } => self.reason_seg_sample(&records[index]),
            ValSource::ReferSeg {
                index: refer,
                split,
            } => self.refer_seg_sample(refer, split, &split.images[index]),
        }
    }
}
