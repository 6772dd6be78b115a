use super::{
    ignore_label, masks_to_tensor, AnnotationIds, ReferIndex, ReferSplit, Sample, SampleContext,
    SegDataset,
};
use crate::{
    common::*,
    conversation::{random_answer, short_question},
};

/// Referring expression segmentation over several REFER datasets.
///
/// Each sample draws a dataset, an image and up to
/// `num_classes_per_sample` of the expressions referring into it.
#[derive(Debug, Clone)]
pub struct ReferSegDataset {
    datasets: Vec<(ReferIndex, ReferSplit)>,
    samples_per_epoch: usize,
    num_classes_per_sample: usize,
    context: SampleContext,
}

impl ReferSegDataset {
    pub fn load(
        base_dir: impl AsRef<Path>,
        datasets: &[String],
        samples_per_epoch: usize,
        num_classes_per_sample: usize,
        context: SampleContext,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        ensure!(!datasets.is_empty(), "no refer_seg datasets are given");
        ensure!(
            num_classes_per_sample > 0,
            "num_classes_per_sample must be positive"
        );

        let datasets: Vec<_> = datasets
            .iter()
            .map(|name| -> Result<_> {
                let index = ReferIndex::load(base_dir, name, ReferIndex::default_split_by(name))?;
                let split = index.split("train")?;
                Ok((index, split))
            })
            .try_collect()?;

        Ok(Self {
            datasets,
            samples_per_epoch,
            num_classes_per_sample,
            context,
        })
    }
}

impl SegDataset for ReferSegDataset {
    fn num_samples(&self) -> usize {
        self.samples_per_epoch
    }

    fn sample(&self, _index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let (index, split) = self
            .datasets
            .choose(rng)
            .ok_or_else(|| format_err!("no refer_seg datasets loaded"))?;
        let image = split
            .images
            .choose(rng)
            .ok_or_else(|| format_err!("{} has no images", index.dataset()))?;

        let candidates: Vec<(&str, &AnnotationIds)> = split
            .refs(image)?
            .iter()
            .flat_map(|record| {
                record
                    .sentences
                    .iter()
                    .map(move |sentence| (sentence.sent.as_str(), &record.ann_id))
            })
            .collect();
        ensure!(
            !candidates.is_empty(),
            "image {} of {} has no sentences",
            image.id,
            index.dataset()
        );

        let num_picks = self.num_classes_per_sample.min(candidates.len());
        let picked: Vec<_> = candidates.choose_multiple(rng, num_picks).collect();

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

        let mut questions = vec![];
        let mut conversations = vec![];
        let mut sampled_classes = vec![];
        let mut masks = vec![];

        for &&(sentence, ann_ids) in &picked {
            let sentence = sentence.trim().to_lowercase();
            let question = short_question(rng, &sentence);
            let answer = random_answer(rng);
            conversations.push(self.context.single_turn(&question, answer));
            questions.push(question);
            masks.push(index.mask(ann_ids, image)?);
            sampled_classes.push(sentence);
        }

        Ok(Sample {
            image_path,
            images: processed.image,
            images_clip: processed.image_clip,
            conversations,
            masks: masks_to_tensor(&masks, h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: Some(questions),
            sampled_classes: Some(sampled_classes),
            inference: false,
            text_only: false,
        })
    }
}
