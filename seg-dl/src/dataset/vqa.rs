use super::{ignore_label, load_json, masks_to_tensor, Sample, SampleContext, SegDataset};
use crate::{
    common::*,
    conversation::{Role, DEFAULT_IMAGE_TOKEN},
};

/// One turn of a visual instruction conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VqaTurn {
    pub from: String,
    pub value: String,
}

/// A visual instruction record in the LLaVA json format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VqaRecord {
    pub image: String,
    pub conversations: Vec<VqaTurn>,
}

impl VqaRecord {
    /// Map the turns to conversation roles.
    ///
    /// A leading assistant turn is dropped. The image placeholder is moved to
    /// its own line in front of the turn that mentions it. The remaining
    /// turns must alternate starting with the user.
    pub fn messages(&self) -> Result<Vec<(Role, String)>> {
        let turns: Vec<(Role, &str)> = self
            .conversations
            .iter()
            .map(|turn| -> Result<_> {
                let role = match turn.from.as_str() {
                    "human" => Role::User,
                    "gpt" => Role::Assistant,
                    other => bail!("unknown conversation role '{}'", other),
                };
                Ok((role, turn.value.as_str()))
            })
            .try_collect()?;

        let skip = matches!(turns.first(), Some((Role::Assistant, _))) as usize;

        turns
            .into_iter()
            .skip(skip)
            .enumerate()
            .map(|(index, (role, value))| {
                let expect = if index % 2 == 0 {
                    Role::User
                } else {
                    Role::Assistant
                };
                ensure!(
                    role == expect,
                    "turn {} of '{}' should be {:?}, but get {:?}",
                    index,
                    self.image,
                    expect,
                    role
                );

                let value = if value.contains(DEFAULT_IMAGE_TOKEN) {
                    let stripped = value.replace(DEFAULT_IMAGE_TOKEN, "");
                    format!("{}\n{}", DEFAULT_IMAGE_TOKEN, stripped.trim())
                } else {
                    value.to_owned()
                };
                Ok((role, value))
            })
            .try_collect()
    }
}

/// Visual question answering conversations without masks.
#[derive(Debug, Clone)]
pub struct VqaDataset {
    records: Vec<VqaRecord>,
    image_dir: PathBuf,
    samples_per_epoch: usize,
    context: SampleContext,
}

impl VqaDataset {
    /// Load `<base>/llava_dataset/<name>.json` with images from
    /// `<base>/coco/train2017`.
    pub fn load(
        base_dir: impl AsRef<Path>,
        name: &str,
        samples_per_epoch: usize,
        context: SampleContext,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let records: Vec<VqaRecord> =
            load_json(base_dir.join("llava_dataset").join(format!("{}.json", name)))?;
        ensure!(!records.is_empty(), "no records found in vqa data '{}'", name);
        info!("vqa_data ({}): {} records", name, records.len());

        Ok(Self {
            records,
            image_dir: base_dir.join("coco").join("train2017"),
            samples_per_epoch,
            context,
        })
    }
}

impl SegDataset for VqaDataset {
    fn num_samples(&self) -> usize {
        self.samples_per_epoch
    }

    fn sample(&self, _index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let record = self
            .records
            .choose(rng)
            .ok_or_else(|| format_err!("no vqa records loaded"))?;
        let image_path = self.image_dir.join(&record.image);
        let processed = self.context.load_image(&image_path)?;
        let [h, w] = processed.orig_size;

        let mut conversation = self.context.template.conversation();
        record
            .messages()?
            .into_iter()
            .for_each(|(role, message)| {
                conversation.push(role, message);
            });
        let conversation = conversation.prompt();
        let no_masks: &[Array2<u8>] = &[];

        Ok(Sample {
            image_path,
            images: processed.image,
            images_clip: processed.image_clip,
            conversations: vec![conversation.clone()],
            masks: masks_to_tensor(no_masks, h, w)?,
            label: ignore_label(h, w),
            resize: processed.resize,
            questions: Some(vec![conversation.clone()]),
            sampled_classes: Some(vec![conversation]),
            inference: false,
            text_only: true,
        })
    }
}
