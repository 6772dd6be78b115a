//! Packing samples into token-aligned batches.

use crate::{
    common::*,
    conversation::{
        ConversationTemplate, LabelAligner, DEFAULT_IMAGE_TOKEN, DEFAULT_IM_END_TOKEN,
        DEFAULT_IM_START_TOKEN,
    },
    dataset::Sample,
    tokenizer::{tokenize_with_image, TextTokenizer},
};

/// The batched form of a list of [Sample]s.
#[derive(Debug)]
pub struct Batch {
    pub image_paths: Vec<PathBuf>,
    /// `[b, 3, size, size]`
    pub images: Tensor,
    /// `[b, 3, crop, crop]`
    pub images_clip: Tensor,
    /// `[n, len]` int64 token ids, one row per conversation.
    pub input_ids: Tensor,
    /// `[n, len]` int64 labels aligned with `input_ids`.
    pub labels: Tensor,
    /// `[n, len]` bool mask of non-padding tokens.
    pub attention_masks: Tensor,
    /// Per-sample `[k, h, w]` float masks.
    pub masks_list: Vec<Tensor>,
    pub label_list: Vec<Tensor>,
    pub resize_list: Vec<[i64; 2]>,
    /// `[b + 1]` conversation offsets. Sample `i` owns the conversations in
    /// `offset[i]..offset[i + 1]`.
    pub offset: Tensor,
    pub questions_list: Vec<Option<Vec<String>>>,
    pub sampled_classes_list: Vec<Option<Vec<String>>>,
    pub inference: bool,
    pub conversation_list: Vec<String>,
    pub text_only: Vec<bool>,
}

impl Batch {
    pub fn num_samples(&self) -> usize {
        self.image_paths.len()
    }

    pub fn offsets(&self) -> Vec<usize> {
        let offsets: Vec<i64> = self.offset.shallow_clone().into();
        offsets.into_iter().map(|offset| offset as usize).collect()
    }

    /// Regroup the flat conversation list by sample.
    pub fn conversation_groups(&self) -> Vec<&[String]> {
        self.offsets()
            .iter()
            .tuple_windows()
            .map(|(&begin, &end)| &self.conversation_list[begin..end])
            .collect()
    }
}

/// Tokenizes, pads and aligns samples into a [Batch].
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct BatchCollator {
    #[derivative(Debug = "ignore")]
    tokenizer: Arc<dyn TextTokenizer>,
    template: ConversationTemplate,
    use_mm_start_end: bool,
}

impl BatchCollator {
    /// Build a collator.
    ///
    /// * `tokenizer` - The tokenizer shared with the model.
    /// * `template` - The conversation format that produced the samples.
    /// * `use_mm_start_end` - Wrap the image placeholder in start and end
    ///   tokens before tokenization.
    pub fn new(
        tokenizer: Arc<dyn TextTokenizer>,
        template: ConversationTemplate,
        use_mm_start_end: bool,
    ) -> Self {
        Self {
            tokenizer,
            template,
            use_mm_start_end,
        }
    }

    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch> {
        ensure!(!samples.is_empty(), "cannot collate an empty batch");
        samples.iter().try_for_each(|sample| sample.check())?;

        // the first sample decides truncation
        let inference = samples[0].inference;

        let (
            image_paths,
            images,
            images_clip,
            conversations,
            masks,
            labels,
            resize_list,
            questions_list,
            sampled_classes_list,
            _inference,
            text_only,
        ) = samples
            .into_iter()
            .map(|sample| {
                let Sample {
                    image_path,
                    images,
                    images_clip,
                    conversations,
                    masks,
                    label,
                    resize,
                    questions,
                    sampled_classes,
                    inference,
                    text_only,
                } = sample;
                (
                    image_path,
                    images,
                    images_clip,
                    conversations,
                    masks,
                    label,
                    resize,
                    questions,
                    sampled_classes,
                    inference,
                    text_only,
                )
            })
            .unzip_n_vec();

        let offset: Vec<i64> = iter::once(0)
            .chain(conversations.iter().scan(0, |total, group| {
                *total += group.len() as i64;
                Some(*total)
            }))
            .collect();

        let conversation_list: Vec<String> = conversations
            .into_iter()
            .flatten()
            .map(|conversation| {
                if self.use_mm_start_end {
                    conversation.replace(
                        DEFAULT_IMAGE_TOKEN,
                        &format!(
                            "{}{}{}",
                            DEFAULT_IM_START_TOKEN, DEFAULT_IMAGE_TOKEN, DEFAULT_IM_END_TOKEN
                        ),
                    )
                } else {
                    conversation
                }
            })
            .collect();

        let (input_ids, target_ids, seq_len) = self.tokenize(&conversation_list)?;
        let num_rows = conversation_list.len() as i64;
        let pad_token_id = self.tokenizer.pad_token_id();

        let input_ids = Tensor::of_slice(&input_ids).view([num_rows, seq_len as i64]);
        let target_ids = Tensor::of_slice(&target_ids).view([num_rows, seq_len as i64]);
        let attention_masks = input_ids.ne(pad_token_id);

        let max_len = self.tokenizer.model_max_length();
        let (input_ids, target_ids, attention_masks) = if !inference && seq_len > max_len {
            let max_len = max_len as i64;
            (
                input_ids.narrow(1, 0, max_len),
                target_ids.narrow(1, 0, max_len),
                attention_masks.narrow(1, 0, max_len),
            )
        } else {
            (input_ids, target_ids, attention_masks)
        };

        Ok(Batch {
            image_paths,
            images: Tensor::stack(&images, 0),
            images_clip: Tensor::stack(&images_clip, 0),
            input_ids,
            labels: target_ids,
            attention_masks,
            masks_list: masks
                .into_iter()
                .map(|masks| masks.to_kind(Kind::Float))
                .collect(),
            label_list: labels,
            resize_list,
            offset: Tensor::of_slice(&offset),
            questions_list,
            sampled_classes_list,
            inference,
            conversation_list,
            text_only,
        })
    }

    /// Tokenize and pad every conversation, then align its labels.
    ///
    /// It returns the flattened ids, the flattened labels and the padded
    /// length.
    fn tokenize(&self, conversations: &[String]) -> Result<(Vec<i64>, Vec<i64>, usize)> {
        let tokenizer = &*self.tokenizer;
        let pad_token_id = tokenizer.pad_token_id();

        let rows: Vec<Vec<i64>> = conversations
            .iter()
            .map(|conversation| tokenize_with_image(tokenizer, conversation))
            .try_collect()?;
        let seq_len = rows.iter().map(|row| row.len()).max().unwrap_or(0);

        let aligner = LabelAligner::new(tokenizer, &self.template);
        let mut input_ids = Vec::with_capacity(rows.len() * seq_len);
        let mut target_ids = Vec::with_capacity(rows.len() * seq_len);

        for (conversation, mut row) in conversations.iter().zip_eq(rows) {
            row.resize(seq_len, pad_token_id);
            let targets = aligner.align(conversation, &row)?;
            input_ids.extend(row);
            target_ids.extend(targets);
        }

        Ok((input_ids, target_ids, seq_len))
    }
}
