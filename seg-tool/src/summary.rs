//! Statistics of collated batches.

use crate::common::*;
use seg_dl::{collate::Batch, conversation::IGNORE_INDEX};

/// The token and sample counts of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub num_samples: usize,
    pub num_conversations: usize,
    pub num_masks: usize,
    pub text_only_samples: usize,
    pub seq_len: usize,
    pub attended_tokens: usize,
    pub supervised_tokens: usize,
}

impl BatchStats {
    pub fn new(batch: &Batch) -> Self {
        let seq_len = batch.input_ids.size()[1] as usize;
        let attended_tokens = i64::from(batch.attention_masks.sum(Kind::Int64)) as usize;
        let supervised_tokens = i64::from(batch.labels.ne(IGNORE_INDEX).sum(Kind::Int64)) as usize;
        let num_masks = batch
            .masks_list
            .iter()
            .map(|masks| masks.size()[0] as usize)
            .sum();

        Self {
            num_samples: batch.num_samples(),
            num_conversations: batch.conversation_list.len(),
            num_masks,
            text_only_samples: batch.text_only.iter().filter(|&&text_only| text_only).count(),
            seq_len,
            attended_tokens,
            supervised_tokens,
        }
    }
}

/// The totals written to `summary.json` at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub num_batches: usize,
    pub num_samples: usize,
    pub num_conversations: usize,
    pub num_masks: usize,
    pub text_only_samples: usize,
    pub max_seq_len: usize,
    pub attended_tokens: usize,
    pub supervised_tokens: usize,
}

impl RunSummary {
    pub fn add(&mut self, stats: &BatchStats) {
        self.num_batches += 1;
        self.num_samples += stats.num_samples;
        self.num_conversations += stats.num_conversations;
        self.num_masks += stats.num_masks;
        self.text_only_samples += stats.text_only_samples;
        self.max_seq_len = self.max_seq_len.max(stats.seq_len);
        self.attended_tokens += stats.attended_tokens;
        self.supervised_tokens += stats.supervised_tokens;
    }
}
