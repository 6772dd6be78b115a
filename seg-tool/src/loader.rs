//! Drawing samples from a dataset and collating them into batches.

use crate::common::*;
use seg_dl::{
    collate::{Batch, BatchCollator},
    dataset::SegDataset,
};

/// The order in which sample indexes are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    /// Walk the dataset in index order and wrap around.
    Sequential,
    /// Draw every index uniformly.
    Random,
}

/// An iterator of collated batches.
pub struct BatchLoader<'a> {
    dataset: &'a dyn SegDataset,
    collator: &'a BatchCollator,
    order: SampleOrder,
    batch_size: usize,
    num_batches: usize,
    batch_index: usize,
    cursor: usize,
    rng: StdRng,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        dataset: &'a dyn SegDataset,
        collator: &'a BatchCollator,
        order: SampleOrder,
        batch_size: NonZeroUsize,
        num_batches: usize,
        seed: u64,
    ) -> Result<Self> {
        ensure!(dataset.num_samples() > 0, "the dataset is empty");

        Ok(Self {
            dataset,
            collator,
            order,
            batch_size: batch_size.get(),
            num_batches,
            batch_index: 0,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn next_index(&mut self) -> usize {
        let num_samples = self.dataset.num_samples();
        match self.order {
            SampleOrder::Sequential => {
                let index = self.cursor % num_samples;
                self.cursor += 1;
                index
            }
            SampleOrder::Random => self.rng.gen_range(0..num_samples),
        }
    }

    fn load_batch(&mut self) -> Result<Batch> {
        let samples: Vec<_> = (0..self.batch_size)
            .map(|_| {
                let index = self.next_index();
                self.dataset
                    .sample(index, &mut self.rng)
                    .with_context(|| format!("failed to load sample {}", index))
            })
            .try_collect()?;
        self.collator.collate(samples)
    }
}

impl<'a> Iterator for BatchLoader<'a> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_index >= self.num_batches {
            return None;
        }
        self.batch_index += 1;
        Some(self.load_batch())
    }
}
