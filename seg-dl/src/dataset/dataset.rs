use super::Sample;
use crate::common::*;

/// The dataset that produces segmentation samples on request.
///
/// Training sources ignore `index` and draw a random record with `rng`.
/// Validation sources return the record at `index` deterministically.
pub trait SegDataset
where
    Self: Debug + Send + Sync,
{
    /// Get the number of samples in one epoch.
    fn num_samples(&self) -> usize;

    /// Produce one sample.
    fn sample(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample>;
}

impl<D> SegDataset for Box<D>
where
    D: SegDataset + ?Sized,
{
    fn num_samples(&self) -> usize {
        (**self).num_samples()
    }

    fn sample(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        (**self).sample(index, rng)
    }
}
