use super::{
    ReasonSegDataset, ReferSegDataset, Sample, SampleContext, SegDataset, SemSegDataset,
    VqaDataset,
};
use crate::common::*;

/// The kinds of training sources mixed by [HybridDataset].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "sem_seg")]
    SemSeg,
    #[serde(rename = "refer_seg")]
    ReferSeg,
    #[serde(rename = "vqa")]
    Vqa,
    #[serde(rename = "reason_seg")]
    ReasonSeg,
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let kind = match text {
            "sem_seg" => Self::SemSeg,
            "refer_seg" => Self::ReferSeg,
            "vqa" => Self::Vqa,
            "reason_seg" => Self::ReasonSeg,
            _ => bail!("unknown dataset source '{}'", text),
        };
        Ok(kind)
    }
}

/// Parse a `||` separated list, such as `sem_seg||vqa`.
pub fn split_list(text: &str) -> Vec<String> {
    text.split("||")
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// A loaded training source.
#[derive(Debug, Clone)]
pub enum DataSource {
    SemSeg(SemSegDataset),
    ReferSeg(ReferSegDataset),
    Vqa(VqaDataset),
    ReasonSeg(ReasonSegDataset),
}

impl DataSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::SemSeg(_) => SourceKind::SemSeg,
            Self::ReferSeg(_) => SourceKind::ReferSeg,
            Self::Vqa(_) => SourceKind::Vqa,
            Self::ReasonSeg(_) => SourceKind::ReasonSeg,
        }
    }
}

impl SegDataset for DataSource {
    fn num_samples(&self) -> usize {
        match self {
            Self::SemSeg(dataset) => dataset.num_samples(),
            Self::ReferSeg(dataset) => dataset.num_samples(),
            Self::Vqa(dataset) => dataset.num_samples(),
            Self::ReasonSeg(dataset) => dataset.num_samples(),
        }
    }

    fn sample(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        match self {
            Self::SemSeg(dataset) => dataset.sample(index, rng),
            Self::ReferSeg(dataset) => dataset.sample(index, rng),
            Self::Vqa(dataset) => dataset.sample(index, rng),
            Self::ReasonSeg(dataset) => dataset.sample(index, rng),
        }
    }
}

/// Normalized source weights with a weighted index sampler.
#[derive(Debug, Clone)]
pub struct SourceWeights {
    probs: Vec<R64>,
    dist: WeightedIndex<f64>,
}

impl SourceWeights {
    /// Normalize `rates` to sum to one.
    ///
    /// Rates must be non-negative with a positive sum.
    pub fn new(rates: &[R64]) -> Result<Self> {
        ensure!(!rates.is_empty(), "sample rates must not be empty");
        ensure!(
            rates.iter().all(|&rate| rate >= 0.0),
            "sample rates must be non-negative, but get {:?}",
            rates
        );
        let total: R64 = rates.iter().cloned().sum();
        ensure!(total > 0.0, "sample rates must not sum to zero");

        let probs: Vec<R64> = rates.iter().map(|&rate| rate / total).collect();
        let dist = WeightedIndex::new(probs.iter().map(|prob| prob.raw()))?;

        Ok(Self { probs, dist })
    }

    pub fn probabilities(&self) -> &[R64] {
        &self.probs
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Draw a source position.
    pub fn choose(&self, rng: &mut dyn RngCore) -> usize {
        self.dist.sample(rng)
    }
}

/// The training mixture over several sources.
///
/// Every request draws a source by weight, ignores the requested index and
/// returns a training sample from that source.
#[derive(Debug, Clone)]
pub struct HybridDataset<D = DataSource>
where
    D: SegDataset,
{
    sources: Vec<D>,
    weights: SourceWeights,
    samples_per_epoch: usize,
}

impl<D> HybridDataset<D>
where
    D: SegDataset,
{
    pub fn new(sources: Vec<D>, sample_rate: &[R64], samples_per_epoch: usize) -> Result<Self> {
        ensure!(
            sources.len() == sample_rate.len(),
            "{} sources are given, but {} sample rates",
            sources.len(),
            sample_rate.len()
        );
        ensure!(samples_per_epoch > 0, "samples_per_epoch must be positive");
        let weights = SourceWeights::new(sample_rate)?;

        Ok(Self {
            sources,
            weights,
            samples_per_epoch,
        })
    }

    pub fn sources(&self) -> &[D] {
        &self.sources
    }

    pub fn weights(&self) -> &SourceWeights {
        &self.weights
    }
}

impl<D> SegDataset for HybridDataset<D>
where
    D: SegDataset,
{
    fn num_samples(&self) -> usize {
        self.samples_per_epoch
    }

    fn sample(&self, _index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let position = self.weights.choose(rng);
        let source = &self.sources[position];
        let mut sample = source.sample(0, rng)?;
        sample.inference = false;
        Ok(sample)
    }
}

/// Options of the default training mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridDatasetInit {
    pub samples_per_epoch: usize,
    pub num_classes_per_sample: usize,
    pub sources: Vec<SourceKind>,
    pub sample_rate: Vec<R64>,
    pub sem_seg_data: String,
    pub refer_seg_data: String,
    pub vqa_data: String,
    pub reason_seg_data: String,
}

impl Default for HybridDatasetInit {
    fn default() -> Self {
        Self {
            samples_per_epoch: 500 * 8 * 2 * 10,
            num_classes_per_sample: 3,
            sources: vec![
                SourceKind::SemSeg,
                SourceKind::ReferSeg,
                SourceKind::Vqa,
                SourceKind::ReasonSeg,
            ],
            sample_rate: vec![r64(9.0), r64(3.0), r64(3.0), r64(1.0)],
            sem_seg_data: "ade20k||cocostuff||partimagenet||pascal_part||paco_lvis||mapillary"
                .into(),
            refer_seg_data: "refclef||refcoco||refcoco+||refcocog".into(),
            vqa_data: "llava_instruct_150k".into(),
            reason_seg_data: "ReasonSeg|train".into(),
        }
    }
}

impl HybridDatasetInit {
    /// Load every listed source from `base_dir`.
    pub fn build(
        self,
        base_dir: impl AsRef<Path>,
        context: SampleContext,
    ) -> Result<HybridDataset> {
        let base_dir = base_dir.as_ref();
        let Self {
            samples_per_epoch,
            num_classes_per_sample,
            sources,
            sample_rate,
            sem_seg_data,
            refer_seg_data,
            vqa_data,
            reason_seg_data,
        } = self;

        let sources: Vec<DataSource> = sources
            .into_iter()
            .map(|kind| -> Result<_> {
                let source = match kind {
                    SourceKind::SemSeg => DataSource::SemSeg(SemSegDataset::load(
                        base_dir,
                        &split_list(&sem_seg_data),
                        samples_per_epoch,
                        num_classes_per_sample,
                        context.clone(),
                    )?),
                    SourceKind::ReferSeg => DataSource::ReferSeg(ReferSegDataset::load(
                        base_dir,
                        &split_list(&refer_seg_data),
                        samples_per_epoch,
                        num_classes_per_sample,
                        context.clone(),
                    )?),
                    SourceKind::Vqa => DataSource::Vqa(VqaDataset::load(
                        base_dir,
                        &vqa_data,
                        samples_per_epoch,
                        context.clone(),
                    )?),
                    SourceKind::ReasonSeg => DataSource::ReasonSeg(ReasonSegDataset::load(
                        base_dir,
                        &reason_seg_data,
                        samples_per_epoch,
                        num_classes_per_sample,
                        context.clone(),
                    )?),
                };
                Ok(source)
            })
            .try_collect()?;

        HybridDataset::new(sources, &sample_rate, samples_per_epoch)
    }
}
