use anyhow::Result;
use noisy_float::prelude::*;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use seg_dl::dataset::{HybridDataset, Sample, SegDataset};
use std::path::PathBuf;
use tch::{kind::FLOAT_CPU, kind::INT64_CPU, Device, Kind, Tensor};

/// A source that tags its samples with its own name.
#[derive(Debug)]
struct TaggedSource {
    name: &'static str,
}

impl SegDataset for TaggedSource {
    fn num_samples(&self) -> usize {
        1
    }

    fn sample(&self, _index: usize, _rng: &mut dyn RngCore) -> Result<Sample> {
        Ok(Sample {
            image_path: PathBuf::from(self.name),
            images: Tensor::zeros(&[3, 4, 4], FLOAT_CPU),
            images_clip: Tensor::zeros(&[3, 2, 2], FLOAT_CPU),
            conversations: vec!["USER: hi ASSISTANT: [SEG].</s>".into()],
            masks: Tensor::zeros(&[1, 4, 4], (Kind::Uint8, Device::Cpu)),
            label: Tensor::ones(&[4, 4], INT64_CPU) * 255i64,
            resize: [4, 4],
            questions: None,
            sampled_classes: None,
            inference: true,
            text_only: false,
        })
    }
}

fn sources() -> Vec<TaggedSource> {
    ["sem_seg", "refer_seg", "vqa", "reason_seg"]
        .iter()
        .map(|&name| TaggedSource { name })
        .collect()
}

#[test]
fn sampling_frequency_test() -> Result<()> {
    let rates = [r64(9.0), r64(3.0), r64(3.0), r64(1.0)];
    let dataset = HybridDataset::new(sources(), &rates, 100)?;
    assert_eq!(dataset.num_samples(), 100);

    let mut rng = StdRng::seed_from_u64(42);
    let num_draws = 20_000;
    let mut counts = [0usize; 4];

    for index in 0..num_draws {
        let sample = dataset.sample(index, &mut rng)?;
        assert!(!sample.inference);
        let position = dataset
            .sources()
            .iter()
            .position(|source| PathBuf::from(source.name) == sample.image_path)
            .unwrap();
        counts[position] += 1;
    }

    let expect = [0.5625, 0.1875, 0.1875, 0.0625];
    for (count, prob) in counts.iter().zip(expect) {
        let freq = *count as f64 / num_draws as f64;
        assert!((freq - prob).abs() < 0.02, "{} vs {}", freq, prob);
    }
    Ok(())
}

#[test]
fn zero_rate_source_is_never_drawn_test() -> Result<()> {
    let rates = [r64(1.0), r64(0.0), r64(1.0), r64(0.0)];
    let dataset = HybridDataset::new(sources(), &rates, 10)?;
    let mut rng = StdRng::seed_from_u64(5);

    for index in 0..500 {
        let sample = dataset.sample(index, &mut rng)?;
        assert_ne!(sample.image_path, PathBuf::from("refer_seg"));
        assert_ne!(sample.image_path, PathBuf::from("reason_seg"));
    }
    Ok(())
}

#[test]
fn invalid_rates_test() {
    assert!(HybridDataset::new(sources(), &[r64(1.0)], 10).is_err());
    assert!(HybridDataset::new(sources(), &[r64(0.0); 4], 10).is_err());
    assert!(HybridDataset::new(sources(), &[r64(1.0); 4], 0).is_err());
}
