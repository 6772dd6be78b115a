mod common;

use anyhow::Result;
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use seg_dl::{
    conversation::{TUMOR_CLASS_QUESTIONS, WHOLE_TUMOR_QUESTION},
    dataset::{SegDataset, TumorClass, TumorDataset, TumorIndex, TumorOptions},
};
use std::{fs, path::Path};
use tch::Kind;

const H: usize = 6;
const W: usize = 8;

/// Five slices, the last two without foreground.
fn write_fixture(root: &Path) -> Result<Vec<Array2<u8>>> {
    let mut masks = vec![Array2::<u8>::zeros((H, W)); 5];
    masks[0][[1, 1]] = 1;
    masks[0][[1, 2]] = 1;
    masks[0][[4, 5]] = 3;
    masks[1].row_mut(2).fill(2);
    masks[2][[0, 0]] = 1;
    masks[2][[3, 3]] = 2;
    masks[2][[5, 7]] = 3;

    for (index, mask) in masks.iter().enumerate() {
        let name = format!("slice{}", index);
        common::write_image(
            root.join("train/image/vol1").join(format!("{}.jpg", name)),
            W as u32,
            H as u32,
        )?;
        let mask_path = root.join("train/mask/vol1").join(format!("{}.npy", name));
        fs::create_dir_all(mask_path.parent().unwrap())?;
        ndarray_npy::write_npy(&mask_path, mask)?;
        common::write_text(
            root.join("train/captions_per_slice/vol1")
                .join(format!("{}.txt", name)),
            "bright rim\ndark core\nswelling\n",
        )?;
    }

    Ok(masks)
}

#[test]
fn tumor_index_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path())?;

    let options = TumorOptions::default();
    let index = TumorIndex::build(dir.path(), "train", &options)?;
    assert_eq!(index.num_scanned(), 5);
    assert_eq!(index.len(), 3);

    let classes: Vec<Vec<usize>> = index
        .slices()
        .iter()
        .map(|slice| slice.classes.iter().map(|class| class.index()).collect())
        .collect();
    assert_eq!(classes, vec![vec![0, 2], vec![1], vec![0, 1, 2]]);

    let unfiltered = TumorIndex::build(
        dir.path(),
        "train",
        &TumorOptions {
            filter_empty_slices: false,
            ..options.clone()
        },
    )?;
    assert_eq!(unfiltered.len(), 5);
    assert!(unfiltered.slices()[4].classes.is_empty());

    assert!(TumorIndex::build(dir.path(), "val", &options).is_err());
    Ok(())
}

#[test]
fn out_of_range_mask_value_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path())?;

    // a fourth class does not exist
    let mut mask = Array2::<u8>::zeros((H, W));
    mask[[0, 0]] = 4;
    ndarray_npy::write_npy(dir.path().join("train/mask/vol1/slice3.npy"), &mask)?;

    // rejected when single classes are segmented
    let per_class = TumorOptions {
        merge_classes: false,
        ..TumorOptions::default()
    };
    assert!(TumorIndex::build(dir.path(), "train", &per_class).is_err());

    // the merged target only needs a positive value
    let index = TumorIndex::build(dir.path(), "train", &TumorOptions::default())?;
    assert_eq!(index.len(), 4);
    let slice = &index.slices()[3];
    assert!(slice.has_foreground);
    assert!(slice.classes.is_empty());
    Ok(())
}

#[test]
fn tumor_class_test() -> Result<()> {
    assert!(TumorClass::from_stored(0, 3).is_err());
    assert!(TumorClass::from_stored(4, 3).is_err());

    let class = TumorClass::from_stored(3, 3)?;
    assert_eq!(class.index(), 2);
    assert_eq!(class.stored(), 3);
    assert_eq!(class.name(), "edema");
    Ok(())
}

#[test]
fn merged_training_sample_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let masks = write_fixture(dir.path())?;
    let dataset = TumorDataset::training(
        dir.path(),
        "train",
        TumorOptions::default(),
        common::context()?,
    )?;
    assert_eq!(dataset.num_samples(), 3);

    let mut rng = StdRng::seed_from_u64(1);
    let sample = dataset.sample(0, &mut rng)?;
    sample.check()?;

    assert_eq!(sample.masks.size(), vec![3, H as i64, W as i64]);
    assert_eq!(sample.conversations.len(), 3);
    assert!(sample
        .conversations
        .iter()
        .all(|conv| conv == &sample.conversations[0]));
    assert!(sample.conversations[0].contains(WHOLE_TUMOR_QUESTION));
    assert!(sample.conversations[0].contains("It is [SEG]."));
    assert!(!sample.inference);
    assert_eq!(sample.images.size(), vec![3, 32, 32]);
    assert_eq!(sample.images_clip.size(), vec![3, 16, 16]);
    assert_eq!(sample.resize, [24, 32]);

    // the merged mask covers every foreground pixel once
    let foreground = masks[0].iter().filter(|&&value| value > 0).count() as i64;
    let first = sample.masks.get(0).to_kind(Kind::Int64);
    assert_eq!(i64::from(first.sum(Kind::Int64)), foreground);
    assert_eq!(
        i64::from(sample.label.eq(255i64).all().to_kind(Kind::Int64)),
        1
    );

    assert!(dataset.sample(3, &mut rng).is_err());
    Ok(())
}

#[test]
fn per_class_sample_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let masks = write_fixture(dir.path())?;
    let options = TumorOptions {
        merge_classes: false,
        ..TumorOptions::default()
    };
    let dataset = TumorDataset::training(dir.path(), "train", options, common::context()?)?;
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..10 {
        let sample = dataset.sample(0, &mut rng)?;
        let conversation = &sample.conversations[0];

        // slice 0 holds classes 1 and 3 in stored values
        let stored = if conversation.contains(TUMOR_CLASS_QUESTIONS[0]) {
            1
        } else if conversation.contains(TUMOR_CLASS_QUESTIONS[2]) {
            3
        } else {
            panic!("unexpected question in {:?}", conversation);
        };
        let expect = masks[0].iter().filter(|&&value| value == stored).count() as i64;
        let got = i64::from(sample.masks.get(0).to_kind(Kind::Int64).sum(Kind::Int64));
        assert_eq!(got, expect);
    }
    Ok(())
}

#[test]
fn validation_sample_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path())?;
    let dataset = TumorDataset::validation(
        dir.path(),
        "train",
        TumorOptions::default(),
        common::context()?,
    )?;

    let mut rng = StdRng::seed_from_u64(0);
    let sample = dataset.sample(2, &mut rng)?;
    sample.check()?;

    assert!(sample.inference);
    assert_eq!(sample.conversations.len(), 1);
    assert_eq!(sample.masks.size()[0], 1);
    Ok(())
}

#[test]
fn caption_test() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path())?;
    let dataset = TumorDataset::training(
        dir.path(),
        "train",
        TumorOptions::default(),
        common::context()?,
    )?;

    assert_eq!(dataset.caption(1, TumorClass::new(1, 3)?)?, "dark core");
    assert!(dataset.caption(9, TumorClass::new(0, 3)?).is_err());
    Ok(())
}
