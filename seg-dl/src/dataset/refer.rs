//! Referring expression annotations in the REFER layout.
//!
//! Each dataset lives in `<base>/refer_seg/<dataset>/` with a
//! `refs(<split_by>).json` expression file and a COCO style
//! `instances.json`.

use super::load_json;
use crate::common::*;
use mask_rle::Segmentation;

/// Annotation ids of a referring expression.
///
/// Generalized datasets refer to any number of objects, an empty list or
/// `-1` meaning no target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationIds {
    Single(i64),
    Multiple(Vec<i64>),
}

impl AnnotationIds {
    /// The ids of existing annotations.
    pub fn ids(&self) -> Vec<i64> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Multiple(ids) => ids.clone(),
        }
        .into_iter()
        .filter(|&id| id >= 0)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefSentence {
    pub sent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefRecord {
    pub ref_id: i64,
    pub ann_id: AnnotationIds,
    pub image_id: i64,
    pub split: String,
    pub sentences: Vec<RefSentence>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: i64,
    pub file_name: String,
    pub height: usize,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceAnnotation {
    pub id: i64,
    pub image_id: i64,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
}

#[derive(Debug, Clone, Deserialize)]
struct Instances {
    images: Vec<ImageInfo>,
    annotations: Vec<InstanceAnnotation>,
}

/// The images and expressions of one split.
#[derive(Debug, Clone)]
pub struct ReferSplit {
    pub images: Vec<ImageInfo>,
    pub refs_by_image: HashMap<i64, Vec<RefRecord>>,
}

impl ReferSplit {
    pub fn refs(&self, image: &ImageInfo) -> Result<&[RefRecord]> {
        let refs = self
            .refs_by_image
            .get(&image.id)
            .map(|refs| refs.as_slice())
            .unwrap_or(&[]);
        ensure!(!refs.is_empty(), "image {} has no refs", image.id);
        Ok(refs)
    }
}

/// The expression and instance index of a referring dataset.
#[derive(Debug, Clone)]
pub struct ReferIndex {
    dataset: String,
    image_dir: PathBuf,
    images: IndexMap<i64, ImageInfo>,
    annotations: HashMap<i64, InstanceAnnotation>,
    refs: Vec<RefRecord>,
}

impl ReferIndex {
    pub fn load(base_dir: impl AsRef<Path>, dataset: &str, split_by: &str) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let dataset_dir = base_dir.join("refer_seg").join(dataset);

        let refs_file = dataset_dir.join(format!("refs({}).json", split_by));
        let refs: Vec<RefRecord> = load_json(&refs_file)?;

        let instances_file = dataset_dir.join("instances.json");
        let Instances {
            images,
            annotations,
        } = load_json(&instances_file)?;

        let images: IndexMap<_, _> = images
            .into_iter()
            .map(|image| (image.id, image))
            .collect();
        let annotations: HashMap<_, _> = annotations
            .into_iter()
            .map(|ann| (ann.id, ann))
            .collect();

        info!(
            "{}({}): {} refs, {} images, {} annotations",
            dataset,
            split_by,
            refs.len(),
            images.len(),
            annotations.len()
        );

        Ok(Self {
            dataset: dataset.to_owned(),
            image_dir: Self::image_dir(base_dir, dataset),
            images,
            annotations,
            refs,
        })
    }

    /// The image directory of a referring dataset.
    pub fn image_dir(base_dir: impl AsRef<Path>, dataset: &str) -> PathBuf {
        let root = base_dir.as_ref().join("refer_seg").join("images");
        match dataset {
            "refclef" => root.join("saiapr_tc-12"),
            _ => root.join("mscoco").join("images").join("train2014"),
        }
    }

    /// The `split_by` partition used when training on `dataset`.
    pub fn default_split_by(dataset: &str) -> &'static str {
        match dataset {
            "refcocog" => "umd",
            _ => "unc",
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn image_path(&self, image: &ImageInfo) -> PathBuf {
        self.image_dir.join(&image.file_name)
    }

    /// Collect the images and refs of `split`.
    pub fn split(&self, split: &str) -> Result<ReferSplit> {
        let mut refs_by_image: HashMap<i64, Vec<RefRecord>> = HashMap::new();
        self.refs
            .iter()
            .filter(|record| record.split == split)
            .for_each(|record| {
                refs_by_image
                    .entry(record.image_id)
                    .or_default()
                    .push(record.clone());
            });

        let images: Vec<ImageInfo> = self
            .images
            .values()
            .filter(|image| refs_by_image.contains_key(&image.id))
            .cloned()
            .collect();

        ensure!(
            images.len() == refs_by_image.len(),
            "{} refs point to images missing from the instances of {}",
            refs_by_image.len() - images.len(),
            self.dataset
        );
        ensure!(
            !images.is_empty(),
            "split '{}' of {} has no images",
            split,
            self.dataset
        );

        Ok(ReferSplit {
            images,
            refs_by_image,
        })
    }

    /// Decode the union of the annotations referred to by `ids`.
    ///
    /// Missing targets and empty segmentations give an all-zero mask.
    pub fn mask(&self, ids: &AnnotationIds, image: &ImageInfo) -> Result<Array2<u8>> {
        let (h, w) = (image.height, image.width);
        let masks: Vec<Array2<u8>> = ids
            .ids()
            .into_iter()
            .map(|id| -> Result<_> {
                let ann = self
                    .annotations
                    .get(&id)
                    .ok_or_else(|| format_err!("annotation {} is missing", id))?;
                ensure!(
                    ann.image_id == image.id,
                    "annotation {} belongs to image {}, not {}",
                    id,
                    ann.image_id,
                    image.id
                );
                match &ann.segmentation {
                    Some(seg) if !seg.is_empty() => seg.decode(h, w),
                    _ => Ok(Array2::zeros((h, w))),
                }
            })
            .try_collect()?;

        if masks.is_empty() {
            return Ok(Array2::zeros((h, w)));
        }
        mask_rle::union_masks(&masks)
    }
}
