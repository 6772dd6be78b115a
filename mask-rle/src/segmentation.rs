use crate::{common::*, Polygon, Rle};

/// Run-length counts in either compressed string or plain list form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    Compressed(String),
    Uncompressed(Vec<u32>),
}

/// The RLE object as it appears in COCO annotation files.
///
/// `size` is `[height, width]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RleObject {
    pub size: [usize; 2],
    pub counts: RleCounts,
}

impl RleObject {
    pub fn to_rle(&self) -> Result<Rle> {
        let [h, w] = self.size;
        match &self.counts {
            RleCounts::Compressed(text) => Rle::from_compressed(h, w, text),
            RleCounts::Uncompressed(counts) => Rle::new(h, w, counts.clone()),
        }
    }
}

/// The segmentation field of an instance annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// List of polygons, each a flat `[x, y, x, y, ...]` list.
    Polygons(Vec<Vec<f64>>),
    /// List of RLE objects.
    RleList(Vec<RleObject>),
    /// Single RLE object, usually for crowd annotations.
    Rle(RleObject),
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Polygons(polygons) => polygons.is_empty(),
            Self::RleList(rles) => rles.is_empty(),
            Self::Rle(_) => false,
        }
    }

    /// Decode every part into a `[h, w]` mask and merge them with
    /// [union_masks].
    ///
    /// An empty segmentation yields an all-zero mask.
    pub fn decode(&self, h: usize, w: usize) -> Result<Array2<u8>> {
        let parts: Vec<Array2<u8>> = match self {
            Self::Polygons(polygons) => polygons
                .iter()
                .map(|coords| -> Result<_> {
                    let polygon = Polygon::from_flat(coords)?;
                    let mut mask = Array2::zeros((h, w));
                    polygon.fill_pixel_centers(&mut mask, 1);
                    Ok(mask)
                })
                .try_collect()?,
            Self::RleList(rles) => rles
                .iter()
                .map(|rle| decode_rle_object(rle, h, w))
                .try_collect()?,
            Self::Rle(rle) => vec![decode_rle_object(rle, h, w)?],
        };

        if parts.is_empty() {
            return Ok(Array2::zeros((h, w)));
        }
        union_masks(&parts)
    }
}

fn decode_rle_object(rle: &RleObject, h: usize, w: usize) -> Result<Array2<u8>> {
    ensure!(
        rle.size == [h, w],
        "RLE size {:?} does not match image size [{}, {}]",
        rle.size,
        h,
        w
    );
    Ok(rle.to_rle()?.decode())
}

/// Merge binary masks by summing them and clipping the sum to one.
pub fn union_masks<M>(masks: &[M]) -> Result<Array2<u8>>
where
    M: Borrow<Array2<u8>>,
{
    let first = masks
        .first()
        .ok_or_else(|| format_err!("at least one mask is required"))?
        .borrow();
    let dim = first.dim();
    let mut sum: Array2<u32> = Array2::zeros(dim);

    for mask in masks {
        let mask = mask.borrow();
        ensure!(
            mask.dim() == dim,
            "mask shape {:?} differs from {:?}",
            mask.dim(),
            dim
        );
        Zip::from(&mut sum)
            .and(mask)
            .for_each(|acc, &value| *acc += value as u32);
    }

    Ok(sum.mapv(|value| value.min(1) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_polygon_and_rle_forms_test() {
        let polygons: Segmentation = serde_json::from_str("[[0, 0, 2, 0, 2, 2]]").unwrap();
        assert!(matches!(polygons, Segmentation::Polygons(_)));

        let empty: Segmentation = serde_json::from_str("[]").unwrap();
        assert!(empty.is_empty());

        let rle: Segmentation =
            serde_json::from_str(r#"{"size": [2, 2], "counts": [1, 2, 1]}"#).unwrap();
        assert!(matches!(rle, Segmentation::Rle(_)));

        let compressed: Segmentation =
            serde_json::from_str(r#"[{"size": [2, 2], "counts": "121"}]"#).unwrap();
        assert!(matches!(compressed, Segmentation::RleList(_)));
    }

    #[test]
    fn empty_segmentation_is_blank_test() {
        let mask = Segmentation::Polygons(vec![]).decode(3, 4).unwrap();
        assert_eq!(mask.dim(), (3, 4));
        assert_eq!(mask.sum(), 0);
    }

    #[test]
    fn polygon_covers_pixel_centers_test() {
        let seg = Segmentation::Polygons(vec![vec![0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0]]);
        let mask = seg.decode(5, 5).unwrap();
        assert_eq!(mask.sum(), 4);
        assert_eq!(mask.slice(ndarray::s![0..2, 0..2]).sum(), 4);
    }

    #[test]
    fn rle_size_mismatch_is_rejected_test() {
        let seg = Segmentation::Rle(RleObject {
            size: [2, 2],
            counts: RleCounts::Uncompressed(vec![4]),
        });
        assert!(seg.decode(3, 3).is_err());
    }
}
