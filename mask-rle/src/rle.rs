use crate::common::*;

/// Run-length encoded binary mask.
///
/// The runs alternate between zeros and ones, starting with zeros, and walk
/// the mask in column-major order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rle {
    pub h: usize,
    pub w: usize,
    pub counts: Vec<u32>,
}

impl Rle {
    pub fn new(h: usize, w: usize, counts: Vec<u32>) -> Result<Self> {
        let total: u64 = counts.iter().map(|&count| count as u64).sum();
        ensure!(
            total == (h * w) as u64,
            "run lengths sum to {}, but the mask has {}x{} pixels",
            total,
            h,
            w
        );
        Ok(Self { h, w, counts })
    }

    /// Parse the compressed string form used in COCO json files.
    pub fn from_compressed(h: usize, w: usize, text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        let mut counts: Vec<u32> = vec![];
        let mut pos = 0;

        while pos < bytes.len() {
            let mut value: i64 = 0;
            let mut shift = 0;

            loop {
                ensure!(
                    pos < bytes.len(),
                    "truncated run length at byte {} of '{}'",
                    pos,
                    text
                );
                let byte = bytes[pos];
                ensure!(
                    (48..48 + 64).contains(&byte),
                    "invalid character '{}' in compressed run lengths",
                    byte as char
                );
                ensure!(shift < 12, "run length too long in '{}'", text);
                let chunk = (byte - 48) as i64;
                value |= (chunk & 0x1f) << (5 * shift);
                pos += 1;
                shift += 1;

                if chunk & 0x20 == 0 {
                    if chunk & 0x10 != 0 {
                        value |= -1 << (5 * shift);
                    }
                    break;
                }
            }

            if counts.len() > 2 {
                value += counts[counts.len() - 2] as i64;
            }
            ensure!(
                (0..=u32::MAX as i64).contains(&value),
                "run length {} is out of range in '{}'",
                value,
                text
            );
            counts.push(value as u32);
        }

        Self::new(h, w, counts)
    }

    /// Produce the compressed string form used in COCO json files.
    pub fn to_compressed(&self) -> String {
        let mut text = String::new();

        for (index, &count) in self.counts.iter().enumerate() {
            let mut value = count as i64;
            if index > 2 {
                value -= self.counts[index - 2] as i64;
            }

            loop {
                let mut chunk = value & 0x1f;
                value >>= 5;
                let more = if chunk & 0x10 != 0 {
                    value != -1
                } else {
                    value != 0
                };
                if more {
                    chunk |= 0x20;
                }
                text.push((chunk as u8 + 48) as char);
                if !more {
                    break;
                }
            }
        }

        text
    }

    /// Encode a dense mask. Any non-zero pixel counts as foreground.
    pub fn from_mask(mask: ArrayView2<'_, u8>) -> Self {
        let (h, w) = mask.dim();
        let mut counts = vec![];
        let mut current = 0u8;
        let mut run = 0u32;

        for x in 0..w {
            for y in 0..h {
                let value = (mask[[y, x]] != 0) as u8;
                if value != current {
                    counts.push(run);
                    run = 0;
                    current = value;
                }
                run += 1;
            }
        }
        counts.push(run);

        Self { h, w, counts }
    }

    /// Expand the runs into a dense `[h, w]` mask of zeros and ones.
    pub fn decode(&self) -> Array2<u8> {
        let Self { h, w, ref counts } = *self;
        let mut mask = Array2::zeros((h, w));
        let mut offset = 0;

        for (index, &count) in counts.iter().enumerate() {
            let count = count as usize;
            if index % 2 == 1 {
                (offset..offset + count).for_each(|pos| {
                    mask[[pos % h, pos / h]] = 1;
                });
            }
            offset += count;
        }

        mask
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> usize {
        self.counts
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&count| count as usize)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rle_decode_column_major_test() {
        // 3x2 mask, column-major walk: 0 0 1 | 1 0 0
        let rle = Rle::new(3, 2, vec![2, 2, 2]).unwrap();
        let mask = rle.decode();
        assert_eq!(mask, array![[0, 1], [0, 0], [1, 0]]);
        assert_eq!(rle.area(), 2);
    }

    #[test]
    fn rle_rejects_wrong_total_test() {
        assert!(Rle::new(2, 2, vec![1, 2]).is_err());
    }

    #[test]
    fn compressed_string_matches_counts_test() {
        let mask = array![
            [0u8, 0, 1, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 1, 0, 0],
            [0, 0, 0, 0, 0],
        ];
        let rle = Rle::from_mask(mask.view());
        let text = rle.to_compressed();
        let parsed = Rle::from_compressed(4, 5, &text).unwrap();

        assert_eq!(parsed, rle);
        assert_eq!(parsed.decode(), mask);
    }

    #[test]
    fn compressed_string_rejects_garbage_test() {
        assert!(Rle::from_compressed(2, 2, "\x01").is_err());
    }

    #[test]
    fn overlong_run_length_test() {
        assert!(Rle::from_compressed(2, 2, "oooooooooooooo0").is_err());
        assert!(Rle::from_compressed(2, 2, "ooooooooooooo").is_err());
    }
}
