use crate::common::*;

/// A closed polygon in pixel coordinates, stored as `[x, y]` vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// Build from the flat `[x0, y0, x1, y1, ...]` layout used by COCO.
    pub fn from_flat(coords: &[f64]) -> Result<Self> {
        ensure!(
            coords.len() % 2 == 0,
            "polygon has an odd number of coordinates ({})",
            coords.len()
        );
        let points = coords
            .iter()
            .tuples()
            .map(|(&x, &y)| [x, y])
            .collect();
        Ok(Self { points })
    }

    /// Paint the polygon interior and outline with `value`.
    ///
    /// Pixel centers sit on integer coordinates and the boundary is
    /// inclusive, as labelme masks are drawn.
    pub fn fill(&self, mask: &mut Array2<u8>, value: u8) {
        let (h, w) = mask.dim();
        let points = &self.points;
        if points.is_empty() || h == 0 || w == 0 {
            return;
        }

        // scanline interior
        let (min_y, max_y) = self.y_range();
        let row_begin = min_y.ceil().max(0.0) as usize;
        let row_end = (max_y.floor() + 1.0).clamp(0.0, h as f64) as usize;

        for y in row_begin..row_end {
            let xs = self.crossings(y as f64);
            for (&x0, &x1) in xs.iter().tuples() {
                let begin = x0.ceil().max(0.0);
                let end = x1.floor().min(w as f64 - 1.0);
                if begin > end {
                    continue;
                }
                for x in (begin as usize)..=(end as usize) {
                    mask[[y, x]] = value;
                }
            }
        }

        // outline
        points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .for_each(|(a, b)| draw_line(mask, *a, *b, value));
    }

    /// Paint the pixels whose centers lie inside the polygon.
    ///
    /// Pixel `[y, x]` covers the unit square from `(x, y)` to
    /// `(x + 1, y + 1)`, so its center is `(x + 0.5, y + 0.5)`. This is the
    /// rule of COCO polygon annotations: a box from 0 to 2 covers 2x2 pixels.
    pub fn fill_pixel_centers(&self, mask: &mut Array2<u8>, value: u8) {
        let (h, w) = mask.dim();
        if self.points.is_empty() || h == 0 || w == 0 {
            return;
        }

        let (min_y, max_y) = self.y_range();
        let row_begin = (min_y - 0.5).ceil().max(0.0) as usize;
        let row_end = (max_y - 0.5).ceil().clamp(0.0, h as f64) as usize;

        for y in row_begin..row_end {
            let xs = self.crossings(y as f64 + 0.5);
            for (&x0, &x1) in xs.iter().tuples() {
                // centers in [x0, x1)
                let begin = (x0 - 0.5).ceil().max(0.0) as usize;
                let end = (x1 - 0.5).ceil().clamp(0.0, w as f64) as usize;
                for x in begin..end {
                    mask[[y, x]] = value;
                }
            }
        }
    }

    fn y_range(&self) -> (f64, f64) {
        self.points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[1]), hi.max(p[1]))
            })
    }

    /// Sorted x positions where the edges cross the horizontal line `y`.
    fn crossings(&self, y: f64) -> Vec<f64> {
        let points = &self.points;
        let mut xs: Vec<f64> = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .filter_map(|(a, b)| {
                let (lo, hi) = if a[1] <= b[1] { (a, b) } else { (b, a) };
                // half-open rule so shared vertices are counted once
                (lo[1] <= y && y < hi[1])
                    .then(|| lo[0] + (y - lo[1]) * (hi[0] - lo[0]) / (hi[1] - lo[1]))
            })
            .collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        xs
    }

    /// Number of pixels covered by the polygon on a `[h, w]` canvas.
    pub fn area(&self, h: usize, w: usize) -> usize {
        let mut mask = Array2::zeros((h, w));
        self.fill(&mut mask, 1);
        mask.iter().filter(|&&value| value != 0).count()
    }
}

fn draw_line(mask: &mut Array2<u8>, from: [f64; 2], to: [f64; 2], value: u8) {
    let (h, w) = mask.dim();
    let (mut x0, mut y0) = (from[0].round() as i64, from[1].round() as i64);
    let (x1, y1) = (to[0].round() as i64, to[1].round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (0..w as i64).contains(&x0) && (0..h as i64).contains(&y0) {
            mask[[y0 as usize, x0 as usize]] = value;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_is_inclusive_test() {
        let square = Polygon::from_flat(&[1.0, 1.0, 3.0, 1.0, 3.0, 3.0, 1.0, 3.0]).unwrap();
        let mut mask = Array2::zeros((5, 5));
        square.fill(&mut mask, 1);

        assert_eq!(mask.sum(), 9);
        assert_eq!(mask[[1, 1]], 1);
        assert_eq!(mask[[3, 3]], 1);
        assert_eq!(mask[[0, 0]], 0);
        assert_eq!(mask[[4, 4]], 0);
    }

    #[test]
    fn triangle_is_clipped_to_canvas_test() {
        let triangle = Polygon::new(vec![[-4.0, -4.0], [10.0, 0.0], [0.0, 10.0]]);
        let mut mask = Array2::zeros((4, 4));
        triangle.fill(&mut mask, 7);

        assert_eq!(mask[[0, 0]], 7);
        assert!(mask.iter().all(|&value| value == 0 || value == 7));
    }

    #[test]
    fn pixel_center_fill_test() {
        let square = Polygon::from_flat(&[0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 0.0, 2.0]).unwrap();
        let mut mask = Array2::zeros((5, 5));
        square.fill_pixel_centers(&mut mask, 1);

        assert_eq!(mask.sum(), 4);
        assert_eq!(mask[[1, 1]], 1);
        assert_eq!(mask[[2, 2]], 0);
        assert_eq!(mask[[0, 2]], 0);

        // clipped to the canvas
        let wide = Polygon::from_flat(&[-3.0, 1.0, 9.0, 1.0, 9.0, 2.0, -3.0, 2.0]).unwrap();
        let mut mask = Array2::zeros((4, 4));
        wide.fill_pixel_centers(&mut mask, 1);
        assert_eq!(mask.sum(), 4);
        assert!(mask.row(1).iter().all(|&value| value == 1));
    }

    #[test]
    fn odd_coordinates_are_rejected_test() {
        assert!(Polygon::from_flat(&[1.0, 2.0, 3.0]).is_err());
    }
}
