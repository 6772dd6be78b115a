use crate::{common::*, Polygon};

/// Pixel value painted for shapes whose label asks to be ignored.
pub const IGNORE_VALUE: u8 = 255;

/// A labelme-style polygon shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub label: String,
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub shape_type: Option<String>,
}

impl Shape {
    fn is_flag(&self) -> bool {
        self.label.to_lowercase() == "flag"
    }

    fn is_ignore(&self) -> bool {
        self.label.to_lowercase().contains("ignore")
    }
}

/// Render shapes into a `[h, w]` mask.
///
/// Shapes labelled `flag` are skipped. The remaining ones are painted from
/// the largest area to the smallest, so smaller shapes stay visible on top.
/// Shapes whose label contains `ignore` paint [IGNORE_VALUE], all others
/// paint 1.
pub fn render_shapes(shapes: &[Shape], h: usize, w: usize) -> Array2<u8> {
    let mut mask = Array2::zeros((h, w));

    shapes
        .iter()
        .filter(|shape| !shape.is_flag())
        .map(|shape| {
            let polygon = Polygon::new(shape.points.clone());
            let area = polygon.area(h, w);
            (shape, polygon, area)
        })
        .sorted_by(|(_, _, lhs), (_, _, rhs)| rhs.cmp(lhs))
        .for_each(|(shape, polygon, _)| {
            let value = if shape.is_ignore() { IGNORE_VALUE } else { 1 };
            polygon.fill(&mut mask, value);
        });

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(label: &str, t: f64, l: f64, b: f64, r: f64) -> Shape {
        Shape {
            label: label.to_string(),
            points: vec![[l, t], [r, t], [r, b], [l, b]],
            shape_type: Some("polygon".to_string()),
        }
    }

    #[test]
    fn small_ignore_region_stays_on_top_test() {
        let shapes = vec![
            rect("ignore", 2.0, 2.0, 3.0, 3.0),
            rect("target", 0.0, 0.0, 5.0, 5.0),
            rect("flag", 0.0, 0.0, 9.0, 9.0),
        ];
        let mask = render_shapes(&shapes, 10, 10);

        assert_eq!(mask[[0, 0]], 1);
        assert_eq!(mask[[2, 2]], IGNORE_VALUE);
        assert_eq!(mask[[3, 3]], IGNORE_VALUE);
        assert_eq!(mask[[5, 5]], 1);
        assert_eq!(mask[[9, 9]], 0);
    }
}
