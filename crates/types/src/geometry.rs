use serde::{Deserialize, Serialize};

/// Axis-aligned 3D bounding box in world coordinates.
///
/// 2D data uses a zero-height `z` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Builds a box from two corners, normalising the axis order.
    pub fn new(corner_a: [f64; 3], corner_b: [f64; 3]) -> Self {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            min[axis] = corner_a[axis].min(corner_b[axis]);
            max[axis] = corner_a[axis].max(corner_b[axis]);
        }
        Self { min, max }
    }

    /// Smallest box enclosing every point, or `None` for an empty slice.
    pub fn from_points(points: &[[f64; 3]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(Self::new(*first, *first), |bbox, point| bbox.union(&Self::new(*point, *point))))
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            min[axis] = self.min[axis].min(other.min[axis]);
            max[axis] = self.max[axis].max(other.max[axis]);
        }
        BoundingBox { min, max }
    }

    /// Union over optional boxes; `None` is the identity.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<BoundingBox> {
        boxes.into_iter().fold(None, |acc: Option<BoundingBox>, bbox| match acc {
            Some(acc) => Some(acc.union(bbox)),
            None => Some(*bbox),
        })
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_corners() {
        let bbox = BoundingBox::new([10.0, -2.0, 5.0], [0.0, 4.0, -5.0]);
        assert_eq!(bbox.min, [0.0, -2.0, -5.0]);
        assert_eq!(bbox.max, [10.0, 4.0, 5.0]);
    }

    #[test]
    fn union_all_of_nothing_is_none() {
        assert!(BoundingBox::union_all(std::iter::empty()).is_none());
    }

    #[test]
    fn union_is_order_independent() {
        let boxes = [
            BoundingBox::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
            BoundingBox::new([-3.0, 2.0, 0.5], [0.5, 8.0, 0.7]),
            BoundingBox::new([4.0, -1.0, -9.0], [6.0, 0.0, -2.0]),
        ];
        let forward = BoundingBox::union_all(boxes.iter()).expect("box");
        let backward = BoundingBox::union_all(boxes.iter().rev()).expect("box");
        let nested = boxes[0].union(&boxes[1].union(&boxes[2]));
        assert_eq!(forward, backward);
        assert_eq!(forward, nested);
        assert_eq!(forward, BoundingBox::new([-3.0, -1.0, -9.0], [6.0, 8.0, 1.0]));
    }

    #[test]
    fn from_points_encloses_every_point() {
        let points = [[1.0, 2.0, 3.0], [-1.0, 5.0, 0.0], [0.0, 0.0, 10.0]];
        let bbox = BoundingBox::from_points(&points).expect("box");
        assert!(points.iter().all(|point| bbox.contains(*point)));
        assert!(!bbox.contains([2.0, 0.0, 0.0]));
    }
}
