use crate::error::FramelensError;

/// A 2D axis-aligned bounding box represented by minimum and maximum points.
///
/// Detector output arrives as ordered `[xmin, ymin, xmax, ymax]` pixel
/// coordinates; the box is stored as min/max corner vectors for cheap
/// intersection and containment queries during fusion and overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    /// The minimum point of the bounding box (top-left in image space).
    pub min: glam::Vec2,
    /// The maximum point of the bounding box (bottom-right in image space).
    pub max: glam::Vec2,
}

impl Bbox {
    /// Creates a new bounding box from minimum and maximum points.
    pub fn new(min: glam::Vec2, max: glam::Vec2) -> Self {
        Self { min, max }
    }

    /// Builds a bounding box from detector `[xmin, ymin, xmax, ymax]`
    /// coordinates, failing fast on malformed geometry.
    ///
    /// Detector output is trusted as-is, but a box with non-finite
    /// values or inverted extents would poison every downstream
    /// intersection test, so those are rejected here.
    pub fn from_xyxy(coords: [f32; 4]) -> Result<Self, FramelensError> {
        let [xmin, ymin, xmax, ymax] = coords;
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(FramelensError::MalformedLabel {
                path: String::new(),
                line: 0,
                message: format!("non-finite bounding box {coords:?}"),
            });
        }
        if xmin > xmax || ymin > ymax {
            return Err(FramelensError::MalformedLabel {
                path: String::new(),
                line: 0,
                message: format!("inverted bounding box {coords:?}"),
            });
        }
        Ok(Self::new(
            glam::Vec2::new(xmin, ymin),
            glam::Vec2::new(xmax, ymax),
        ))
    }

    /// Returns the box as ordered `[xmin, ymin, xmax, ymax]`.
    pub fn to_xyxy(&self) -> [f32; 4] {
        [self.min.x, self.min.y, self.max.x, self.max.y]
    }

    /// Calculates the area of the bounding box (width × height).
    pub fn area(&self) -> f32 {
        let length = self.max - self.min;

        length.x * length.y
    }

    /// Calculates the center point of the bounding box.
    pub fn center(&self) -> glam::Vec2 {
        (self.min + self.max) / 2.0
    }

    /// Calculates the area of intersection between this bounding box and another.
    ///
    /// Returns 0.0 when the boxes do not overlap.
    pub fn intersection(&self, other: &Self) -> f32 {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);

        if max.x > min.x && max.y > min.y {
            (max.x - min.x) * (max.y - min.y)
        } else {
            0.
        }
    }

    /// Checks whether a point lies inside or on the boundary of this box.
    pub fn contains_point(&self, point: glam::Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Checks if this bounding box completely contains another bounding box.
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    /// The four corners in clockwise order starting at the minimum point.
    pub fn corners(&self) -> [glam::Vec2; 4] {
        [
            self.min,
            glam::Vec2::new(self.max.x, self.min.y),
            self.max,
            glam::Vec2::new(self.min.x, self.max.y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_area_and_center() {
        let bbox = Bbox::new(glam::Vec2::ZERO, glam::Vec2::new(4.0, 3.0));
        assert_eq!(bbox.area(), 12.0);
        assert_eq!(bbox.center(), glam::Vec2::new(2.0, 1.5));

        // Degenerate line box
        let line = Bbox::new(glam::Vec2::ZERO, glam::Vec2::new(5.0, 0.0));
        assert_eq!(line.area(), 0.0);
    }

    #[test]
    fn test_bbox_intersection_area() {
        // Two partially overlapping boxes (2×2 intersection)
        let bbox1 = Bbox::new(glam::Vec2::new(0.0, 0.0), glam::Vec2::new(4.0, 4.0));
        let bbox2 = Bbox::new(glam::Vec2::new(2.0, 2.0), glam::Vec2::new(6.0, 6.0));
        assert_eq!(bbox1.intersection(&bbox2), 4.0);

        // Non-overlapping boxes
        let bbox3 = Bbox::new(glam::Vec2::new(0.0, 0.0), glam::Vec2::new(2.0, 2.0));
        let bbox4 = Bbox::new(glam::Vec2::new(3.0, 3.0), glam::Vec2::new(5.0, 5.0));
        assert_eq!(bbox3.intersection(&bbox4), 0.0);

        // Edge touching is not an area intersection
        let left = Bbox::new(glam::Vec2::new(0.0, 0.0), glam::Vec2::new(2.0, 2.0));
        let right = Bbox::new(glam::Vec2::new(2.0, 0.0), glam::Vec2::new(4.0, 2.0));
        assert_eq!(left.intersection(&right), 0.0);

        // One box completely inside another, symmetric
        let outer = Bbox::new(glam::Vec2::new(0.0, 0.0), glam::Vec2::new(10.0, 10.0));
        let inner = Bbox::new(glam::Vec2::new(2.0, 3.0), glam::Vec2::new(5.0, 7.0));
        assert_eq!(outer.intersection(&inner), 12.0);
        assert_eq!(inner.intersection(&outer), 12.0);
    }

    #[test]
    fn test_bbox_contains() {
        let outer = Bbox::new(glam::Vec2::new(0.0, 0.0), glam::Vec2::new(10.0, 10.0));
        let inner = Bbox::new(glam::Vec2::new(2.0, 3.0), glam::Vec2::new(7.0, 8.0));
        let separate = Bbox::new(glam::Vec2::new(12.0, 12.0), glam::Vec2::new(15.0, 15.0));

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&separate));

        assert!(outer.contains_point(glam::Vec2::new(5.0, 5.0)));
        assert!(outer.contains_point(glam::Vec2::new(0.0, 10.0)));
        assert!(!outer.contains_point(glam::Vec2::new(-1.0, 5.0)));
    }

    #[test]
    fn test_bbox_from_xyxy_roundtrip() {
        let bbox = Bbox::from_xyxy([10.0, 20.0, 50.0, 80.0]).unwrap();
        assert_eq!(bbox.min, glam::Vec2::new(10.0, 20.0));
        assert_eq!(bbox.max, glam::Vec2::new(50.0, 80.0));
        assert_eq!(bbox.to_xyxy(), [10.0, 20.0, 50.0, 80.0]);
    }

    #[test]
    fn test_bbox_from_xyxy_rejects_malformed() {
        assert!(Bbox::from_xyxy([f32::NAN, 0.0, 1.0, 1.0]).is_err());
        assert!(Bbox::from_xyxy([0.0, 0.0, f32::INFINITY, 1.0]).is_err());
        // Inverted extents
        assert!(Bbox::from_xyxy([5.0, 0.0, 1.0, 1.0]).is_err());
        assert!(Bbox::from_xyxy([0.0, 5.0, 1.0, 1.0]).is_err());
        // Zero-size is degenerate but ordered, so it is accepted
        assert!(Bbox::from_xyxy([2.0, 2.0, 2.0, 2.0]).is_ok());
    }

    #[test]
    fn test_bbox_corners() {
        let bbox = Bbox::new(glam::Vec2::new(1.0, 2.0), glam::Vec2::new(4.0, 6.0));
        let corners = bbox.corners();
        assert_eq!(corners[0], glam::Vec2::new(1.0, 2.0));
        assert_eq!(corners[1], glam::Vec2::new(4.0, 2.0));
        assert_eq!(corners[2], glam::Vec2::new(4.0, 6.0));
        assert_eq!(corners[3], glam::Vec2::new(1.0, 6.0));
    }
}
