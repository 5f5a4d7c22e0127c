use glam::Vec2;

use crate::geometry::bbox::Bbox;

/// A closed polygon described by its vertices in key order.
///
/// Text-region collaborators report regions as `{x0, y0, x1, y1, ...}`
/// maps; vertices taken in index order describe a simple closed shape
/// sufficient for intersection testing against an axis-aligned box.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Vec2>,
}

impl Polygon {
    pub fn new(vertices: Vec<Vec2>) -> Self {
        Self { vertices }
    }

    /// Reads ordered vertices out of an `{x0, y0, x1, y1, ...}` map.
    ///
    /// Indices are consumed from zero until the first missing pair, so
    /// key order in the payload does not matter and vertex order is
    /// always the numeric index order.
    pub fn from_indexed_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut vertices = Vec::new();
        for index in 0.. {
            let x = map.get(&format!("x{index}")).and_then(|v| v.as_f64());
            let y = map.get(&format!("y{index}")).and_then(|v| v.as_f64());
            match (x, y) {
                (Some(x), Some(y)) => vertices.push(Vec2::new(x as f32, y as f32)),
                _ => break,
            }
        }
        Self::new(vertices)
    }

    /// Arithmetic mean of the vertices. Zero for an empty polygon.
    pub fn centroid(&self) -> Vec2 {
        if self.vertices.is_empty() {
            return Vec2::ZERO;
        }
        let sum: Vec2 = self.vertices.iter().copied().sum();
        sum / self.vertices.len() as f32
    }

    /// Number of distinct vertices; a polygon needs at least three to
    /// enclose any area.
    fn distinct_vertices(&self) -> usize {
        let mut distinct: Vec<Vec2> = Vec::with_capacity(self.vertices.len());
        for v in &self.vertices {
            if !distinct.contains(v) {
                distinct.push(*v);
            }
        }
        distinct.len()
    }

    /// Tests geometric intersection against an axis-aligned box.
    ///
    /// True when any polygon vertex lies inside the box, any box corner
    /// lies inside the polygon, or any polygon edge crosses a box edge.
    /// Degenerate polygons (fewer than three distinct vertices) never
    /// intersect.
    pub fn intersects_bbox(&self, bbox: &Bbox) -> bool {
        if self.distinct_vertices() < 3 {
            return false;
        }

        if self.vertices.iter().any(|v| bbox.contains_point(*v)) {
            return true;
        }

        if bbox.corners().iter().any(|c| self.contains_point(*c)) {
            return true;
        }

        let corners = bbox.corners();
        let n = self.vertices.len();
        for i in 0..n {
            let a1 = self.vertices[i];
            let a2 = self.vertices[(i + 1) % n];
            for j in 0..4 {
                let b1 = corners[j];
                let b2 = corners[(j + 1) % 4];
                if segments_intersect(a1, a2, b1, b2) {
                    return true;
                }
            }
        }

        false
    }

    /// Even-odd ray cast against the polygon boundary.
    pub fn contains_point(&self, point: Vec2) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if ((vi.y > point.y) != (vj.y > point.y))
                && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn orientation(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Vec2, b: Vec2, p: Vec2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Proper and collinear segment intersection.
fn segments_intersect(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f32, max: f32) -> Polygon {
        Polygon::new(vec![
            Vec2::new(min, min),
            Vec2::new(max, min),
            Vec2::new(max, max),
            Vec2::new(min, max),
        ])
    }

    #[test]
    fn test_from_indexed_map() {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"y1": 0.0, "x0": 1.0, "y0": 2.0, "x1": 3.0, "x2": 5.0, "y2": 6.0}"#,
        )
        .unwrap();
        let polygon = Polygon::from_indexed_map(&map);
        assert_eq!(
            polygon.vertices,
            vec![Vec2::new(1.0, 2.0), Vec2::new(3.0, 0.0), Vec2::new(5.0, 6.0)]
        );

        // Stops at the first missing index pair.
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"x0": 1.0, "y0": 2.0, "x2": 5.0, "y2": 6.0}"#).unwrap();
        assert_eq!(Polygon::from_indexed_map(&map).vertices.len(), 1);
    }

    #[test]
    fn test_centroid() {
        assert_eq!(square(0.0, 4.0).centroid(), Vec2::new(2.0, 2.0));
        assert_eq!(Polygon::new(vec![]).centroid(), Vec2::ZERO);
    }

    #[test]
    fn test_polygon_inside_bbox_intersects() {
        let bbox = Bbox::from_xyxy([10.0, 10.0, 50.0, 50.0]).unwrap();
        assert!(square(20.0, 30.0).intersects_bbox(&bbox));
    }

    #[test]
    fn test_bbox_inside_polygon_intersects() {
        // Box entirely inside a large polygon: no vertex of either
        // shape is inside the other shape's vertex set, the corner
        // containment test has to catch it.
        let bbox = Bbox::from_xyxy([40.0, 40.0, 60.0, 60.0]).unwrap();
        assert!(square(0.0, 100.0).intersects_bbox(&bbox));
    }

    #[test]
    fn test_edge_crossing_intersects() {
        // Tall thin polygon stabbing through a wide box with all
        // vertices outside it.
        let bbox = Bbox::from_xyxy([0.0, 40.0, 100.0, 60.0]).unwrap();
        let stab = Polygon::new(vec![
            Vec2::new(45.0, 0.0),
            Vec2::new(55.0, 0.0),
            Vec2::new(55.0, 100.0),
            Vec2::new(45.0, 100.0),
        ]);
        assert!(stab.intersects_bbox(&bbox));
    }

    #[test]
    fn test_disjoint_does_not_intersect() {
        let bbox = Bbox::from_xyxy([0.0, 0.0, 10.0, 10.0]).unwrap();
        assert!(!square(20.0, 30.0).intersects_bbox(&bbox));
    }

    #[test]
    fn test_degenerate_polygon_never_intersects() {
        let bbox = Bbox::from_xyxy([0.0, 0.0, 100.0, 100.0]).unwrap();

        // Two distinct vertices
        let segment = Polygon::new(vec![Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0)]);
        assert!(!segment.intersects_bbox(&bbox));

        // Three vertices, only two distinct
        let pinched = Polygon::new(vec![
            Vec2::new(10.0, 10.0),
            Vec2::new(20.0, 20.0),
            Vec2::new(10.0, 10.0),
        ]);
        assert!(!pinched.intersects_bbox(&bbox));

        let empty = Polygon::new(vec![]);
        assert!(!empty.intersects_bbox(&bbox));
    }

    #[test]
    fn test_contains_point() {
        let poly = square(0.0, 10.0);
        assert!(poly.contains_point(Vec2::new(5.0, 5.0)));
        assert!(!poly.contains_point(Vec2::new(15.0, 5.0)));
    }
}
