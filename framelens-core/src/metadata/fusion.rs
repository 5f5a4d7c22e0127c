use tracing::trace;

use crate::metadata::{
    record::{Detection, ObjectRecord},
    region::TextRegion,
};

/// Correlates detector boxes with recognized text regions into the
/// fused per-object record set for one frame.
///
/// For each detection the labels of every intersecting region are
/// accumulated in region iteration order, space-separated. A region
/// intersecting several detections contributes its label to all of
/// them; a detection with no intersecting region gets an empty
/// `object_text`. O(detections × regions), which is fine at per-frame
/// object counts.
pub fn fuse(detections: Vec<Detection>, regions: &[TextRegion]) -> Vec<ObjectRecord> {
    detections
        .into_iter()
        .map(|detection| {
            let labels: Vec<&str> = regions
                .iter()
                .filter(|region| region.polygon.intersects_bbox(&detection.bbox))
                .map(|region| region.label.as_str())
                .collect();
            let object_text = labels.join(" ");
            trace!(
                "fused `{}` with {} text region(s)",
                detection.class_name,
                labels.len()
            );
            ObjectRecord {
                class_name: detection.class_name,
                bbox: detection.bbox,
                confidence: detection.confidence,
                object_text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::geometry::{bbox::Bbox, polygon::Polygon};

    fn detection(class: &str, coords: [f32; 4]) -> Detection {
        Detection {
            class_name: class.to_string(),
            bbox: Bbox::from_xyxy(coords).unwrap(),
            confidence: 0.9,
        }
    }

    fn region(label: &str, min: f32, max: f32) -> TextRegion {
        TextRegion {
            polygon: Polygon::new(vec![
                Vec2::new(min, min),
                Vec2::new(max, min),
                Vec2::new(max, max),
                Vec2::new(min, max),
            ]),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_label_inside_box_is_attached() {
        // One detection, one text region fully inside its box.
        let records = fuse(
            vec![detection("dog", [10.0, 10.0, 50.0, 50.0])],
            &[region("Fido", 20.0, 30.0)],
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].object_text, "Fido");
        assert_eq!(records[0].class_name, "dog");
    }

    #[test]
    fn test_non_intersecting_region_contributes_nowhere() {
        let records = fuse(
            vec![
                detection("dog", [10.0, 10.0, 50.0, 50.0]),
                detection("cat", [60.0, 60.0, 90.0, 90.0]),
            ],
            &[region("far away", 200.0, 220.0)],
        );
        assert_eq!(records[0].object_text, "");
        assert_eq!(records[1].object_text, "");
    }

    #[test]
    fn test_shared_region_contributes_to_all() {
        // Region overlapping both detections; no exclusive assignment.
        let records = fuse(
            vec![
                detection("left", [0.0, 0.0, 50.0, 50.0]),
                detection("right", [40.0, 0.0, 90.0, 50.0]),
            ],
            &[region("shared", 35.0, 55.0)],
        );
        assert_eq!(records[0].object_text, "shared");
        assert_eq!(records[1].object_text, "shared");
    }

    #[test]
    fn test_multiple_labels_join_in_region_order() {
        let records = fuse(
            vec![detection("sign", [0.0, 0.0, 100.0, 100.0])],
            &[region("STOP", 10.0, 20.0), region("AHEAD", 30.0, 40.0)],
        );
        assert_eq!(records[0].object_text, "STOP AHEAD");
    }

    #[test]
    fn test_detection_order_permutation_is_stable() {
        let regions = [region("STOP", 10.0, 20.0), region("EXIT", 60.0, 70.0)];
        let a = detection("a", [0.0, 0.0, 30.0, 30.0]);
        let b = detection("b", [50.0, 50.0, 80.0, 80.0]);

        let forward = fuse(vec![a.clone(), b.clone()], &regions);
        let backward = fuse(vec![b, a], &regions);

        // Permuting detection order permutes the output but leaves each
        // record's computed text unchanged.
        assert_eq!(forward[0].object_text, backward[1].object_text);
        assert_eq!(forward[1].object_text, backward[0].object_text);
        assert_eq!(forward[0].object_text, "STOP");
        assert_eq!(forward[1].object_text, "EXIT");
    }

    #[test]
    fn test_degenerate_region_is_ignored() {
        let line_region = TextRegion {
            polygon: Polygon::new(vec![Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0)]),
            label: "ghost".to_string(),
        };
        let records = fuse(
            vec![detection("dog", [0.0, 0.0, 100.0, 100.0])],
            &[line_region],
        );
        assert_eq!(records[0].object_text, "");
    }
}
