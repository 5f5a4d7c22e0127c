use serde::{Serialize, Serializer};

use crate::geometry::bbox::Bbox;

/// One raw detector hit: class, box and score, before any text has
/// been correlated with it.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    pub class_name: String,
    #[serde(serialize_with = "serialize_bbox")]
    pub bbox: Bbox,
    pub confidence: f32,
}

/// One fused per-object record for a frame.
///
/// Produced by correlating detector boxes with recognized text regions;
/// immutable after fusion and consumed read-only by the analysis
/// function. `object_text` is always present, empty when no region
/// intersected the box.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectRecord {
    pub class_name: String,
    #[serde(serialize_with = "serialize_bbox")]
    pub bbox: Bbox,
    pub confidence: f32,
    pub object_text: String,
}

/// Boxes cross the wire as ordered `[xmin, ymin, xmax, ymax]`, the
/// shape the synthesis prompt documents.
fn serialize_bbox<S>(bbox: &Bbox, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    bbox.to_xyxy().serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_bbox_as_xyxy_array() {
        let record = ObjectRecord {
            class_name: "dog".to_string(),
            bbox: Bbox::from_xyxy([10.0, 10.0, 50.0, 50.0]).unwrap(),
            confidence: 0.9,
            object_text: "Fido".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["class_name"], "dog");
        assert_eq!(value["bbox"], serde_json::json!([10.0, 10.0, 50.0, 50.0]));
        assert_eq!(value["object_text"], "Fido");
    }
}
