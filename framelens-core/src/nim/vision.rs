use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt, stream};
use snafu::ResultExt;
use tracing::info;
use uuid::Uuid;

use crate::{
    consts::{DETECTION_URL, TEXT_REGION_URL},
    error::{
        CollaboratorRequestSnafu, FramelensError, IoReadSnafu, IoWriteSnafu, JsonSnafu,
    },
    geometry::bbox::Bbox,
    metadata::{kitti, record::Detection},
    nim::{asset::AssetClient, poll},
};

/// One hosted vision service: knows its endpoint and how to phrase an
/// inference request for an uploaded asset. The upload/submit/poll/
/// unpack plumbing is shared by `VisionSession`.
pub trait VisionModel: Send + Sync {
    const SERVICE: &'static str;

    fn invoke_url(&self) -> &str;
    fn request_body(&self, asset_id: Uuid) -> serde_json::Value;
}

/// Open-vocabulary object detection, prompted with the noun phrases
/// extracted from the question.
pub struct DetectionModel {
    url: String,
    phrases: String,
}

impl DetectionModel {
    /// `phrases` are the detection vocabulary, comma-joined into the
    /// request prompt.
    pub fn new(phrases: &[String]) -> Self {
        Self {
            url: DETECTION_URL.to_string(),
            phrases: phrases.join(", "),
        }
    }
}

impl VisionModel for DetectionModel {
    const SERVICE: &'static str = "detection";

    fn invoke_url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, asset_id: Uuid) -> serde_json::Value {
        serde_json::json!({
            "model": "Grounding-Dino",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": self.phrases},
                    {"type": "media_url",
                     "media_url": {"url": format!("data:image/jpeg;asset_id,{asset_id}")}},
                ],
            }],
            "threshold": 0.3,
        })
    }
}

/// Optical character/region detection.
pub struct TextRegionModel {
    url: String,
}

impl TextRegionModel {
    pub fn new() -> Self {
        Self {
            url: TEXT_REGION_URL.to_string(),
        }
    }
}

impl Default for TextRegionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionModel for TextRegionModel {
    const SERVICE: &'static str = "text-region";

    fn invoke_url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, asset_id: Uuid) -> serde_json::Value {
        serde_json::json!({
            "image": asset_id.to_string(),
            "render_label": false,
        })
    }
}

/// Shared upload → submit → poll → persist plumbing over one vision
/// service.
pub struct VisionSession<M: VisionModel> {
    model: M,
    client: reqwest::Client,
    assets: AssetClient,
    api_key: String,
}

impl<M: VisionModel> VisionSession<M> {
    pub fn new(model: M, client: reqwest::Client, api_key: &str) -> Self {
        let assets = AssetClient::new(client.clone(), api_key);
        Self {
            model,
            client,
            assets,
            api_key: api_key.to_string(),
        }
    }

    /// Runs inference for one image and persists the response payload
    /// under `<output_dir>/<image stem>/<image stem>.response`.
    pub async fn infer_one(
        &self,
        image_path: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, FramelensError> {
        let stem = image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FramelensError::MissingResource {
                path: image_path.display().to_string(),
            })?;

        let asset_id = self.assets.upload_image(image_path, "Input Image").await?;
        let asset_ref = asset_id.to_string();

        let response = self
            .client
            .post(self.model.invoke_url())
            .bearer_auth(&self.api_key)
            .header("NVCF-INPUT-ASSET-REFERENCES", &asset_ref)
            .header("NVCF-FUNCTION-ASSET-IDS", &asset_ref)
            .json(&self.model.request_body(asset_id))
            .send()
            .await
            .context(CollaboratorRequestSnafu {
                service: M::SERVICE,
            })?;
        let body = poll::await_result(&self.client, &self.api_key, M::SERVICE, response).await?;

        let results_dir = output_dir.join(stem);
        tokio::fs::create_dir_all(&results_dir)
            .await
            .context(IoWriteSnafu {
                path: results_dir.display().to_string(),
            })?;
        let response_path = results_dir.join(format!("{stem}.response"));
        tokio::fs::write(&response_path, &body)
            .await
            .context(IoWriteSnafu {
                path: response_path.display().to_string(),
            })?;
        Ok(results_dir)
    }

    /// Runs inference over every image in a directory with a bounded
    /// worker pool. Completion order is arbitrary; any failure fails
    /// the batch step.
    pub async fn batch_infer(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        workers: usize,
    ) -> Result<(), FramelensError> {
        let images = list_images(input_dir)?;
        info!(
            "`{}` batch over {} image(s), {workers} workers",
            M::SERVICE,
            images.len()
        );

        stream::iter(images)
            .map(|image| async move { self.infer_one(&image, output_dir).await })
            .buffer_unordered(workers)
            .try_collect::<Vec<_>>()
            .await?;

        info!("`{}` batch complete", M::SERVICE);
        Ok(())
    }
}

fn list_images(input_dir: &Path) -> Result<Vec<PathBuf>, FramelensError> {
    let entries = std::fs::read_dir(input_dir).context(IoReadSnafu {
        path: input_dir.display().to_string(),
    })?;
    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "png" | "jpg" | "jpeg"))
        })
        .collect();
    images.sort();
    Ok(images)
}

/// Converts one detection response payload into detector records.
///
/// The payload nests per-phrase box lists under
/// `choices[].message.content.boundingBoxes`, each carrying parallel
/// `bboxes`/`confidence` arrays.
pub fn parse_detection_response(
    payload: &serde_json::Value,
) -> Result<Vec<Detection>, FramelensError> {
    let choices = payload
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| FramelensError::CollaboratorResponse {
            service: DetectionModel::SERVICE.to_string(),
            field: "choices".to_string(),
        })?;

    let mut detections = Vec::new();
    for choice in choices {
        let boxes = choice["message"]["content"]["boundingBoxes"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        for entry in boxes {
            let phrase = entry["phrase"]
                .as_str()
                .unwrap_or_default()
                .trim_matches(['[', ']'])
                .replace('\'', "")
                .trim()
                .to_string();
            let bboxes = entry["bboxes"].as_array().cloned().unwrap_or_default();
            let confidences = entry["confidence"].as_array().cloned().unwrap_or_default();
            for (bbox, confidence) in bboxes.iter().zip(confidences.iter()) {
                let coords: Vec<f32> = bbox
                    .as_array()
                    .map(|c| c.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                    .unwrap_or_default();
                if coords.len() != 4 {
                    return Err(FramelensError::CollaboratorResponse {
                        service: DetectionModel::SERVICE.to_string(),
                        field: "boundingBoxes.bboxes".to_string(),
                    });
                }
                detections.push(Detection {
                    class_name: phrase.clone(),
                    bbox: Bbox::from_xyxy([coords[0], coords[1], coords[2], coords[3]])?,
                    confidence: confidence.as_f64().unwrap_or_default() as f32,
                });
            }
        }
    }
    Ok(detections)
}

/// Reads the `.response` payload in one frame's detection results
/// directory, rewrites it as a KITTI label file next to it, and
/// returns the parsed detections.
pub fn detection_labels(results_dir: &Path) -> Result<Vec<Detection>, FramelensError> {
    let response_file = std::fs::read_dir(results_dir)
        .ok()
        .and_then(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .find(|p| p.extension().is_some_and(|ext| ext == "response"))
        })
        .ok_or_else(|| FramelensError::MissingResource {
            path: results_dir.display().to_string(),
        })?;

    let display = response_file.display().to_string();
    let content = std::fs::read_to_string(&response_file).context(IoReadSnafu {
        path: display.as_str(),
    })?;
    let payload: serde_json::Value = serde_json::from_str(&content).context(JsonSnafu {
        stage: "detection-response",
    })?;

    let detections = parse_detection_response(&payload)?;
    kitti::write_labels(&results_dir.join("labels.txt"), &detections)?;
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "choices": [{
                "message": {"content": {
                    "frameNo": 0,
                    "boundingBoxes": [
                        {
                            "phrase": "['the robot']",
                            "bboxes": [[10.0, 20.0, 110.0, 220.0]],
                            "confidence": [0.91]
                        },
                        {
                            "phrase": "forklift",
                            "bboxes": [[5.0, 5.0, 50.0, 50.0], [60.0, 60.0, 90.0, 95.0]],
                            "confidence": [0.7, 0.65]
                        }
                    ]
                }}
            }]
        })
    }

    #[test]
    fn test_parse_detection_response() {
        let detections = parse_detection_response(&payload()).unwrap();
        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].class_name, "the robot");
        assert_eq!(detections[0].bbox.to_xyxy(), [10.0, 20.0, 110.0, 220.0]);
        assert_eq!(detections[0].confidence, 0.91);
        assert_eq!(detections[1].class_name, "forklift");
        assert_eq!(detections[2].bbox.to_xyxy(), [60.0, 60.0, 90.0, 95.0]);
    }

    #[test]
    fn test_parse_detection_response_missing_choices() {
        let err = parse_detection_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, FramelensError::CollaboratorResponse { .. }));
    }

    #[test]
    fn test_parse_detection_response_bad_bbox_arity() {
        let bad = serde_json::json!({
            "choices": [{"message": {"content": {"boundingBoxes": [
                {"phrase": "dog", "bboxes": [[1.0, 2.0, 3.0]], "confidence": [0.5]}
            ]}}}]
        });
        assert!(parse_detection_response(&bad).is_err());
    }

    #[test]
    fn test_detection_labels_roundtrip_through_kitti() {
        let dir = std::env::temp_dir().join(format!("framelens-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("frame_00001.response"),
            serde_json::to_string(&payload()).unwrap(),
        )
        .unwrap();

        let detections = detection_labels(&dir).unwrap();
        let reread = kitti::read_labels(&dir.join("labels.txt")).unwrap();
        assert_eq!(detections.len(), reread.len());
        for (a, b) in detections.iter().zip(&reread) {
            assert_eq!(a.class_name, b.class_name);
            assert_eq!(a.bbox.to_xyxy(), b.bbox.to_xyxy());
            assert_eq!(a.confidence, b.confidence);
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_detection_labels_missing_response_is_resource_failure() {
        let dir = std::env::temp_dir().join(format!("framelens-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let err = detection_labels(&dir).unwrap_err();
        assert!(matches!(err, FramelensError::MissingResource { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
