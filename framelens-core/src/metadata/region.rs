use std::path::Path;

use snafu::ResultExt;

use crate::{
    error::{FramelensError, IoReadSnafu, JsonSnafu},
    geometry::polygon::Polygon,
};

/// One recognized text region: the polygon the recognizer drew around
/// the text and the string it read there.
#[derive(Clone, Debug)]
pub struct TextRegion {
    pub polygon: Polygon,
    pub label: String,
}

/// Parses the text-collaborator response payload:
/// `{"metadata": [{"polygon": {"x0": .., "y0": .., ..}, "label": ".."}]}`.
pub fn parse_response(payload: &serde_json::Value) -> Result<Vec<TextRegion>, FramelensError> {
    let entries = payload
        .get("metadata")
        .and_then(|m| m.as_array())
        .ok_or_else(|| FramelensError::CollaboratorResponse {
            service: "text-region".to_string(),
            field: "metadata".to_string(),
        })?;

    let mut regions = Vec::with_capacity(entries.len());
    for entry in entries {
        let polygon = entry
            .get("polygon")
            .and_then(|p| p.as_object())
            .map(Polygon::from_indexed_map)
            .ok_or_else(|| FramelensError::CollaboratorResponse {
                service: "text-region".to_string(),
                field: "metadata.polygon".to_string(),
            })?;
        let label = entry
            .get("label")
            .and_then(|l| l.as_str())
            .unwrap_or_default()
            .to_string();
        regions.push(TextRegion { polygon, label });
    }
    Ok(regions)
}

/// Sorts regions top-left to bottom-right by polygon centroid, the
/// natural reading order for label accumulation.
pub fn sort_reading_order(regions: &mut [TextRegion]) {
    regions.sort_by(|a, b| {
        let ca = a.polygon.centroid();
        let cb = b.polygon.centroid();
        ca.y.total_cmp(&cb.y).then(ca.x.total_cmp(&cb.x))
    });
}

/// Loads the `.response` payload written under one frame's results
/// directory. A missing response file is a resource failure surfaced
/// immediately.
pub fn load_regions(results_dir: &Path, sort: bool) -> Result<Vec<TextRegion>, FramelensError> {
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
        stage: "text-region-response",
    })?;

    let mut regions = parse_response(&payload)?;
    if sort {
        sort_reading_order(&mut regions);
    }
    Ok(regions)
}
