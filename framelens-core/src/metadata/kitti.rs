use std::path::Path;

use snafu::ResultExt;
use tracing::debug;

use crate::{
    consts::KITTI_FIELDS,
    error::{FramelensError, IoReadSnafu, IoWriteSnafu},
    geometry::bbox::Bbox,
    metadata::record::Detection,
};

/// Parses one whitespace-delimited KITTI-like label row.
///
/// The class name may contain spaces, so everything before the trailing
/// 15 fixed-position fields belongs to it. Within the trailing fields,
/// indices 3..7 hold `[xmin, ymin, xmax, ymax]` and the last holds the
/// confidence score. Malformed rows fail fast.
pub fn parse_line(line: &str, path: &str, line_no: usize) -> Result<Detection, FramelensError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < KITTI_FIELDS {
        return Err(FramelensError::MalformedLabel {
            path: path.to_string(),
            line: line_no,
            message: format!(
                "expected at least {KITTI_FIELDS} fields, found {}",
                tokens.len()
            ),
        });
    }

    let class_name = tokens[..tokens.len() - KITTI_FIELDS].join(" ");
    let fields = &tokens[tokens.len() - KITTI_FIELDS..];

    let parse = |token: &str, what: &str| -> Result<f32, FramelensError> {
        token
            .parse::<f32>()
            .map_err(|_| FramelensError::MalformedLabel {
                path: path.to_string(),
                line: line_no,
                message: format!("{what} `{token}` is not a number"),
            })
    };

    let coords = [
        parse(fields[3], "xmin")?,
        parse(fields[4], "ymin")?,
        parse(fields[5], "xmax")?,
        parse(fields[6], "ymax")?,
    ];
    let bbox = Bbox::from_xyxy(coords).map_err(|_| FramelensError::MalformedLabel {
        path: path.to_string(),
        line: line_no,
        message: format!("malformed bounding box {coords:?}"),
    })?;
    let confidence = parse(fields[KITTI_FIELDS - 1], "confidence")?;

    Ok(Detection {
        class_name,
        bbox,
        confidence,
    })
}

/// Formats one detection as a KITTI-like label row.
pub fn format_line(detection: &Detection) -> String {
    let [xmin, ymin, xmax, ymax] = detection.bbox.to_xyxy();
    format!(
        "{} 0 0 0 {} {} {} {} 0 0 0 0 0 0 0 {}",
        detection.class_name, xmin, ymin, xmax, ymax, detection.confidence
    )
}

/// Reads every detection out of a label file. Blank lines are skipped;
/// any malformed row fails the whole file.
pub fn read_labels(path: &Path) -> Result<Vec<Detection>, FramelensError> {
    if !path.exists() {
        return Err(FramelensError::MissingResource {
            path: path.display().to_string(),
        });
    }
    let path_str = path.display().to_string();
    let content = std::fs::read_to_string(path).context(IoReadSnafu {
        path: path_str.as_str(),
    })?;

    let mut detections = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        detections.push(parse_line(line, &path_str, idx + 1)?);
    }
    debug!("read {} detections from {path_str}", detections.len());
    Ok(detections)
}

/// Writes detections as a KITTI-like label file, one row per object.
pub fn write_labels(path: &Path, detections: &[Detection]) -> Result<(), FramelensError> {
    let mut lines: Vec<String> = detections.iter().map(format_line).collect();
    lines.push(String::new());
    std::fs::write(path, lines.join("\n")).context(IoWriteSnafu {
        path: path.display().to_string(),
    })
}
