use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use snafu::ResultExt;

use crate::{
    error::{FontSnafu, FramelensError, ImageSnafu, IoReadSnafu},
    metadata::record::Detection,
};

const BOX_COLOR: image::Rgb<u8> = image::Rgb([0, 255, 0]);
const TEXT_COLOR: image::Rgb<u8> = image::Rgb([255, 0, 0]);
const TEXT_SCALE: f32 = 28.0;
const TEXT_ORIGIN: (i32, i32) = (20, 20);

pub fn load_font(path: &Path) -> Result<FontVec, FramelensError> {
    let data = std::fs::read(path).context(IoReadSnafu {
        path: path.display().to_string(),
    })?;
    FontVec::try_from_vec(data).context(FontSnafu)
}

/// Draws the detection boxes and the frame's analytic result onto one
/// frame image and writes the annotated copy.
pub fn render_frame(
    image_path: &Path,
    detections: &[Detection],
    analytic_label: &str,
    font: &FontVec,
    output_path: &Path,
) -> Result<(), FramelensError> {
    let display = image_path.display().to_string();
    let mut canvas = image::open(image_path)
        .context(ImageSnafu {
            path: display.as_str(),
        })?
        .to_rgb8();

    for detection in detections {
        let [xmin, ymin, xmax, ymax] = detection.bbox.to_xyxy();
        let width = (xmax - xmin).max(1.0) as u32;
        let height = (ymax - ymin).max(1.0) as u32;
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(xmin as i32, ymin as i32).of_size(width, height),
            BOX_COLOR,
        );
    }

    draw_text_mut(
        &mut canvas,
        TEXT_COLOR,
        TEXT_ORIGIN.0,
        TEXT_ORIGIN.1,
        PxScale::from(TEXT_SCALE),
        font,
        analytic_label,
    );

    canvas.save(output_path).context(ImageSnafu {
        path: output_path.display().to_string(),
    })
}
