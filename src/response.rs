//! Per-frame response assembly.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};

use crate::codec::FrameCodec;
use crate::error::PipelineError;
use crate::persist::ArtifactPaths;
use crate::selector::Selection;
use crate::wire::{PlateResponse, ResponseStatus};

/// `plate_type` value when there is no plate.
pub const NO_PLATE_TYPE: &str = "none";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_THICKNESS: u32 = 2;

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Builds the three kinds of response. Image encoding failures are folded
/// into the response instead of being returned, so every frame gets exactly
/// one answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseAssembler {
    codec: FrameCodec,
}

impl ResponseAssembler {
    pub fn new(codec: FrameCodec) -> Self {
        Self { codec }
    }

    /// A plate was selected. `frame` is the processed frame; it is annotated
    /// with the winning region before encoding. `paths` is set only when a
    /// record was written.
    pub fn matched(
        &self,
        selection: &Selection,
        mut frame: RgbImage,
        paths: Option<&ArtifactPaths>,
        at: &DateTime<Local>,
    ) -> PlateResponse {
        draw_outline(&mut frame, selection);
        let encoded = self
            .codec
            .encode_rgb(&selection.crop)
            .and_then(|crop| Ok((crop, self.codec.encode_rgb(&frame)?)));
        let (plate_image, full_image) = match encoded {
            Ok(images) => images,
            Err(err) => return self.error(&err, None, at),
        };
        let (plate_folder, full_image_folder) = paths
            .map(|p| {
                (
                    p.plate_image.display().to_string(),
                    p.full_image.display().to_string(),
                )
            })
            .unwrap_or_default();
        PlateResponse {
            status: ResponseStatus::Matched,
            characters: selection.plate.text().to_string(),
            plate_type: selection.plate.kind().as_str().to_string(),
            plate_folder,
            full_image_folder,
            plate_image,
            full_image,
            timestamp: format_timestamp(at),
            error: String::new(),
        }
    }

    pub fn no_match(&self, frame: &RgbImage, at: &DateTime<Local>) -> PlateResponse {
        match self.codec.encode_rgb(frame) {
            Ok(full_image) => PlateResponse {
                status: ResponseStatus::NoMatch,
                plate_type: NO_PLATE_TYPE.to_string(),
                full_image,
                timestamp: format_timestamp(at),
                ..PlateResponse::default()
            },
            Err(err) => self.error(&err, None, at),
        }
    }

    /// The frame failed. `frame` is whatever was decoded, if anything.
    pub fn error(
        &self,
        err: &PipelineError,
        frame: Option<&RgbImage>,
        at: &DateTime<Local>,
    ) -> PlateResponse {
        let full_image = frame
            .and_then(|img| self.codec.encode_rgb(img).ok())
            .unwrap_or_default();
        PlateResponse {
            status: ResponseStatus::Error,
            plate_type: NO_PLATE_TYPE.to_string(),
            full_image,
            timestamp: format_timestamp(at),
            error: err.to_string(),
            ..PlateResponse::default()
        }
    }
}

fn draw_outline(image: &mut RgbImage, selection: &Selection) {
    let Some(bounds) = selection.region.clamp_to(image.width(), image.height()) else {
        return;
    };
    let x_end = bounds.x + bounds.width;
    let y_end = bounds.y + bounds.height;
    for y in bounds.y..y_end {
        for x in bounds.x..x_end {
            let on_edge = x < bounds.x + OUTLINE_THICKNESS
                || x + OUTLINE_THICKNESS >= x_end
                || y < bounds.y + OUTLINE_THICKNESS
                || y + OUTLINE_THICKNESS >= y_end;
            if on_edge {
                image.put_pixel(x, y, OUTLINE_COLOR);
            }
        }
    }
}
