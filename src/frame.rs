//! Frames and detector regions.
//!
//! - `Frame`: one decoded image of a session, numbered in arrival order.
//! - `Region`: a detector-proposed rectangle inside a frame.
//!
//! Neither type is persisted. A `Frame` lives for one request/response exchange
//! and every `Region` borrowed from it lives no longer.

use chrono::{DateTime, Local};
use image::{imageops, RgbImage};

/// One decoded video frame.
pub struct Frame {
    /// Zero-based position of the frame within its session.
    pub seq: u64,
    /// Wall-clock time the frame was decoded.
    pub received_at: DateTime<Local>,
    image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            received_at: Local::now(),
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the frame and hand back its pixels (used to annotate the
    /// outbound copy without cloning).
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Copy the pixels under `region`, clamped to the frame.
    ///
    /// Returns `None` for a degenerate region.
    pub fn crop(&self, region: &Region) -> Option<RgbImage> {
        let bounds = region.clamp_to(self.width(), self.height())?;
        Some(
            imageops::crop_imm(&self.image, bounds.x, bounds.y, bounds.width, bounds.height)
                .to_image(),
        )
    }
}

/// Detector output: pixel bounds plus detector confidence.
///
/// `x2` and `y2` are exclusive. Detectors may report coordinates outside the
/// frame; they are clamped before any pixel access.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
}

/// A region after clamping, in unsigned pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    /// Clamp to a `width`×`height` frame. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelBounds> {
        let clamp = |v: i32, max: u32| -> u32 { v.clamp(0, max as i32) as u32 };
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelBounds {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}
