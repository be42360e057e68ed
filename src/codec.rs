//! Frame codec.
//!
//! Producer and service exchange frames as JPEG. The producer resizes every
//! frame to a fixed canvas before encoding, which bounds both the wire size and
//! the detector input size. Only decodability of our own output is guaranteed;
//! the encoding is lossy.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_CANVAS_WIDTH: u32 = 800;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCodec {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FrameCodec {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
        }
    }

    /// Resize to the canvas and JPEG-encode for transport.
    pub fn encode(&self, image: &DynamicImage) -> PipelineResult<Vec<u8>> {
        let resized = image
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();
        self.encode_rgb(&resized)
    }

    /// JPEG-encode at the codec quality without resizing.
    pub fn encode_rgb(&self, image: &RgbImage) -> PipelineResult<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(image)
            .map_err(|e| PipelineError::Decode(format!("jpeg encode failed: {}", e)))?;
        Ok(out)
    }

    /// Decode a transmitted image into RGB pixels.
    pub fn decode(&self, bytes: &[u8]) -> PipelineResult<RgbImage> {
        if bytes.is_empty() {
            return Err(PipelineError::Decode("empty image payload".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::Decode(format!("image decode failed: {}", e)))?;
        Ok(image.to_rgb8())
    }
}

/// Stretch the image contrast so its darkest sample maps to 0 and its brightest
/// to 255. All channels share one range. A flat image is returned unchanged.
pub fn enhance(image: &RgbImage) -> RgbImage {
    let raw = image.as_raw();
    let (min, max) = raw
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if raw.is_empty() || max <= min {
        return image.clone();
    }
    let span = f32::from(max - min);
    let mut out = image.clone();
    for v in out.iter_mut() {
        *v = ((f32::from(*v - min) * 255.0) / span).round() as u8;
    }
    out
}
