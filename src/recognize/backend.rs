use anyhow::Result;
use image::RgbImage;

/// One ranked reading of a region's text.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionGuess {
    pub text: String,
    pub confidence: f32,
}

impl RecognitionGuess {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Text recognizer capability.
///
/// Shared read-only across sessions, like `PlateDetector`.
pub trait TextRecognizer: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Read the text in a cropped plate region, best guess first.
    ///
    /// The crop is never empty; callers reject degenerate regions before
    /// calling. An empty result means no legible text.
    fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionGuess>>;
}
