use std::sync::Arc;

use image::RgbImage;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, Region};

use super::backend::{RecognitionGuess, TextRecognizer};

/// Crops a region out of its frame and hands it to the shared recognizer.
#[derive(Clone)]
pub struct RecognitionAdapter {
    recognizer: Arc<dyn TextRecognizer>,
}

impl RecognitionAdapter {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn backend_name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// Returns the crop together with the ranked guesses so the caller can
    /// reuse the pixels for the response and artifacts.
    pub fn recognize(
        &self,
        frame: &Frame,
        region: &Region,
    ) -> PipelineResult<(RgbImage, Vec<RecognitionGuess>)> {
        let crop = frame.crop(region).ok_or_else(|| {
            PipelineError::InvalidRegion(format!(
                "({}, {})-({}, {}) is empty inside a {}x{} frame",
                region.x1,
                region.y1,
                region.x2,
                region.y2,
                frame.width(),
                frame.height()
            ))
        })?;
        let guesses = self.recognizer.recognize(&crop).map_err(|e| {
            PipelineError::ModelInference(format!(
                "{} recognizer: {:#}",
                self.recognizer.name(),
                e
            ))
        })?;
        Ok((crop, guesses))
    }
}
