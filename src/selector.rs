//! Per-frame candidate selection.
//!
//! Regions are visited in detector order and guesses in recognizer rank order.
//! The first (region, guess) pair that validates wins, even when a later region
//! carries a higher detector or OCR confidence. This keeps the per-frame cost
//! bounded by the first hit.

use image::RgbImage;

use crate::detect::DetectionAdapter;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, Region};
use crate::plate::{NormalizedPlate, PlateValidator};
use crate::recognize::RecognitionAdapter;

/// The single winning plate of a frame.
#[derive(Clone, Debug)]
pub struct Selection {
    pub plate: NormalizedPlate,
    pub region: Region,
    pub crop: RgbImage,
    /// Confidence of the region's top-ranked guess.
    pub ocr_confidence: f32,
}

pub struct CandidateSelector {
    detector: DetectionAdapter,
    recognizer: RecognitionAdapter,
    validator: PlateValidator,
}

impl CandidateSelector {
    pub fn new(
        detector: DetectionAdapter,
        recognizer: RecognitionAdapter,
        validator: PlateValidator,
    ) -> Self {
        Self {
            detector,
            recognizer,
            validator,
        }
    }

    pub fn detector(&self) -> &DetectionAdapter {
        &self.detector
    }

    pub fn recognizer(&self) -> &RecognitionAdapter {
        &self.recognizer
    }

    pub fn validator(&self) -> &PlateValidator {
        &self.validator
    }

    /// Pick at most one plate from `frame`.
    ///
    /// `Ok(None)` means no plate. Degenerate regions are skipped; capability
    /// failures abort the frame.
    pub fn select(&self, frame: &Frame) -> PipelineResult<Option<Selection>> {
        let regions = self.detector.detect(frame)?;
        for region in regions {
            let (crop, guesses) = match self.recognizer.recognize(frame, &region) {
                Ok(found) => found,
                Err(PipelineError::InvalidRegion(reason)) => {
                    log::debug!("frame {}: skipping region: {}", frame.seq, reason);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let ocr_confidence = guesses.first().map(|g| g.confidence).unwrap_or(0.0);
            let winner = guesses
                .iter()
                .find_map(|guess| self.validator.validate(&guess.text, guess.confidence));
            if let Some(plate) = winner {
                log::debug!(
                    "frame {}: {} plate {} (conf {:.2})",
                    frame.seq,
                    plate.kind(),
                    plate.text(),
                    plate.confidence()
                );
                return Ok(Some(Selection {
                    plate,
                    region,
                    crop,
                    ocr_confidence,
                }));
            }
        }
        Ok(None)
    }
}
