use std::collections::HashMap;

use anyhow::Result;
use image::RgbImage;

use crate::recognize::backend::{RecognitionGuess, TextRecognizer};

/// Stub backend: answers from a table keyed by crop size.
///
/// Detector regions of distinct sizes therefore read as distinct text, which
/// is enough to script multi-region frames in tests.
#[derive(Clone, Debug, Default)]
pub struct StubRecognizer {
    by_size: HashMap<(u32, u32), Vec<RecognitionGuess>>,
    fallback: Vec<RecognitionGuess>,
}

impl StubRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guesses returned for crops of exactly `width`x`height`.
    pub fn with_guesses(mut self, width: u32, height: u32, guesses: Vec<RecognitionGuess>) -> Self {
        self.by_size.insert((width, height), guesses);
        self
    }

    /// Guesses returned for any other crop.
    pub fn with_fallback(mut self, guesses: Vec<RecognitionGuess>) -> Self {
        self.fallback = guesses;
        self
    }
}

impl TextRecognizer for StubRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionGuess>> {
        Ok(self
            .by_size
            .get(&crop.dimensions())
            .unwrap_or(&self.fallback)
            .clone())
    }
}
