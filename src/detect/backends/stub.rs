use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::PlateDetector;
use crate::frame::Region;

/// Stub backend: returns the same regions for every frame.
///
/// Used by tests and by the server when no detector model is configured.
#[derive(Clone, Debug, Default)]
pub struct StubDetector {
    regions: Vec<Region>,
}

impl StubDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// A detector that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl PlateDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<Region>> {
        Ok(self.regions.clone())
    }
}
