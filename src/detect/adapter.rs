use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, Region};

use super::backend::PlateDetector;

/// Wraps the shared detector capability for the per-frame pipeline.
#[derive(Clone)]
pub struct DetectionAdapter {
    detector: Arc<dyn PlateDetector>,
}

impl DetectionAdapter {
    pub fn new(detector: Arc<dyn PlateDetector>) -> Self {
        Self { detector }
    }

    pub fn backend_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Run the detector once. Region order is passed through untouched.
    pub fn detect(&self, frame: &Frame) -> PipelineResult<Vec<Region>> {
        let regions = self.detector.detect(frame.image()).map_err(|e| {
            PipelineError::ModelInference(format!("{} detector: {:#}", self.detector.name(), e))
        })?;
        log::debug!(
            "frame {}: {} detector proposed {} region(s)",
            frame.seq,
            self.detector.name(),
            regions.len()
        );
        Ok(regions)
    }
}
