#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::PlateDetector;
use crate::detect::postprocess::{decode_predictions, non_max_suppression, to_region};
use crate::frame::Region;

/// Tract-based plate detector for YOLO-style ONNX exports.
///
/// The model takes a `1x3xSxS` RGB tensor in `0..1` and returns
/// `1x(4+classes)xN` centre-format boxes. It does not perform any network I/O
/// or write to disk beyond model loading.
pub struct TractDetector {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 10,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, side as usize, side as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor()
    }
}

impl PlateDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("cannot run detector on an empty image"));
        }
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let data: Vec<f32> = view.iter().copied().collect();
        let boxes = decode_predictions(&data, shape[1], shape[2], self.confidence_threshold);
        let kept = non_max_suppression(boxes, self.iou_threshold, self.max_detections);

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        Ok(kept
            .iter()
            .map(|raw| to_region(raw, scale_x, scale_y))
            .collect())
    }
}
