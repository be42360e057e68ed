#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::recognize::backend::{RecognitionGuess, TextRecognizer};
use crate::recognize::ctc::{greedy_decode, PLATE_CHARSET};

/// Tract-based CRNN recognizer.
///
/// Input is a `1x3xHxW` tensor normalised to `-1..1`; output is
/// `1xTxC` per-step class probabilities with the CTC blank at class 0.
pub struct TractRecognizer {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    charset: Vec<char>,
}

impl TractRecognizer {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            charset: PLATE_CHARSET.chars().collect(),
        })
    }

    /// Replace the default `0-9A-Z` character set.
    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.chars().collect();
        self
    }

    fn build_input(&self, crop: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(crop, self.width, self.height, FilterType::Triangle);
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let v = resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0;
                (v - 0.5) / 0.5
            },
        )
        .into_tensor()
    }
}

impl TextRecognizer for TractRecognizer {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn recognize(&self, crop: &RgbImage) -> Result<Vec<RecognitionGuess>> {
        let input = self.build_input(crop);
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
            return Err(anyhow!("unexpected recognizer output shape {:?}", shape));
        }
        let probs: Vec<f32> = view.iter().copied().collect();
        Ok(greedy_decode(&probs, shape[1], shape[2], &self.charset)
            .into_iter()
            .collect())
    }
}
