#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_predictions, DecodeParams};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// This backend loads a local model file once and runs it on every frame.
/// Frames are stretched to the square model input; boxes are mapped back to
/// frame pixels during decoding.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    class_names: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        class_names: Vec<String>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            class_names,
            confidence_threshold: 0.3,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(anyhow!("cannot run detection on an empty frame"));
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
        }
        let flat: Vec<f32> = preds.iter().copied().collect();

        let params = DecodeParams {
            scale_x: self.input_size as f32 / frame.width() as f32,
            scale_y: self.input_size as f32 / frame.height() as f32,
            frame_width: frame.width(),
            frame_height: frame.height(),
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
        };
        decode_predictions(&flat, shape[1], shape[2], &self.class_names, &params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        let blank = tract_ndarray::Array4::<f32>::zeros((1, 3, size, size)).into_tensor();
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}
