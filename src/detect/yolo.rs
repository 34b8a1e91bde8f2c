//! YOLOv8 output decoding.
//!
//! The detection head of a YOLOv8 ONNX export produces a `[1, 4 + C, N]` tensor:
//! for each of the `N` anchors, `cx, cy, w, h` in model input pixels followed by
//! `C` class scores. Decoding picks the best class per anchor, drops anchors
//! below the confidence threshold, maps boxes back to frame pixels and runs
//! per-class non-max suppression.

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

const CXYWH_OFFSET: usize = 4;

/// Geometry and thresholds for one decode pass.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    /// Model input width / frame width.
    pub scale_x: f32,
    /// Model input height / frame height.
    pub scale_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a flattened `[4 + C, N]` prediction tensor into detections.
///
/// Output order is descending confidence.
pub fn decode_predictions(
    preds: &[f32],
    channels: usize,
    anchors: usize,
    class_names: &[String],
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    if channels <= CXYWH_OFFSET {
        return Err(anyhow!("prediction tensor has {} channels; expected > 4", channels));
    }
    if preds.len() != channels * anchors {
        return Err(anyhow!(
            "prediction tensor length {} does not match {}x{}",
            preds.len(),
            channels,
            anchors
        ));
    }
    let num_classes = channels - CXYWH_OFFSET;
    if class_names.len() < num_classes {
        return Err(anyhow!(
            "model predicts {} classes but only {} names are configured",
            num_classes,
            class_names.len()
        ));
    }
    if params.scale_x <= 0.0 || params.scale_y <= 0.0 {
        return Err(anyhow!("decode scale must be positive"));
    }

    let at = |channel: usize, anchor: usize| preds[channel * anchors + anchor];
    let max_x = params.frame_width as f32;
    let max_y = params.frame_height as f32;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut class_id = 0;
        let mut confidence = f32::NEG_INFINITY;
        for class in 0..num_classes {
            let score = at(CXYWH_OFFSET + class, anchor);
            if score > confidence {
                confidence = score;
                class_id = class;
            }
        }
        if !confidence.is_finite() || confidence < params.confidence_threshold {
            continue;
        }

        let cx = at(0, anchor) / params.scale_x;
        let cy = at(1, anchor) / params.scale_y;
        let w = at(2, anchor) / params.scale_x;
        let h = at(3, anchor) / params.scale_y;
        candidates.push(Candidate {
            class_id,
            confidence: confidence.min(1.0),
            x1: (cx - w / 2.0).clamp(0.0, max_x),
            y1: (cy - h / 2.0).clamp(0.0, max_y),
            x2: (cx + w / 2.0).clamp(0.0, max_x),
            y2: (cy + h / 2.0).clamp(0.0, max_y),
        });
    }

    non_max_suppression(&mut candidates, params.iou_threshold);

    Ok(candidates
        .into_iter()
        .map(|c| {
            Detection::new(
                class_names[c.class_id].clone(),
                c.confidence,
                BoundingBox::new(
                    c.x1.round() as i32,
                    c.y1.round() as i32,
                    c.x2.round() as i32,
                    c.y2.round() as i32,
                ),
            )
        })
        .collect())
}

/// Keep the highest-scoring box of every overlapping same-class cluster.
fn non_max_suppression(candidates: &mut Vec<Candidate>, iou_threshold: f32) {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..candidates.len() {
        let current = candidates[index];
        let suppressed = candidates[..kept]
            .iter()
            .any(|prev| prev.class_id == current.class_id && prev.iou(&current) > iou_threshold);
        if !suppressed {
            candidates.swap(kept, index);
            kept += 1;
        }
    }
    candidates.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["shirt".to_string(), "tie".to_string()]
    }

    fn params() -> DecodeParams {
        DecodeParams {
            scale_x: 0.5,
            scale_y: 0.5,
            frame_width: 1280,
            frame_height: 720,
            confidence_threshold: 0.3,
            iou_threshold: 0.45,
        }
    }

    /// Build a `[6, N]` tensor from per-anchor rows of (cx, cy, w, h, shirt, tie).
    fn tensor(rows: &[[f32; 6]]) -> Vec<f32> {
        let anchors = rows.len();
        let mut out = vec![0.0; 6 * anchors];
        for (anchor, row) in rows.iter().enumerate() {
            for (channel, value) in row.iter().enumerate() {
                out[channel * anchors + anchor] = *value;
            }
        }
        out
    }

    #[test]
    fn decodes_best_class_and_rescales_to_frame() -> Result<()> {
        let preds = tensor(&[[100.0, 100.0, 40.0, 20.0, 0.1, 0.8]]);
        let detections = decode_predictions(&preds, 6, 1, &names(), &params())?;

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "tie");
        assert!((detections[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(detections[0].bbox, BoundingBox::new(160, 180, 240, 220));
        Ok(())
    }

    #[test]
    fn drops_anchors_below_threshold() -> Result<()> {
        let preds = tensor(&[[10.0, 10.0, 4.0, 4.0, 0.2, 0.1]]);
        assert!(decode_predictions(&preds, 6, 1, &names(), &params())?.is_empty());
        Ok(())
    }

    #[test]
    fn suppresses_overlapping_boxes_of_same_class_only() -> Result<()> {
        let preds = tensor(&[
            [100.0, 100.0, 40.0, 40.0, 0.9, 0.0],
            [102.0, 101.0, 40.0, 40.0, 0.7, 0.0],
            [101.0, 100.0, 40.0, 40.0, 0.0, 0.6],
        ]);
        let detections = decode_predictions(&preds, 6, 3, &names(), &params())?;

        let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["shirt", "tie"]);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_tensor_shape() {
        let err = decode_predictions(&[0.0; 5], 6, 1, &names(), &params()).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn rejects_missing_class_names() {
        let preds = vec![0.0; 7];
        let err = decode_predictions(&preds, 7, 1, &names(), &params()).unwrap_err();
        assert!(err.to_string().contains("names are configured"));
    }
}
