//! Detection classification.
//!
//! Every detection in a frame is sorted into one of three buckets against a
//! [`LabelPolicy`]: ignored (label not allowed), normal, or defect. The frame is
//! then reduced to a single [`TopObjectState`]:
//!
//! - a defect detection always takes the top slot, whatever its confidence;
//!   among several defects the last one scanned wins;
//! - a normal detection takes the top slot only while no defect holds it, so
//!   the last normal detection wins when the frame has no defect.
//!
//! Classification is a pure function of the current frame's detections. Nothing
//! carries over between frames.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::detect::Detection;

pub const UNKNOWN_ITEM_TYPE: &str = "unknown";

/// Labels drawn by default, as shipped with the laundry station.
pub const DEFAULT_ALLOWED_LABELS: [&str; 11] = [
    "tie",
    "scissors",
    "backpack",
    "handbag",
    "suitcase",
    "umbrella",
    "teddy bear",
    "stain",
    "shirt",
    "pants",
    "dress",
];

/// Allowed labels that flag a problem with the item.
pub const DEFAULT_DEFECT_LABELS: [&str; 3] = ["tie", "scissors", "stain"];

/// Allowed and defect label sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelPolicy {
    allowed: BTreeSet<String>,
    defect: BTreeSet<String>,
}

impl LabelPolicy {
    /// Build a policy. Every defect label must also be allowed.
    pub fn new<A, D>(allowed: A, defect: D) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let allowed: BTreeSet<String> = allowed.into_iter().map(Into::into).collect();
        let defect: BTreeSet<String> = defect.into_iter().map(Into::into).collect();
        if allowed.is_empty() {
            return Err(anyhow!("allowed label set must not be empty"));
        }
        let stray: Vec<&str> = defect
            .difference(&allowed)
            .map(String::as_str)
            .collect();
        if !stray.is_empty() {
            return Err(anyhow!(
                "defect labels must also be allowed; not allowed: {}",
                stray.join(", ")
            ));
        }
        Ok(Self { allowed, defect })
    }

    pub fn is_allowed(&self, label: &str) -> bool {
        self.allowed.contains(label)
    }

    pub fn is_defect(&self, label: &str) -> bool {
        self.defect.contains(label)
    }

    pub fn decide(&self, label: &str) -> Decision {
        if !self.is_allowed(label) {
            Decision::Ignored
        } else if self.is_defect(label) {
            Decision::Defect
        } else {
            Decision::Normal
        }
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_LABELS.iter().map(|l| l.to_string()).collect(),
            defect: DEFAULT_DEFECT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Per-detection outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Ignored,
    Normal,
    Defect,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Decision::Ignored)
    }
}

/// The single representative result for a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopObjectState {
    pub item_type: String,
    pub confidence: f32,
    pub is_defect: bool,
}

impl Default for TopObjectState {
    fn default() -> Self {
        Self {
            item_type: UNKNOWN_ITEM_TYPE.to_string(),
            confidence: 0.0,
            is_defect: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub decision: Decision,
}

/// Everything the renderer and the upload gate need about one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameClassification {
    pub entries: Vec<ClassifiedDetection>,
    pub top: TopObjectState,
    /// True when at least one detection carried an allowed label.
    pub valid_object_found: bool,
}

impl FrameClassification {
    pub fn allowed(&self) -> impl Iterator<Item = &ClassifiedDetection> {
        self.entries.iter().filter(|e| e.decision.is_allowed())
    }

    pub fn ignored(&self) -> impl Iterator<Item = &ClassifiedDetection> {
        self.entries.iter().filter(|e| !e.decision.is_allowed())
    }
}

/// Classify one frame's detections, in detector order.
pub fn classify(detections: Vec<Detection>, policy: &LabelPolicy) -> FrameClassification {
    let mut top = TopObjectState::default();
    let mut valid_object_found = false;
    let mut entries = Vec::with_capacity(detections.len());

    for detection in detections {
        let decision = policy.decide(&detection.label);
        match decision {
            Decision::Ignored => {}
            Decision::Defect => {
                valid_object_found = true;
                top = TopObjectState {
                    item_type: detection.label.clone(),
                    confidence: detection.confidence,
                    is_defect: true,
                };
            }
            Decision::Normal => {
                valid_object_found = true;
                if !top.is_defect {
                    top = TopObjectState {
                        item_type: detection.label.clone(),
                        confidence: detection.confidence,
                        is_defect: false,
                    };
                }
            }
        }
        entries.push(ClassifiedDetection {
            detection,
            decision,
        });
    }

    FrameClassification {
        entries,
        top,
        valid_object_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(10, 10, 50, 50))
    }

    #[test]
    fn defect_overrides_higher_confidence_neighbours() {
        let result = classify(
            vec![det("shirt", 0.9), det("tie", 0.4), det("pants", 0.8)],
            &LabelPolicy::default(),
        );
        assert_eq!(
            result.top,
            TopObjectState {
                item_type: "tie".to_string(),
                confidence: 0.4,
                is_defect: true,
            }
        );
        assert!(result.valid_object_found);
    }

    #[test]
    fn defect_wins_even_when_last() {
        let result = classify(
            vec![det("shirt", 0.9), det("pants", 0.8), det("stain", 0.3)],
            &LabelPolicy::default(),
        );
        assert_eq!(
            result.top,
            TopObjectState {
                item_type: "stain".to_string(),
                confidence: 0.3,
                is_defect: true,
            }
        );
        assert_eq!(result.entries.len(), 3);
        assert!(result.valid_object_found);
    }

    #[test]
    fn last_normal_detection_wins_without_defect() {
        let result = classify(
            vec![det("shirt", 0.9), det("pants", 0.5)],
            &LabelPolicy::default(),
        );
        assert_eq!(result.top.item_type, "pants");
        assert_eq!(result.top.confidence, 0.5);
        assert!(!result.top.is_defect);
    }

    #[test]
    fn later_defect_replaces_earlier_defect() {
        let result = classify(
            vec![det("tie", 0.4), det("shirt", 0.9), det("scissors", 0.35)],
            &LabelPolicy::default(),
        );
        assert_eq!(result.top.item_type, "scissors");
        assert!(result.top.is_defect);
    }

    #[test]
    fn ignored_labels_leave_default_state() {
        let result = classify(vec![det("dog", 0.95)], &LabelPolicy::default());
        assert!(!result.valid_object_found);
        assert_eq!(result.top, TopObjectState::default());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].decision, Decision::Ignored);
        assert_eq!(result.ignored().count(), 1);
        assert_eq!(result.allowed().count(), 0);
    }

    #[test]
    fn empty_frame_leaves_default_state() {
        let result = classify(Vec::new(), &LabelPolicy::default());
        assert!(!result.valid_object_found);
        assert_eq!(result.top, TopObjectState::default());
        assert_eq!(result.top.item_type, UNKNOWN_ITEM_TYPE);
    }

    #[test]
    fn entries_keep_detector_order() {
        let result = classify(
            vec![det("dog", 0.9), det("stain", 0.3), det("dress", 0.6)],
            &LabelPolicy::default(),
        );
        let decisions: Vec<Decision> = result.entries.iter().map(|e| e.decision).collect();
        assert_eq!(
            decisions,
            vec![Decision::Ignored, Decision::Defect, Decision::Normal]
        );
    }

    #[test]
    fn policy_rejects_defect_outside_allowed() {
        let err = LabelPolicy::new(["shirt"], ["stain"]).unwrap_err();
        assert!(err.to_string().contains("stain"));
    }

    #[test]
    fn policy_rejects_empty_allowed() {
        assert!(LabelPolicy::new(Vec::<String>::new(), Vec::<String>::new()).is_err());
    }

    #[test]
    fn default_policy_matches_station_lists() {
        let policy = LabelPolicy::default();
        assert_eq!(policy.allowed().count(), 11);
        assert_eq!(policy.decide("teddy bear"), Decision::Normal);
        assert_eq!(policy.decide("stain"), Decision::Defect);
        assert_eq!(policy.decide("person"), Decision::Ignored);
    }
}
