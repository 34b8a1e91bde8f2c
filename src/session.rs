//! Per-run session state.
//!
//! The session owns the display mode and the classification of the most recent
//! frame. Both are explicit fields threaded through the loop; the classifier
//! itself stays pure.

use crate::classify::{classify, FrameClassification, LabelPolicy};
use crate::detect::Detection;

/// Display mode. Starts in `Debug`; toggles freely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Draw and log every detection, including ignored ones.
    #[default]
    Debug,
    /// Draw only allowed detections.
    Filter,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Debug => Mode::Filter,
            Mode::Filter => Mode::Debug,
        }
    }

    pub fn is_debug(self) -> bool {
        matches!(self, Mode::Debug)
    }

    pub fn status_text(self) -> &'static str {
        match self {
            Mode::Debug => "DEBUG MODE (Show All)",
            Mode::Filter => "FILTER MODE (Laundry Only)",
        }
    }
}

/// Keyboard commands understood by the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleMode,
    Upload,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'q' => Some(Command::Quit),
            'd' => Some(Command::ToggleMode),
            's' => Some(Command::Upload),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    mode: Mode,
    current: FrameClassification,
    frames: u64,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Flip the mode and return the new value.
    pub fn toggle_mode(&mut self) -> Mode {
        self.mode = self.mode.toggled();
        self.mode
    }

    /// Classify a fresh frame's detections and make it the current frame.
    ///
    /// In debug mode every detection is echoed to the log, ignored ones included.
    pub fn process_frame(
        &mut self,
        detections: Vec<Detection>,
        policy: &LabelPolicy,
    ) -> &FrameClassification {
        if self.mode.is_debug() {
            for detection in &detections {
                log::info!(
                    "saw {} (confidence {:.2})",
                    detection.label,
                    detection.confidence
                );
            }
        }
        self.current = classify(detections, policy);
        self.frames += 1;
        &self.current
    }

    pub fn current(&self) -> &FrameClassification {
        &self.current
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// A manual upload proceeds when the frame holds an allowed object, or
    /// unconditionally in debug mode.
    pub fn upload_allowed(&self) -> bool {
        self.current.valid_object_found || self.mode.is_debug()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn dets() -> Vec<Detection> {
        vec![
            Detection::new("shirt", 0.9, BoundingBox::new(0, 0, 10, 10)),
            Detection::new("dog", 0.8, BoundingBox::new(5, 5, 20, 20)),
        ]
    }

    #[test]
    fn session_starts_in_debug_mode() {
        assert_eq!(Session::default().mode(), Mode::Debug);
    }

    #[test]
    fn double_toggle_restores_mode_and_keeps_classification() {
        let policy = LabelPolicy::default();
        let mut session = Session::default();
        let before = session.process_frame(dets(), &policy).clone();

        assert_eq!(session.toggle_mode(), Mode::Filter);
        let filtered = session.process_frame(dets(), &policy).clone();
        assert_eq!(session.toggle_mode(), Mode::Debug);
        let after = session.process_frame(dets(), &policy).clone();

        assert_eq!(before, filtered);
        assert_eq!(before, after);
        assert_eq!(session.frames(), 3);
    }

    #[test]
    fn upload_gate_follows_mode_when_nothing_allowed() {
        let policy = LabelPolicy::default();
        let mut session = Session::default();
        session.process_frame(
            vec![Detection::new("dog", 0.95, BoundingBox::default())],
            &policy,
        );
        assert!(session.upload_allowed());

        session.toggle_mode();
        assert!(!session.upload_allowed());

        session.process_frame(dets(), &policy);
        assert!(session.upload_allowed());
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('d'), Some(Command::ToggleMode));
        assert_eq!(Command::from_key('s'), Some(Command::Upload));
        assert_eq!(Command::from_key('x'), None);
    }
}
