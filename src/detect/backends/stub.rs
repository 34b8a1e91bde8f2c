use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for testing. Replays scripted detection sets, one per frame,
/// cycling back to the first set after the last one.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubBackend {
    /// A backend that never detects anything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let detections = if self.script.is_empty() {
            Vec::new()
        } else {
            self.script[self.cursor % self.script.len()].clone()
        };
        self.cursor += 1;
        Ok(detections)
    }
}
