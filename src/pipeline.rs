//! The inspection loop.
//!
//! One iteration: capture a frame, detect, classify against the label policy,
//! render the overlay, show it, then poll the keyboard once. A key press acts
//! on the frame that was just processed, so a manual upload always stores the
//! frame and top object the operator was looking at.
//!
//! The loop owns no devices. Every collaborator is borrowed, and the caller
//! releases them after `run` returns.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::classify::LabelPolicy;
use crate::detect::DetectorBackend;
use crate::display::FrameSink;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::keys::KeySource;
use crate::render::Renderer;
use crate::session::{Command, Mode, Session};
use crate::upload::FrameUploader;

/// How long each iteration waits for a key press.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The operator pressed the quit key.
    Quit,
    /// The stop flag was raised (Ctrl-C).
    Interrupted,
    /// The frame source stopped delivering frames.
    CaptureFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: u64,
    pub uploads_attempted: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    /// Upload requests refused because the frame held no allowed object.
    pub uploads_skipped: u64,
    /// Frames captured while the source reported itself unhealthy.
    pub unhealthy_frames: u64,
    pub final_mode: Mode,
    pub exit: LoopExit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Exit(LoopExit),
}

#[derive(Default)]
struct Counters {
    uploads_attempted: u64,
    uploads_succeeded: u64,
    uploads_failed: u64,
    uploads_skipped: u64,
    unhealthy_frames: u64,
}

pub struct Pipeline<'a> {
    source: &'a mut dyn FrameSource,
    detector: &'a mut dyn DetectorBackend,
    keys: &'a mut dyn KeySource,
    sink: &'a mut dyn FrameSink,
    uploader: &'a mut dyn FrameUploader,
    policy: LabelPolicy,
    renderer: Renderer,
    session: Session,
    poll_timeout: Duration,
    stop: Option<Arc<AtomicBool>>,
    counters: Counters,
    source_degraded: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a mut dyn FrameSource,
        detector: &'a mut dyn DetectorBackend,
        keys: &'a mut dyn KeySource,
        sink: &'a mut dyn FrameSink,
        uploader: &'a mut dyn FrameUploader,
    ) -> Self {
        Self {
            source,
            detector,
            keys,
            sink,
            uploader,
            policy: LabelPolicy::default(),
            renderer: Renderer::new(),
            session: Session::new(Mode::default()),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            stop: None,
            counters: Counters::default(),
            source_degraded: false,
        }
    }

    pub fn with_policy(mut self, policy: LabelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.session = Session::new(mode);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Flag checked at the top of every iteration; raising it ends the loop.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connect the frame source and loop until quit, interrupt, or capture failure.
    ///
    /// Only a failure to connect is returned as an error. Everything after that
    /// ends in a `SessionSummary`.
    pub fn run(mut self) -> Result<SessionSummary> {
        self.source.connect().context("connect frame source")?;
        log::info!(
            "inspection running: detector={}, mode={}",
            self.detector.name(),
            self.session.mode().status_text()
        );
        log::info!("keys: 'd' toggle mode, 's' upload, 'q' quit");

        let exit = loop {
            if let StepOutcome::Exit(exit) = self.step() {
                break exit;
            }
        };
        let summary = self.summary(exit);
        log::info!(
            "inspection stopped ({:?}) after {} frames",
            summary.exit,
            summary.frames
        );
        Ok(summary)
    }

    /// Process one frame and at most one key press.
    pub fn step(&mut self) -> StepOutcome {
        if self.stop_requested() {
            return StepOutcome::Exit(LoopExit::Interrupted);
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("frame capture failed: {:#}", err);
                return StepOutcome::Exit(LoopExit::CaptureFailed(format!("{:#}", err)));
            }
        };
        self.check_source_health(frame.index);

        let detections = self.detector.detect(&frame).unwrap_or_else(|err| {
            log::warn!("detector failed on frame {}: {:#}", frame.index, err);
            Vec::new()
        });
        let classification = self.session.process_frame(detections, &self.policy);
        log::debug!(
            "frame {}: {} detections, top={} {:.2} defect={}",
            frame.index,
            classification.entries.len(),
            classification.top.item_type,
            classification.top.confidence,
            classification.top.is_defect
        );

        let annotated = self
            .renderer
            .annotate(&frame, self.session.current(), self.session.mode());
        if let Err(err) = self.sink.show(&annotated) {
            log::warn!("display failed on frame {}: {:#}", frame.index, err);
        }

        let command = match self.keys.poll(self.poll_timeout) {
            Ok(command) => command,
            Err(err) => {
                log::warn!("keyboard poll failed: {:#}", err);
                None
            }
        };
        match command {
            Some(Command::Quit) => StepOutcome::Exit(LoopExit::Quit),
            Some(Command::ToggleMode) => {
                let mode = self.session.toggle_mode();
                log::info!("switched to {}", mode.status_text());
                StepOutcome::Continue
            }
            Some(Command::Upload) => {
                self.upload(&frame);
                StepOutcome::Continue
            }
            None => StepOutcome::Continue,
        }
    }

    fn upload(&mut self, frame: &Frame) {
        if !self.session.upload_allowed() {
            self.counters.uploads_skipped += 1;
            log::info!("upload skipped: no laundry item in frame {}", frame.index);
            return;
        }

        self.counters.uploads_attempted += 1;
        let top = self.session.current().top.clone();
        log::info!("uploading frame {} ({})", frame.index, top.item_type);
        match self.uploader.store(frame, &top) {
            Ok(record) => {
                self.counters.uploads_succeeded += 1;
                log::info!(
                    "upload succeeded: {} {:.2} defect={} -> {}",
                    record.item_type,
                    record.confidence,
                    record.is_defect,
                    record.image_url
                );
            }
            Err(err) => {
                self.counters.uploads_failed += 1;
                log::error!("upload failed: {:#}", err);
            }
        }
    }

    /// Warn on the transition to unhealthy, count every unhealthy frame.
    fn check_source_health(&mut self, frame_index: u64) {
        if self.source.is_healthy() {
            if self.source_degraded {
                log::info!("frame source healthy again at frame {}", frame_index);
                self.source_degraded = false;
            }
            return;
        }
        self.counters.unhealthy_frames += 1;
        if !self.source_degraded {
            log::warn!("frame source unhealthy at frame {}", frame_index);
            self.source_degraded = true;
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn summary(&self, exit: LoopExit) -> SessionSummary {
        SessionSummary {
            frames: self.session.frames(),
            uploads_attempted: self.counters.uploads_attempted,
            uploads_succeeded: self.counters.uploads_succeeded,
            uploads_failed: self.counters.uploads_failed,
            uploads_skipped: self.counters.uploads_skipped,
            unhealthy_frames: self.counters.unhealthy_frames,
            final_mode: self.session.mode(),
            exit,
        }
    }
}
