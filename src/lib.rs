//! Laundry Sentry
//!
//! A single-station inspection loop for a laundry line: a camera looks at items
//! as they pass, an object detector labels what it sees, and the station
//! operator can push a snapshot plus its top finding to a remote store.
//!
//! # Architecture
//!
//! Each iteration is strictly sequential:
//!
//! 1. **Capture**: a `FrameSource` yields the next RGB frame.
//! 2. **Detect**: a `DetectorBackend` returns labeled, scored boxes.
//! 3. **Classify**: the pure `classify` function sorts detections into ignored,
//!    normal, and defect, and picks one top object (defects win).
//! 4. **Render**: boxes and a mode banner are drawn onto a copy of the frame.
//! 5. **Input**: at most one key press is handled (`q`, `d`, `s`).
//! 6. **Upload** (on `s`): the clean frame goes to object storage and one
//!    metadata row goes to the log table.
//!
//! # Module Structure
//!
//! - `frame`: captured frames and JPEG encoding
//! - `ingest`: frame sources (V4L2 cameras, image directories)
//! - `detect`: detector trait, YOLO decoding, stub and ONNX backends
//! - `classify`: label policy and top-object selection
//! - `session`: display mode and the current frame's classification
//! - `render`, `display`, `keys`: operator-facing I/O
//! - `upload`: remote store trait, Supabase client, in-memory store
//! - `pipeline`: the loop tying it together
//! - `config`: TOML + environment configuration
//!
//! # Features
//!
//! No feature is on by default, so a plain build has only the synthetic
//! `stub://` camera, image directories and the stub detector.
//!
//! - `camera-v4l2`: real V4L2 devices such as the default `/dev/video1`.
//! - `backend-tract`: the ONNX detector selected by the default
//!   `backend = "tract"`.
//!
//! Without them, run with `--camera stub://line` (or an image directory) and
//! `LAUNDRY_DETECTOR=stub`.

pub mod classify;
pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod keys;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod upload;

pub use classify::{
    classify, ClassifiedDetection, Decision, FrameClassification, LabelPolicy, TopObjectState,
};
pub use config::{AppConfig, BackendSettings};
pub use detect::{BoundingBox, Detection, DetectorBackend, StubBackend};
pub use display::{FrameSink, NullSink, PreviewFileSink};
pub use frame::Frame;
pub use ingest::{FrameSource, ImageDirConfig, ImageDirSource, V4l2Config, V4l2Source};
pub use keys::{KeySource, ScriptedKeys, TerminalKeys};
pub use pipeline::{LoopExit, Pipeline, SessionSummary};
pub use render::Renderer;
pub use session::{Command, Mode, Session};
pub use upload::{
    FrameUploader, InMemoryStore, RemoteStore, SupabaseStore, UploadRecord, Uploader,
};

#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
