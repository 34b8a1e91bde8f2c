//! Frame sources.
//!
//! - USB/V4L2 cameras (feature: camera-v4l2), with a synthetic `stub://` mode
//!   that is always available
//! - Directories of still images, replayed in name order
//!
//! A source is acquired once, yields frames until it fails, and releases its
//! device on drop. A capture error ends the inspection loop.

pub mod file;
#[cfg_attr(not(feature = "camera-v4l2"), allow(dead_code))]
mod normalize;
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{ImageDirConfig, ImageDirSource};
pub use v4l2::{V4l2Config, V4l2Source};

pub trait FrameSource {
    /// Acquire the underlying device. Called once before the first frame.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool {
        true
    }
}
