//! Display sinks for annotated frames.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::PathBuf;

use crate::frame::encode_jpeg;

pub trait FrameSink {
    fn show(&mut self, annotated: &RgbImage) -> Result<()>;
}

/// Rewrites the latest annotated frame as a JPEG at a fixed path.
///
/// Each write goes to a sibling temp file first and is renamed into place, so a
/// viewer polling the path never reads a half-written image.
pub struct PreviewFileSink {
    path: PathBuf,
    tmp_path: PathBuf,
    frames_written: u64,
}

impl PreviewFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create preview directory {}", parent.display()))?;
        }
        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "preview".into());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        log::info!("preview frames written to {}", path.display());
        Ok(Self {
            path,
            tmp_path,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for PreviewFileSink {
    fn show(&mut self, annotated: &RgbImage) -> Result<()> {
        let jpeg = encode_jpeg(annotated)?;
        std::fs::write(&self.tmp_path, jpeg)
            .with_context(|| format!("write preview {}", self.tmp_path.display()))?;
        std::fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        self.frames_written += 1;
        Ok(())
    }
}

impl Drop for PreviewFileSink {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

/// Discards frames. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct NullSink {
    shown: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl FrameSink for NullSink {
    fn show(&mut self, _annotated: &RgbImage) -> Result<()> {
        self.shown += 1;
        Ok(())
    }
}
