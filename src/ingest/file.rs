//! Still-image directory source.
//!
//! `ImageDirSource` replays the `.jpg`/`.jpeg`/`.png` files of a local
//! directory in file-name order, one frame per file. When the last image has
//! been delivered the next capture fails, which ends the inspection loop the
//! same way an unplugged camera does.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Clone, Debug, Default)]
pub struct ImageDirConfig {
    /// Local directory holding the images.
    pub path: PathBuf,
}

pub struct ImageDirSource {
    config: ImageDirConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    connected: bool,
}

impl ImageDirSource {
    pub fn new(config: ImageDirConfig) -> Result<Self> {
        if !is_local_path(&config.path) {
            return Err(anyhow!(
                "image directory must be a local path, got {}",
                config.path.display()
            ));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            cursor: 0,
            connected: false,
        })
    }

    /// Images not yet delivered.
    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.cursor)
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.config.path)
            .with_context(|| format!("read image directory {}", self.config.path.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("list {}", self.config.path.display()))?
                .path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!(
                "no jpg or png images in {}",
                self.config.path.display()
            ));
        }
        files.sort();

        log::info!(
            "ImageDirSource: connected to {} ({} images)",
            self.config.path.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!(
                "image directory {} not connected",
                self.config.path.display()
            ));
        }
        let path = self.files.get(self.cursor).ok_or_else(|| {
            anyhow!(
                "image directory {} exhausted after {} frames",
                self.config.path.display(),
                self.files.len()
            )
        })?;
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .into_rgb8();
        self.cursor += 1;
        Ok(Frame::new(image, self.cursor as u64))
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.remaining() > 0
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn is_local_path(path: &Path) -> bool {
    let text = path.to_string_lossy();
    !text.trim().is_empty() && !text.contains("://")
}
