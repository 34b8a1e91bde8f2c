//! V4L2 frame source.
//!
//! `V4l2Source` captures from a local device node (e.g. /dev/video1) and hands
//! out RGB `Frame`s. Device paths starting with `stub://` select a synthetic
//! generator that needs no hardware; real devices require the `camera-v4l2`
//! feature.
//!
//! The device is opened by `connect` and released when the source is dropped.

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::config::CameraSettings;
use crate::frame::Frame;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video1") or `stub://<name>`.
    pub device: String,
    /// Requested frame rate. Zero leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width. The driver may pick another size.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video1".to_string(),
            target_fps: 30,
            width: 1280,
            height: 720,
        }
    }
}

impl From<&CameraSettings> for V4l2Config {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticV4l2Source),
    #[cfg(feature = "camera-v4l2")]
    Device(device::DeviceV4l2Source),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                config.width,
                config.height
            ));
        }
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticV4l2Source::new(config)),
            });
        }
        Self::device(config)
    }

    #[cfg(feature = "camera-v4l2")]
    fn device(config: V4l2Config) -> Result<Self> {
        Ok(Self {
            backend: V4l2Backend::Device(device::DeviceV4l2Source::new(config)),
        })
    }

    #[cfg(not(feature = "camera-v4l2"))]
    fn device(config: V4l2Config) -> Result<Self> {
        Err(anyhow!(
            "camera {} requires the camera-v4l2 feature (use stub:// for a synthetic camera)",
            config.device
        ))
    }

    /// Frames captured since `connect`.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "camera-v4l2")]
            V4l2Backend::Device(source) => source.frame_count(),
        }
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.connect(),
            #[cfg(feature = "camera-v4l2")]
            V4l2Backend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            V4l2Backend::Device(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            V4l2Backend::Synthetic(_) => true,
            #[cfg(feature = "camera-v4l2")]
            V4l2Backend::Device(source) => source.is_healthy(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticV4l2Source {
    config: V4l2Config,
    connected: bool,
    frame_count: u64,
}

impl SyntheticV4l2Source {
    fn new(config: V4l2Config) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "V4l2Source: connected to {} (synthetic, {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        self.frame_count += 1;
        Frame::from_rgb(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    /// Diagonal gradient that drifts one step per frame.
    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as u64, self.config.height as u64);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let base = x + y + self.frame_count;
                pixels.push((base % 256) as u8);
                pixels.push(((base / 2) % 256) as u8);
                pixels.push(((x * 255) / w.max(1)) as u8);
            }
        }
        pixels
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;
    use std::time::{Duration, Instant};

    use super::V4l2Config;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceV4l2Source {
        config: V4l2Config,
        state: Option<DeviceV4l2State>,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
        active_width: u32,
        active_height: u32,
        format: PixelFormat,
    }

    #[self_referencing]
    struct DeviceV4l2State {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceV4l2Source {
        pub(super) fn new(config: V4l2Config) -> Self {
            Self {
                active_width: config.width,
                active_height: config.height,
                config,
                state: None,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
                format: PixelFormat::Rgb24,
            }
        }

        pub(super) fn frame_count(&self) -> u64 {
            self.frame_count
        }

        pub(super) fn connect(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .with_context(|| format!("open v4l2 device {}", self.config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "V4l2Source: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
                anyhow!(
                    "v4l2 device {} delivers unsupported pixel format {}",
                    self.config.device,
                    format.fourcc
                )
            })?;

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "V4l2Source: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            self.active_width = format.width;
            self.active_height = format.height;
            self.last_error = None;

            let state = DeviceV4l2StateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;
            self.state = Some(state);

            log::info!(
                "V4l2Source: connected to {} ({}x{}, {:?})",
                self.config.device,
                self.active_width,
                self.active_height,
                self.format
            );
            Ok(())
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let state = self.state.as_mut().context("v4l2 device not connected")?;
            let (buf, _meta) = state
                .with_mut(|fields| fields.stream.next())
                .map_err(|err| {
                    self.last_error = Some(err.to_string());
                    anyhow::Error::new(err).context("capture v4l2 frame")
                })?;

            let (pixels, width, height) =
                normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;

            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());
            Frame::from_rgb(pixels, width, height, self.frame_count)
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}
