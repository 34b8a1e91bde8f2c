use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{LabelPolicy, DEFAULT_ALLOWED_LABELS, DEFAULT_DEFECT_LABELS};

pub const ENDPOINT_ENV: &str = "SUPABASE_URL";
pub const KEY_ENV: &str = "SUPABASE_KEY";
pub const CONFIG_ENV: &str = "LAUNDRY_CONFIG";

const DEFAULT_CAMERA_DEVICE: &str = "/dev/video1";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_DETECTOR_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONF_THRESHOLD: f32 = 0.3;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_BUCKET: &str = "laundry-images";
const DEFAULT_TABLE: &str = "laundry_logs";
const DEFAULT_FILENAME_PREFIX: &str = "laundry";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PREVIEW_PATH: &str = "laundry_preview.jpg";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    labels: Option<LabelsConfigFile>,
    backend: Option<BackendConfigFile>,
    preview: Option<PreviewConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    class_names_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LabelsConfigFile {
    allowed: Option<Vec<String>>,
    defect: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BackendConfigFile {
    bucket: Option<String>,
    table: Option<String>,
    filename_prefix: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreviewConfigFile {
    path: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub labels: LabelSettings,
    pub backend: BackendSettings,
    pub preview: PreviewSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `tract` (ONNX model) or `stub` (no detections).
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_names_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LabelSettings {
    pub allowed: Vec<String>,
    pub defect: Vec<String>,
}

impl LabelSettings {
    pub fn policy(&self) -> Result<LabelPolicy> {
        LabelPolicy::new(self.allowed.iter().cloned(), self.defect.iter().cloned())
    }
}

#[derive(Clone)]
pub struct BackendSettings {
    pub endpoint: String,
    pub key: String,
    pub bucket: String,
    pub table: String,
    pub filename_prefix: String,
    pub timeout: Duration,
}

impl fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSettings")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("table", &self.table)
            .field("filename_prefix", &self.filename_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendSettings {
    /// Endpoint and key from the environment; everything else defaulted.
    pub fn from_env() -> Result<Self> {
        let (endpoint, key) = required_credentials()?;
        let settings = Self {
            endpoint,
            key,
            bucket: DEFAULT_BUCKET.to_string(),
            table: DEFAULT_TABLE.to_string(),
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| anyhow!("{} is not a valid URL: {}", ENDPOINT_ENV, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "{} must use http or https, got '{}'",
                ENDPOINT_ENV,
                url.scheme()
            ));
        }
        if self.bucket.trim().is_empty() || self.table.trim().is_empty() {
            return Err(anyhow!("backend bucket and table must not be empty"));
        }
        if self.filename_prefix.trim().is_empty() || self.filename_prefix.contains('/') {
            return Err(anyhow!(
                "backend filename_prefix must be non-empty and contain no '/'"
            ));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("backend timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub path: PathBuf,
    pub font_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the file named by `LAUNDRY_CONFIG` (if any), then the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit optional file, then the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let (endpoint, key) = required_credentials()?;
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg, endpoint, key);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile, endpoint: String, key: String) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let labels = file.labels.unwrap_or_default();
        let backend = file.backend.unwrap_or_default();
        let preview = file.preview.unwrap_or_default();

        Self {
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONF_THRESHOLD),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                class_names_path: detector.class_names_path,
            },
            labels: LabelSettings {
                allowed: labels.allowed.unwrap_or_else(|| {
                    DEFAULT_ALLOWED_LABELS.iter().map(|l| l.to_string()).collect()
                }),
                defect: labels.defect.unwrap_or_else(|| {
                    DEFAULT_DEFECT_LABELS.iter().map(|l| l.to_string()).collect()
                }),
            },
            backend: BackendSettings {
                endpoint,
                key,
                bucket: backend.bucket.unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                table: backend.table.unwrap_or_else(|| DEFAULT_TABLE.to_string()),
                filename_prefix: backend
                    .filename_prefix
                    .unwrap_or_else(|| DEFAULT_FILENAME_PREFIX.to_string()),
                timeout: Duration::from_secs(backend.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
            preview: PreviewSettings {
                path: preview
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH)),
                font_path: preview.font_path,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("LAUNDRY_CAMERA") {
            self.camera.device = device;
        }
        if let Some(backend) = non_empty_env("LAUNDRY_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(model) = non_empty_env("LAUNDRY_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(threshold) = non_empty_env("LAUNDRY_CONF_THRESHOLD") {
            self.detector.confidence_threshold = threshold.parse().map_err(|_| {
                anyhow!("LAUNDRY_CONF_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Some(allowed) = non_empty_env("LAUNDRY_ALLOWED") {
            self.labels.allowed = label_list("LAUNDRY_ALLOWED", &allowed)?;
        }
        if let Some(defect) = non_empty_env("LAUNDRY_DEFECT") {
            self.labels.defect = label_list("LAUNDRY_DEFECT", &defect)?;
        }
        if let Some(preview) = non_empty_env("LAUNDRY_PREVIEW") {
            self.preview.path = PathBuf::from(preview);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if !matches!(self.detector.backend.as_str(), "tract" | "stub") {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected 'tract' or 'stub'",
                self.detector.backend
            ));
        }
        if self.detector.input_size == 0 || self.detector.input_size % 32 != 0 {
            return Err(anyhow!("detector input_size must be a positive multiple of 32"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within 0..=1", name));
            }
        }
        self.labels.policy()?;
        self.backend.validate()?;
        Ok(())
    }
}

fn required_credentials() -> Result<(String, String)> {
    let endpoint = non_empty_env(ENDPOINT_ENV)
        .ok_or_else(|| anyhow!("{} must be set", ENDPOINT_ENV))?;
    let key = non_empty_env(KEY_ENV).ok_or_else(|| anyhow!("{} must be set", KEY_ENV))?;
    Ok((endpoint.trim().to_string(), key.trim().to_string()))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// A set-but-empty list like `","` is a mistake, not a request to clear it.
fn label_list(var: &str, value: &str) -> Result<Vec<String>> {
    let labels = split_csv(value);
    if labels.is_empty() {
        return Err(anyhow!("{} must list at least one label", var));
    }
    Ok(labels)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
