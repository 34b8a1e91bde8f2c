//! laundry_sentry - operator station for the laundry inspection line
//!
//! This binary:
//! 1. Loads configuration (TOML file + environment, Supabase credentials required)
//! 2. Opens the camera (or an image directory) and the detector
//! 3. Runs the inspection loop until 'q', Ctrl-C, or the camera stops
//! 4. Logs a session summary on the way out

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use laundry_sentry::config::{AppConfig, DetectorSettings};
#[cfg(feature = "backend-tract")]
use laundry_sentry::detect::labels::{coco_class_names, load_class_names};
use laundry_sentry::{
    DetectorBackend, FrameSink, FrameSource, ImageDirConfig, ImageDirSource, LoopExit, Mode,
    NullSink, Pipeline, PreviewFileSink, Renderer, StubBackend, SupabaseStore, TerminalKeys,
    Uploader, V4l2Config, V4l2Source,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Laundry inspection station: detect items and defects, upload snapshots on demand"
)]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "LAUNDRY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera device, `stub://<name>` for a synthetic camera, or a directory of images.
    /// Real `/dev/video*` devices need a build with `--features camera-v4l2`.
    #[arg(long, value_name = "DEVICE")]
    camera: Option<String>,

    /// Do not write preview frames.
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    // Raw terminal mode disables newline translation.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            write!(
                buf,
                "[{} {:<5} {}] {}\r\n",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let mut cfg = AppConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        cfg.camera.device = camera;
    }
    log::info!("configuration: {:?}", cfg);

    let policy = cfg.labels.policy()?;
    let mut detector = build_detector(&cfg.detector)?;
    detector.warm_up().context("detector warm-up")?;

    let mut source = build_source(&cfg.camera.device, V4l2Config::from(&cfg.camera))?;
    let renderer = match &cfg.preview.font_path {
        Some(path) => Renderer::with_font_file(path)?,
        None => Renderer::new(),
    };
    if !renderer.has_font() {
        log::info!("no preview font configured; overlays are drawn without text");
    }
    let mut sink: Box<dyn FrameSink> = if args.headless {
        Box::new(NullSink::new())
    } else {
        Box::new(PreviewFileSink::new(&cfg.preview.path)?)
    };
    let store = SupabaseStore::new(&cfg.backend)?;
    let mut uploader = Uploader::new(store, cfg.backend.filename_prefix.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let mut keys = TerminalKeys::new()?;
    let summary = Pipeline::new(
        source.as_mut(),
        detector.as_mut(),
        &mut keys,
        sink.as_mut(),
        &mut uploader,
    )
    .with_policy(policy)
    .with_renderer(renderer)
    .with_mode(Mode::Debug)
    .with_stop_flag(stop)
    .run();
    drop(keys);
    let summary = summary?;

    log::info!(
        "session: {} frames ({} unhealthy), {} uploads ({} ok, {} failed, {} skipped), final mode {}",
        summary.frames,
        summary.unhealthy_frames,
        summary.uploads_attempted,
        summary.uploads_succeeded,
        summary.uploads_failed,
        summary.uploads_skipped,
        summary.final_mode.status_text()
    );
    if summary.unhealthy_frames > 0 {
        log::warn!(
            "frame source was unhealthy for {} of {} frames",
            summary.unhealthy_frames,
            summary.frames
        );
    }
    if let LoopExit::CaptureFailed(reason) = &summary.exit {
        log::warn!("camera stopped: {}", reason);
    }
    Ok(())
}

fn build_source(device: &str, config: V4l2Config) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(device);
    if path.is_dir() {
        log::info!("replaying images from {}", path.display());
        return Ok(Box::new(ImageDirSource::new(ImageDirConfig {
            path: path.to_path_buf(),
        })?));
    }
    Ok(Box::new(V4l2Source::new(config)?))
}

fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => {
            log::warn!("stub detector selected; no objects will be detected");
            Ok(Box::new(StubBackend::new()))
        }
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let class_names = match &settings.class_names_path {
        Some(path) => load_class_names(path)?,
        None => coco_class_names(),
    };
    log::info!(
        "loading {} ({}x{}, {} classes)",
        settings.model_path.display(),
        settings.input_size,
        settings.input_size,
        class_names.len()
    );
    let backend = laundry_sentry::TractBackend::new(
        &settings.model_path,
        settings.input_size,
        class_names,
    )?
    .with_threshold(settings.confidence_threshold)
    .with_iou_threshold(settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "detector backend 'tract' needs the backend-tract feature (model {}); \
         rebuild with --features backend-tract or set LAUNDRY_DETECTOR=stub",
        settings.model_path.display()
    ))
}
