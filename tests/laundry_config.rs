use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use laundry_sentry::config::AppConfig;
use laundry_sentry::{V4l2Config, V4l2Source};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SUPABASE_URL",
        "SUPABASE_KEY",
        "LAUNDRY_CONFIG",
        "LAUNDRY_CAMERA",
        "LAUNDRY_MODEL",
        "LAUNDRY_DETECTOR",
        "LAUNDRY_CONF_THRESHOLD",
        "LAUNDRY_ALLOWED",
        "LAUNDRY_DEFECT",
        "LAUNDRY_PREVIEW",
    ] {
        std::env::remove_var(key);
    }
}

fn set_credentials() {
    std::env::set_var("SUPABASE_URL", "https://abc.supabase.co");
    std::env::set_var("SUPABASE_KEY", "anon-key");
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn missing_endpoint_is_fatal() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("SUPABASE_KEY", "anon-key");

    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("SUPABASE_URL"));

    clear_env();
}

#[test]
fn blank_key_is_fatal() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("SUPABASE_URL", "https://abc.supabase.co");
    std::env::set_var("SUPABASE_KEY", "   ");

    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("SUPABASE_KEY"));

    clear_env();
}

#[test]
fn missing_credentials_win_over_a_broken_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let file = write_config("this is not toml = [");
    std::env::set_var("LAUNDRY_CONFIG", file.path());

    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("SUPABASE_URL"));

    clear_env();
}

#[test]
fn defaults_reproduce_the_station_setup() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "/dev/video1");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.model_path, PathBuf::from("yolov8n.onnx"));
    assert!((cfg.detector.confidence_threshold - 0.3).abs() < f32::EPSILON);
    assert_eq!(cfg.labels.allowed.len(), 11);
    assert_eq!(cfg.labels.defect, vec!["tie", "scissors", "stain"]);
    assert_eq!(cfg.backend.bucket, "laundry-images");
    assert_eq!(cfg.backend.table, "laundry_logs");
    assert_eq!(cfg.backend.filename_prefix, "laundry");

    let policy = cfg.labels.policy().expect("policy");
    assert!(policy.is_defect("stain"));
    assert!(policy.is_allowed("teddy bear"));
    assert!(!policy.is_allowed("person"));

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();

    let file = write_config(
        r#"
[camera]
device = "stub://line-2"
width = 640
height = 480

[detector]
backend = "stub"
confidence_threshold = 0.5

[labels]
allowed = ["shirt", "pants", "stain"]
defect = ["stain"]

[backend]
bucket = "line2-images"
timeout_secs = 3

[preview]
path = "/tmp/line2.jpg"
"#,
    );
    std::env::set_var("LAUNDRY_CONFIG", file.path());
    std::env::set_var("LAUNDRY_CONF_THRESHOLD", "0.35");
    std::env::set_var("LAUNDRY_PREVIEW", "/tmp/override.jpg");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://line-2");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!(cfg.detector.backend, "stub");
    assert!((cfg.detector.confidence_threshold - 0.35).abs() < f32::EPSILON);
    assert_eq!(cfg.labels.allowed, vec!["shirt", "pants", "stain"]);
    assert_eq!(cfg.backend.bucket, "line2-images");
    assert_eq!(cfg.backend.table, "laundry_logs");
    assert_eq!(cfg.backend.timeout, Duration::from_secs(3));
    assert_eq!(cfg.preview.path, PathBuf::from("/tmp/override.jpg"));

    clear_env();
}

#[test]
fn env_label_lists_replace_file_lists() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();
    std::env::set_var("LAUNDRY_ALLOWED", "shirt, socks ,stain");
    std::env::set_var("LAUNDRY_DEFECT", "stain");

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.labels.allowed, vec!["shirt", "socks", "stain"]);
    assert_eq!(cfg.labels.defect, vec!["stain"]);

    clear_env();
}

#[test]
fn empty_label_overrides_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();

    std::env::set_var("LAUNDRY_ALLOWED", " , ,");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("LAUNDRY_ALLOWED"));

    std::env::remove_var("LAUNDRY_ALLOWED");
    std::env::set_var("LAUNDRY_DEFECT", ",");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("LAUNDRY_DEFECT"));

    clear_env();
}

#[test]
fn stub_camera_and_detector_run_without_features() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();
    std::env::set_var("LAUNDRY_CAMERA", "stub://line");
    std::env::set_var("LAUNDRY_DETECTOR", "stub");

    let cfg = AppConfig::load().expect("load config");
    let source = V4l2Source::new(V4l2Config::from(&cfg.camera));
    assert!(source.is_ok());
    assert_eq!(cfg.detector.backend, "stub");

    clear_env();
}

#[test]
fn defect_labels_must_be_allowed() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();
    std::env::set_var("LAUNDRY_ALLOWED", "shirt,pants");
    std::env::set_var("LAUNDRY_DEFECT", "stain");

    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("stain"));

    clear_env();
}

#[test]
fn rejects_unknown_keys_and_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_credentials();

    let unknown = write_config("[camera]\nzoom = 2\n");
    assert!(AppConfig::load_from(Some(unknown.path())).is_err());

    let bad_threshold = write_config("[detector]\nconfidence_threshold = 1.5\n");
    assert!(AppConfig::load_from(Some(bad_threshold.path())).is_err());

    let bad_backend = write_config("[detector]\nbackend = \"opencv\"\n");
    assert!(AppConfig::load_from(Some(bad_backend.path())).is_err());

    std::env::set_var("SUPABASE_URL", "not a url");
    assert!(AppConfig::load_from(None).is_err());

    clear_env();
}
