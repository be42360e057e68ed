use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use plate_stream::config::ServerConfig;
use plate_stream::CorrectionMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PLATE_CONFIG",
        "PLATE_LISTEN_ADDR",
        "PLATE_DB_PATH",
        "PLATE_ARTIFACT_DIR",
        "PLATE_WORKERS",
        "PLATE_IDLE_TIMEOUT_SECS",
        "PLATE_DEDUP_WINDOW_SECS",
        "PLATE_CORRECTION_MODE",
        "PLATE_DETECTOR_MODEL",
        "PLATE_RECOGNIZER_MODEL",
        "PLATE_DETECTOR_THRESHOLD",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "listen_addr": "0.0.0.0:6000",
        "workers": 4,
        "backlog": 8,
        "idle_timeout_secs": 10,
        "storage": {
            "db_path": "plates_prod.db",
            "artifact_dir": "/var/lib/plates"
        },
        "dedup": { "window_secs": 12 },
        "correction_mode": "sequential",
        "codec": { "width": 640, "height": 480, "quality": 70 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PLATE_CONFIG", file.path());
    std::env::set_var("PLATE_WORKERS", "3");
    std::env::set_var("PLATE_DEDUP_WINDOW_SECS", "7");
    std::env::set_var("PLATE_CORRECTION_MODE", "Positional");

    let cfg = ServerConfig::load().expect("load config");

    assert_eq!(cfg.listen_addr, "0.0.0.0:6000");
    assert_eq!(cfg.workers, 3);
    assert_eq!(cfg.backlog, 8);
    assert_eq!(cfg.idle_timeout, Duration::from_secs(10));
    assert_eq!(cfg.db_path, "plates_prod.db");
    assert_eq!(cfg.artifact_dir.to_str(), Some("/var/lib/plates"));
    assert_eq!(cfg.dedup_window, Duration::from_secs(7));
    assert_eq!(cfg.correction_mode, CorrectionMode::Positional);
    assert_eq!((cfg.codec.width, cfg.codec.height, cfg.codec.quality), (640, 480, 70));

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServerConfig::load().expect("load config");
    assert_eq!(cfg.workers, 2);
    assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
    assert_eq!(cfg.dedup_window, Duration::from_secs(5));
    assert!(cfg.models.detector.is_none());
    assert!(cfg.models.recognizer.is_none());
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PLATE_WORKERS", "0");
    assert!(ServerConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_IDLE_TIMEOUT_SECS", "soon");
    assert!(ServerConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_CORRECTION_MODE", "aggressive");
    assert!(ServerConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_DETECTOR_THRESHOLD", "1.2");
    assert!(ServerConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_DETECTOR_THRESHOLD", "0.6");
    let cfg = ServerConfig::load().unwrap();
    assert_eq!(cfg.models.detector_threshold, 0.6);
    clear_env();
}
