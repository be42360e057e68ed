use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::{FrameCodec, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_JPEG_QUALITY};
use crate::plate::CorrectionMode;
use crate::recognize::ctc::PLATE_CHARSET;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_DB_PATH: &str = "plates.db";
const DEFAULT_ARTIFACT_DIR: &str = "plate_artifacts";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_BACKLOG: usize = 16;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 5;
const DEFAULT_DETECTOR_INPUT_SIZE: u32 = 640;
const DEFAULT_RECOGNIZER_WIDTH: u32 = 128;
const DEFAULT_RECOGNIZER_HEIGHT: u32 = 32;
const DEFAULT_DETECTOR_THRESHOLD: f32 = 0.25;

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    listen_addr: Option<String>,
    workers: Option<usize>,
    backlog: Option<usize>,
    idle_timeout_secs: Option<u64>,
    storage: Option<StorageConfigFile>,
    dedup: Option<DedupConfigFile>,
    models: Option<ModelConfigFile>,
    codec: Option<CodecConfigFile>,
    correction_mode: Option<CorrectionMode>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    db_path: Option<String>,
    artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    detector: Option<PathBuf>,
    recognizer: Option<PathBuf>,
    detector_input_size: Option<u32>,
    detector_threshold: Option<f32>,
    recognizer_width: Option<u32>,
    recognizer_height: Option<u32>,
    recognizer_charset: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CodecConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    quality: Option<u8>,
}

/// Everything `plate_server` needs to run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Concurrent sessions.
    pub workers: usize,
    /// Accepted connections allowed to wait for a worker.
    pub backlog: usize,
    pub idle_timeout: Duration,
    pub db_path: String,
    pub artifact_dir: PathBuf,
    pub dedup_window: Duration,
    pub correction_mode: CorrectionMode,
    pub models: ModelSettings,
    pub codec: FrameCodec,
}

/// Model files. A missing path selects the stub backend.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub detector: Option<PathBuf>,
    pub recognizer: Option<PathBuf>,
    pub detector_input_size: u32,
    /// Minimum box confidence kept by the detector.
    pub detector_threshold: f32,
    pub recognizer_width: u32,
    pub recognizer_height: u32,
    /// Recognizer output classes after the CTC blank, in order.
    pub recognizer_charset: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file(ServerConfigFile::default())
    }
}

impl ServerConfig {
    /// Defaults, then the JSON file named by `PLATE_CONFIG`, then `PLATE_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLATE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServerConfigFile) -> Self {
        let storage = file.storage.unwrap_or_default();
        let models = file.models.unwrap_or_default();
        let codec = file.codec.unwrap_or_default();
        Self {
            listen_addr: file
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            workers: file.workers.unwrap_or(DEFAULT_WORKERS),
            backlog: file.backlog.unwrap_or(DEFAULT_BACKLOG),
            idle_timeout: Duration::from_secs(
                file.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
            db_path: storage
                .db_path
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            artifact_dir: storage
                .artifact_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR)),
            dedup_window: Duration::from_secs(
                file.dedup
                    .and_then(|dedup| dedup.window_secs)
                    .unwrap_or(DEFAULT_DEDUP_WINDOW_SECS),
            ),
            correction_mode: file.correction_mode.unwrap_or_default(),
            models: ModelSettings {
                detector: models.detector,
                recognizer: models.recognizer,
                detector_input_size: models
                    .detector_input_size
                    .unwrap_or(DEFAULT_DETECTOR_INPUT_SIZE),
                detector_threshold: models
                    .detector_threshold
                    .unwrap_or(DEFAULT_DETECTOR_THRESHOLD),
                recognizer_width: models.recognizer_width.unwrap_or(DEFAULT_RECOGNIZER_WIDTH),
                recognizer_height: models
                    .recognizer_height
                    .unwrap_or(DEFAULT_RECOGNIZER_HEIGHT),
                recognizer_charset: models
                    .recognizer_charset
                    .unwrap_or_else(|| PLATE_CHARSET.to_string()),
            },
            codec: FrameCodec::new(
                codec.width.unwrap_or(DEFAULT_CANVAS_WIDTH),
                codec.height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
                codec.quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("PLATE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(path) = non_empty_env("PLATE_DB_PATH") {
            self.db_path = path;
        }
        if let Some(dir) = non_empty_env("PLATE_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Some(workers) = non_empty_env("PLATE_WORKERS") {
            self.workers = workers
                .parse()
                .map_err(|_| anyhow!("PLATE_WORKERS must be a positive integer"))?;
        }
        if let Some(secs) = non_empty_env("PLATE_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("PLATE_IDLE_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = non_empty_env("PLATE_DEDUP_WINDOW_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("PLATE_DEDUP_WINDOW_SECS must be an integer number of seconds")
            })?;
            self.dedup_window = Duration::from_secs(secs);
        }
        if let Some(mode) = non_empty_env("PLATE_CORRECTION_MODE") {
            self.correction_mode = mode
                .parse()
                .map_err(|e| anyhow!("PLATE_CORRECTION_MODE: {}", e))?;
        }
        if let Some(path) = non_empty_env("PLATE_DETECTOR_MODEL") {
            self.models.detector = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("PLATE_RECOGNIZER_MODEL") {
            self.models.recognizer = Some(PathBuf::from(path));
        }
        if let Some(threshold) = non_empty_env("PLATE_DETECTOR_THRESHOLD") {
            self.models.detector_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("PLATE_DETECTOR_THRESHOLD must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow!("workers must be greater than zero"));
        }
        if self.backlog == 0 {
            return Err(anyhow!("backlog must be greater than zero"));
        }
        if self.idle_timeout.is_zero() {
            return Err(anyhow!("idle timeout must be greater than zero"));
        }
        if self.codec.width == 0 || self.codec.height == 0 {
            return Err(anyhow!("codec canvas must be non-empty"));
        }
        if self.models.detector_input_size == 0
            || self.models.recognizer_width == 0
            || self.models.recognizer_height == 0
        {
            return Err(anyhow!("model input dimensions must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.models.detector_threshold) {
            return Err(anyhow!(
                "detector threshold {} is outside 0..=1",
                self.models.detector_threshold
            ));
        }
        if self.models.recognizer_charset.is_empty() {
            return Err(anyhow!("recognizer charset must not be empty"));
        }
        self.listen_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| anyhow!("invalid listen address '{}'", self.listen_addr))?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<ServerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
