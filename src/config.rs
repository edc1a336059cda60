//! Startup configuration.
//!
//! Configuration is resolved once at startup and passed down explicitly; no
//! module reads tunables from global state. Resolution order: optional TOML
//! file named by `LIFTWATCH_CONFIG` (or a CLI-provided path), then
//! `LIFTWATCH_*` environment overrides, then validation.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BIND_IP: &str = "0.0.0.0";
const DEFAULT_SERVER_IP: &str = "127.0.0.1";
const DEFAULT_IMAGE_PORT: u16 = 9500;
const DEFAULT_MESSAGE_PORT: u16 = 9501;

const DEFAULT_POSE_THRESHOLD: f32 = 0.7;
const DEFAULT_PULL_STATE_DURATION_SECS: u64 = 10;
const DEFAULT_DETECTION_FRAME_THRESHOLD: u32 = 60;
const DEFAULT_INITIAL_FRAME_IGNORE: u32 = 60;
const DEFAULT_HISTORY_LENGTH: usize = 10;

const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    net: Option<NetConfigFile>,
    models: Option<ModelConfigFile>,
    inference: Option<InferenceConfigFile>,
    transport: Option<TransportConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct NetConfigFile {
    bind_ip: Option<String>,
    server_ip: Option<String>,
    image_port: Option<u16>,
    message_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    person_detection: Option<PathBuf>,
    pose_estimation: Option<PathBuf>,
    pose_classification: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    pose_threshold: Option<f32>,
    pull_state_duration_secs: Option<u64>,
    detection_frame_threshold: Option<u32>,
    initial_frame_ignore: Option<u32>,
    history_length: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TransportConfigFile {
    read_timeout_secs: Option<u64>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

/// Resolved configuration for both binaries.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub net: NetSettings,
    pub models: ModelPaths,
    pub inference: InferenceSettings,
    pub transport: TransportSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct NetSettings {
    /// Address the server binds its listeners on.
    pub bind_ip: String,
    /// Address the camera client connects to.
    pub server_ip: String,
    pub image_port: u16,
    pub message_port: u16,
}

/// Model file locations, consumed by real inference backends. Stub
/// collaborators ignore them.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub person_detection: PathBuf,
    pub pose_estimation: PathBuf,
    pub pose_classification: PathBuf,
}

/// Tunables for the temporal state machine.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// Minimum classification confidence for a result to enter the history.
    pub pose_threshold: f32,
    /// How long the pull motion must persist before an alert fires.
    pub pull_state_duration: Duration,
    /// Consecutive subject-present frames required before classification
    /// results are acted on.
    pub detection_frame_threshold: u32,
    /// Leading frames the display side ignores. Not consulted by the state
    /// machine; carried for the presentation layer.
    pub initial_frame_ignore: u32,
    /// Capacity of the result/confidence history buffers.
    pub history_length: usize,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Socket read timeout bounding cooperative-shutdown latency.
    pub read_timeout: Duration,
    /// Frame queue capacity; the oldest frame is dropped on overflow.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            pose_threshold: DEFAULT_POSE_THRESHOLD,
            pull_state_duration: Duration::from_secs(DEFAULT_PULL_STATE_DURATION_SECS),
            detection_frame_threshold: DEFAULT_DETECTION_FRAME_THRESHOLD,
            initial_frame_ignore: DEFAULT_INITIAL_FRAME_IGNORE,
            history_length: DEFAULT_HISTORY_LENGTH,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// Load configuration: optional file, environment overrides, validation.
    ///
    /// `path` overrides the `LIFTWATCH_CONFIG` environment variable when
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("LIFTWATCH_CONFIG").ok().map(PathBuf::from);
        let file_cfg = match path.or(env_path.as_deref()) {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let net = NetSettings {
            bind_ip: file
                .net
                .as_ref()
                .and_then(|net| net.bind_ip.clone())
                .unwrap_or_else(|| DEFAULT_BIND_IP.to_string()),
            server_ip: file
                .net
                .as_ref()
                .and_then(|net| net.server_ip.clone())
                .unwrap_or_else(|| DEFAULT_SERVER_IP.to_string()),
            image_port: file
                .net
                .as_ref()
                .and_then(|net| net.image_port)
                .unwrap_or(DEFAULT_IMAGE_PORT),
            message_port: file
                .net
                .as_ref()
                .and_then(|net| net.message_port)
                .unwrap_or(DEFAULT_MESSAGE_PORT),
        };
        let models = ModelPaths {
            person_detection: file
                .models
                .as_ref()
                .and_then(|models| models.person_detection.clone())
                .unwrap_or_else(|| PathBuf::from("models/person-detection.xml")),
            pose_estimation: file
                .models
                .as_ref()
                .and_then(|models| models.pose_estimation.clone())
                .unwrap_or_else(|| PathBuf::from("models/pose-estimation.xml")),
            pose_classification: file
                .models
                .as_ref()
                .and_then(|models| models.pose_classification.clone())
                .unwrap_or_else(|| PathBuf::from("models/pose-classification.xml")),
        };
        let inference = InferenceSettings {
            pose_threshold: file
                .inference
                .as_ref()
                .and_then(|inference| inference.pose_threshold)
                .unwrap_or(DEFAULT_POSE_THRESHOLD),
            pull_state_duration: Duration::from_secs(
                file.inference
                    .as_ref()
                    .and_then(|inference| inference.pull_state_duration_secs)
                    .unwrap_or(DEFAULT_PULL_STATE_DURATION_SECS),
            ),
            detection_frame_threshold: file
                .inference
                .as_ref()
                .and_then(|inference| inference.detection_frame_threshold)
                .unwrap_or(DEFAULT_DETECTION_FRAME_THRESHOLD),
            initial_frame_ignore: file
                .inference
                .as_ref()
                .and_then(|inference| inference.initial_frame_ignore)
                .unwrap_or(DEFAULT_INITIAL_FRAME_IGNORE),
            history_length: file
                .inference
                .as_ref()
                .and_then(|inference| inference.history_length)
                .unwrap_or(DEFAULT_HISTORY_LENGTH),
        };
        let transport = TransportSettings {
            read_timeout: Duration::from_secs(
                file.transport
                    .as_ref()
                    .and_then(|transport| transport.read_timeout_secs)
                    .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            ),
            queue_capacity: file
                .transport
                .as_ref()
                .and_then(|transport| transport.queue_capacity)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        };
        let camera = CameraSettings {
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
        };
        Self {
            net,
            models,
            inference,
            transport,
            camera,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ip) = std::env::var("LIFTWATCH_BIND_IP") {
            if !ip.trim().is_empty() {
                self.net.bind_ip = ip;
            }
        }
        if let Ok(ip) = std::env::var("LIFTWATCH_SERVER_IP") {
            if !ip.trim().is_empty() {
                self.net.server_ip = ip;
            }
        }
        if let Ok(port) = std::env::var("LIFTWATCH_IMAGE_PORT") {
            self.net.image_port = port
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_IMAGE_PORT must be a port number"))?;
        }
        if let Ok(port) = std::env::var("LIFTWATCH_MESSAGE_PORT") {
            self.net.message_port = port
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_MESSAGE_PORT must be a port number"))?;
        }
        if let Ok(secs) = std::env::var("LIFTWATCH_PULL_STATE_DURATION_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("LIFTWATCH_PULL_STATE_DURATION_SECS must be an integer number of seconds")
            })?;
            self.inference.pull_state_duration = Duration::from_secs(secs);
        }
        if let Ok(threshold) = std::env::var("LIFTWATCH_POSE_THRESHOLD") {
            self.inference.pose_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_POSE_THRESHOLD must be a float"))?;
        }
        if let Ok(frames) = std::env::var("LIFTWATCH_DETECTION_FRAME_THRESHOLD") {
            self.inference.detection_frame_threshold = frames
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_DETECTION_FRAME_THRESHOLD must be an integer"))?;
        }
        if let Ok(frames) = std::env::var("LIFTWATCH_INITIAL_FRAME_IGNORE") {
            self.inference.initial_frame_ignore = frames
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_INITIAL_FRAME_IGNORE must be an integer"))?;
        }
        if let Ok(length) = std::env::var("LIFTWATCH_HISTORY_LENGTH") {
            self.inference.history_length = length
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_HISTORY_LENGTH must be an integer"))?;
        }
        if let Ok(secs) = std::env::var("LIFTWATCH_READ_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("LIFTWATCH_READ_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.transport.read_timeout = Duration::from_secs(secs);
        }
        if let Ok(capacity) = std::env::var("LIFTWATCH_QUEUE_CAPACITY") {
            self.transport.queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("LIFTWATCH_QUEUE_CAPACITY must be an integer"))?;
        }
        if let Ok(path) = std::env::var("LIFTWATCH_PERSON_DETECTION_MODEL") {
            self.models.person_detection = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("LIFTWATCH_POSE_ESTIMATION_MODEL") {
            self.models.pose_estimation = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("LIFTWATCH_POSE_CLASSIFICATION_MODEL") {
            self.models.pose_classification = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.net.image_port == self.net.message_port {
            return Err(anyhow!(
                "image and message channels must use distinct ports (both {})",
                self.net.image_port
            ));
        }
        if !(0.0..=1.0).contains(&self.inference.pose_threshold) {
            return Err(anyhow!("pose_threshold must be within [0, 1]"));
        }
        if self.inference.pull_state_duration.is_zero() {
            return Err(anyhow!("pull_state_duration must be greater than zero"));
        }
        if self.inference.history_length == 0 {
            return Err(anyhow!("history_length must be at least 1"));
        }
        if self.transport.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be at least 1"));
        }
        if self.transport.read_timeout.is_zero() {
            return Err(anyhow!("read_timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
