use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomcountConfig {
    pub camera: CameraConfig,
    pub tracker: TrackerConfig,
    pub coordination: CoordinationConfig,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Frame source implementation
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackend,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Reference resolution (width, height); regions are expressed in this space
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Frames discarded before a still is kept, so exposure can settle
    #[serde(default = "default_still_warmup_frames")]
    pub still_warmup_frames: u32,

    /// How long to wait for a single frame before reporting the capture unavailable
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    Synthetic,
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackerConfig {
    #[serde(default = "default_tracker_backend")]
    pub backend: TrackerBackend,

    /// Executable speaking the line protocol (process backend only)
    #[serde(default = "default_tracker_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Upper bound for one track() round trip
    #[serde(default = "default_tracker_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    Simulated,
    Process,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoordinationConfig {
    /// Persisted mode token
    #[serde(default = "default_mode_token_path")]
    pub mode_token_path: String,

    /// Token polling interval, shared by the supervisor and the worker
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Written by `roomctl retry`, consumed by the daemon on its next poll
    #[serde(default = "default_retry_request_path")]
    pub retry_request_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// Wait before retrying after a frame could not be captured
    #[serde(default = "default_capture_retry_ms")]
    pub capture_retry_ms: u64,

    /// Wait after a failed iteration
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Grace period for a cooperative stop before the worker is aborted
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding region.json and direction.json
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Latest count document
    #[serde(default = "default_latest_path")]
    pub latest_path: String,

    /// Directory of day-partitioned history files
    #[serde(default = "default_history_dir")]
    pub history_dir: String,

    /// Where the configuration still is written
    #[serde(default = "default_reference_image_path")]
    pub reference_image_path: String,

    /// Per-sink export timeout
    #[serde(default = "default_export_timeout_ms")]
    pub export_timeout_ms: u64,

    /// History retention in days (0 keeps everything)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueryConfig {
    /// IANA timezone used for bucket boundaries and range presets
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_http_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl RoomcountConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("roomcount.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.backend", "synthetic")?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.still_warmup_frames", default_still_warmup_frames())?
            .set_default("camera.frame_timeout_ms", default_frame_timeout_ms())?
            .set_default("tracker.backend", "simulated")?
            .set_default("tracker.command", default_tracker_command())?
            .set_default("tracker.args", Vec::<String>::new())?
            .set_default("tracker.timeout_ms", default_tracker_timeout_ms())?
            .set_default("coordination.mode_token_path", default_mode_token_path())?
            .set_default("coordination.poll_interval_ms", default_poll_interval_ms())?
            .set_default(
                "coordination.retry_request_path",
                default_retry_request_path(),
            )?
            .set_default("worker.capture_retry_ms", default_capture_retry_ms())?
            .set_default("worker.error_backoff_ms", default_error_backoff_ms())?
            .set_default("worker.stop_grace_secs", default_stop_grace_secs())?
            .set_default("storage.config_dir", default_config_dir())?
            .set_default("storage.latest_path", default_latest_path())?
            .set_default("storage.history_dir", default_history_dir())?
            .set_default(
                "storage.reference_image_path",
                default_reference_image_path(),
            )?
            .set_default("storage.export_timeout_ms", default_export_timeout_ms())?
            .set_default("storage.retention_days", default_retention_days())?
            .set_default("query.timezone", default_timezone())?
            .set_default("http.enabled", default_http_enabled())?
            .set_default("http.ip", default_http_ip())?
            .set_default("http.port", default_http_port())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. ROOMCOUNT__HTTP__PORT=9090
            .add_source(Environment::with_prefix("ROOMCOUNT").separator("__"))
            .build()?;

        let config: RoomcountConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.coordination.poll_interval_ms == 0 || self.coordination.poll_interval_ms > 1000 {
            return Err(ConfigError::Message(
                "Mode poll interval must be between 1 and 1000 ms".to_string(),
            ));
        }

        if self.tracker.backend == TrackerBackend::Process && self.tracker.command.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "Tracker command is required for the process backend".to_string(),
            ));
        }

        if self.tracker.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Tracker timeout must be greater than 0".to_string(),
            ));
        }

        if self.storage.export_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Export timeout must be greater than 0".to_string(),
            ));
        }

        self.timezone()?;

        Ok(())
    }

    /// Timezone used for bucketing
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.query.timezone.parse::<Tz>().map_err(|e| {
            ConfigError::Message(format!(
                "Unknown timezone '{}': {}",
                self.query.timezone, e
            ))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.coordination.poll_interval_ms)
    }

    pub fn mode_token_path(&self) -> PathBuf {
        PathBuf::from(&self.coordination.mode_token_path)
    }

    pub fn retry_request_path(&self) -> PathBuf {
        PathBuf::from(&self.coordination.retry_request_path)
    }
}

impl Default for RoomcountConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                backend: default_camera_backend(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                still_warmup_frames: default_still_warmup_frames(),
                frame_timeout_ms: default_frame_timeout_ms(),
            },
            tracker: TrackerConfig {
                backend: default_tracker_backend(),
                command: default_tracker_command(),
                args: Vec::new(),
                timeout_ms: default_tracker_timeout_ms(),
            },
            coordination: CoordinationConfig {
                mode_token_path: default_mode_token_path(),
                poll_interval_ms: default_poll_interval_ms(),
                retry_request_path: default_retry_request_path(),
            },
            worker: WorkerConfig {
                capture_retry_ms: default_capture_retry_ms(),
                error_backoff_ms: default_error_backoff_ms(),
                stop_grace_secs: default_stop_grace_secs(),
            },
            storage: StorageConfig {
                config_dir: default_config_dir(),
                latest_path: default_latest_path(),
                history_dir: default_history_dir(),
                reference_image_path: default_reference_image_path(),
                export_timeout_ms: default_export_timeout_ms(),
                retention_days: default_retention_days(),
            },
            query: QueryConfig {
                timezone: default_timezone(),
            },
            http: HttpConfig {
                enabled: default_http_enabled(),
                ip: default_http_ip(),
                port: default_http_port(),
            },
        }
    }
}

impl RoomcountConfig {
    /// Configuration with every path rooted under `dir`
    pub fn rooted_at<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let mut config = Self::default();
        config.coordination.mode_token_path = dir.join("camera.mode").display().to_string();
        config.coordination.retry_request_path = dir.join("worker.retry").display().to_string();
        config.storage.config_dir = dir.join("config").display().to_string();
        config.storage.latest_path = dir.join("latest.json").display().to_string();
        config.storage.history_dir = dir.join("history").display().to_string();
        config.storage.reference_image_path = dir.join("reference.jpg").display().to_string();
        config
    }
}

// Default value functions
fn default_camera_backend() -> CameraBackend {
    CameraBackend::Synthetic
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_fps() -> u32 {
    10
}
fn default_still_warmup_frames() -> u32 {
    5
}
fn default_frame_timeout_ms() -> u64 {
    2000
}

fn default_tracker_backend() -> TrackerBackend {
    TrackerBackend::Simulated
}
fn default_tracker_command() -> String {
    "roomcount-tracker".to_string()
}
fn default_tracker_timeout_ms() -> u64 {
    2000
}

fn default_mode_token_path() -> String {
    "./data/camera.mode".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_retry_request_path() -> String {
    "./data/worker.retry".to_string()
}

fn default_capture_retry_ms() -> u64 {
    500
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_stop_grace_secs() -> u64 {
    5
}

fn default_config_dir() -> String {
    "./data/config".to_string()
}
fn default_latest_path() -> String {
    "./data/latest.json".to_string()
}
fn default_history_dir() -> String {
    "./data/history".to_string()
}
fn default_reference_image_path() -> String {
    "./data/reference.jpg".to_string()
}
fn default_export_timeout_ms() -> u64 {
    500
}
fn default_retention_days() -> u32 {
    0
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_http_enabled() -> bool {
    true
}
fn default_http_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RoomcountConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.resolution, (1280, 720));
        assert_eq!(config.camera.backend, CameraBackend::Synthetic);
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[camera]
resolution = [640, 480]

[tracker]
backend = "process"
command = "/usr/local/bin/person-tracker"
args = ["--model", "yolo11n"]

[coordination]
poll_interval_ms = 250

[query]
timezone = "Europe/Berlin"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = RoomcountConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.tracker.backend, TrackerBackend::Process);
        assert_eq!(config.tracker.args, vec!["--model", "yolo11n"]);
        assert_eq!(config.coordination.poll_interval_ms, 250);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
        // untouched sections keep their defaults
        assert_eq!(config.storage.export_timeout_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RoomcountConfig::default();

        config.coordination.poll_interval_ms = 5000;
        assert!(config.validate().is_err());
        config.coordination.poll_interval_ms = 1000;

        config.camera.resolution = (0, 720);
        assert!(config.validate().is_err());
        config.camera.resolution = (1280, 720);

        config.query.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
        config.query.timezone = "UTC".to_string();

        config.tracker.backend = TrackerBackend::Process;
        config.tracker.command = "  ".to_string();
        assert!(config.validate().is_err());

        config.tracker.command = "tracker".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rooted_paths() {
        let config = RoomcountConfig::rooted_at("/var/lib/roomcount");
        assert_eq!(
            config.mode_token_path(),
            PathBuf::from("/var/lib/roomcount/camera.mode")
        );
        assert_eq!(config.storage.history_dir, "/var/lib/roomcount/history");
        assert_eq!(
            config.retry_request_path(),
            PathBuf::from("/var/lib/roomcount/worker.retry")
        );
    }
}
