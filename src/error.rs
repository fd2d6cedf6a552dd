use crate::mode::CameraMode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoomcountError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Mode error: {0}")]
    Mode(#[from] ModeError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Mode token and transition failures, returned synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    #[error("camera is already held in {current} mode")]
    AlreadyLocked { current: CameraMode },

    #[error("configuration incomplete, missing: {}", missing.join(", "))]
    IncompleteConfig { missing: Vec<&'static str> },

    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: CameraMode, to: CameraMode },

    #[error("counting mode is not active (current: {current})")]
    NotCounting { current: CameraMode },

    #[error("configuration mode is not held (current: {current})")]
    NotConfiguring { current: CameraMode },

    #[error("mode token holds unrecognised value {value:?}")]
    CorruptToken { value: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("invalid region: {details}")]
    InvalidRegion { details: String },

    #[error("invalid direction: {details}")]
    InvalidDirection { details: String },
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("capture unavailable: {details}")]
    CaptureUnavailable { details: String },

    #[error("camera configuration failed: {details}")]
    Configuration { details: String },
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tracker failure: {details}")]
    Failure { details: String },

    #[error("tracker protocol violation: {details}")]
    Protocol { details: String },

    #[error("tracker did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("write to {sink} failed: {details}")]
    WriteFailure { sink: String, details: String },

    #[error("read from {sink} failed: {details}")]
    ReadFailure { sink: String, details: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("counting worker failed to start: {details}")]
    StartFailure { details: String },

    #[error("counting worker crashed: {details}")]
    Crashed { details: String },
}

impl RoomcountError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Errors the counting loop retries after a backoff instead of giving up
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RoomcountError::Camera(CameraError::CaptureUnavailable { .. })
                | RoomcountError::Tracker(_)
                | RoomcountError::Storage(_)
                | RoomcountError::Io(_)
        )
    }
}

impl StorageError {
    pub fn write<S: Into<String>, D: std::fmt::Display>(sink: S, details: D) -> Self {
        Self::WriteFailure {
            sink: sink.into(),
            details: details.to_string(),
        }
    }

    pub fn read<S: Into<String>, D: std::fmt::Display>(sink: S, details: D) -> Self {
        Self::ReadFailure {
            sink: sink.into(),
            details: details.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RoomcountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let capture: RoomcountError = CameraError::CaptureUnavailable {
            details: "no frame".to_string(),
        }
        .into();
        assert!(capture.is_transient());

        let tracker: RoomcountError = TrackerError::Timeout { timeout_ms: 10 }.into();
        assert!(tracker.is_transient());

        let mode: RoomcountError = ModeError::NotCounting {
            current: CameraMode::Idle,
        }
        .into();
        assert!(!mode.is_transient());
    }

    #[test]
    fn test_incomplete_config_lists_missing_documents() {
        let err = ModeError::IncompleteConfig {
            missing: vec!["region", "direction"],
        };
        assert_eq!(
            err.to_string(),
            "configuration incomplete, missing: region, direction"
        );
    }
}
