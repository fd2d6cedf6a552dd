use crate::counting::{RunEpoch, WorkerStatsSnapshot};
use crate::mode::CameraMode;
use serde::Serialize;

/// Counting worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "signal {}", signal),
            ShutdownReason::Error(error) => write!(f, "error: {}", error),
            ShutdownReason::UserRequest => write!(f, "user request"),
        }
    }
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    /// Last mode observed on the token
    pub mode: Option<CameraMode>,
    pub worker_state: WorkerState,
    pub run_epoch: Option<RunEpoch>,
    /// Set when a failed worker will not be restarted until retried
    pub blocked: bool,
    pub last_exit: Option<String>,
    pub stats: Option<WorkerStatsSnapshot>,
}
