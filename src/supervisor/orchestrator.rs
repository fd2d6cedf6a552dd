use super::launcher::{DefaultLauncher, WorkerLauncher};
use super::types::{ShutdownReason, SupervisorStatus, WorkerState};
use crate::config::RoomcountConfig;
use crate::counting::{RunEpoch, WorkerExit, WorkerStats};
use crate::events::EventBus;
use crate::export::{CountExporter, HistoryStore};
use crate::mode::{CameraMode, ModeCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned worker and the handles needed to stop it
pub(super) struct RunningWorker {
    pub(super) epoch: RunEpoch,
    pub(super) cancel: CancellationToken,
    pub(super) handle: JoinHandle<WorkerExit>,
    pub(super) stats: Arc<WorkerStats>,
}

/// Lifecycle bookkeeping, guarded by one async mutex so start and stop are
/// serialized
pub(super) struct SupervisorInner {
    pub(super) worker: Option<RunningWorker>,
    pub(super) state: WorkerState,
    pub(super) last_mode: Option<CameraMode>,
    /// Incremented every time `Counting` is entered
    pub(super) mode_epoch: u64,
    /// Mode epoch in which a worker failed; no automatic restart within it
    pub(super) blocked_epoch: Option<u64>,
    pub(super) last_run: Option<RunEpoch>,
    pub(super) last_exit: Option<String>,
    pub(super) last_stats: Option<Arc<WorkerStats>>,
}

/// Status as of the last lifecycle change, with a handle on the live stats
#[derive(Clone)]
pub(super) struct StatusSnapshot {
    pub(super) status: SupervisorStatus,
    pub(super) stats: Option<Arc<WorkerStats>>,
}

/// Keeps exactly one counting worker alive while the camera is held for
/// counting, and none otherwise
pub struct Supervisor {
    pub(super) coordinator: ModeCoordinator,
    pub(super) launcher: Arc<dyn WorkerLauncher>,
    pub(super) history: Arc<dyn HistoryStore>,
    pub(super) event_bus: EventBus,

    pub(super) poll_interval: Duration,
    pub(super) stop_grace: Duration,
    pub(super) retention_days: u32,
    pub(super) retry_request_path: PathBuf,

    // Lifecycle management
    pub(super) inner: Mutex<SupervisorInner>,
    /// Last published status, served while `inner` is busy
    pub(super) snapshot: parking_lot::Mutex<StatusSnapshot>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: parking_lot::Mutex<Option<oneshot::Receiver<ShutdownReason>>>,
    pub(super) cancellation_token: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: &RoomcountConfig,
        coordinator: ModeCoordinator,
        launcher: Arc<dyn WorkerLauncher>,
        history: Arc<dyn HistoryStore>,
        event_bus: EventBus,
    ) -> Self {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            coordinator,
            launcher,
            history,
            event_bus,
            poll_interval: config.poll_interval(),
            stop_grace: Duration::from_secs(config.worker.stop_grace_secs),
            retention_days: config.storage.retention_days,
            retry_request_path: config.retry_request_path(),
            inner: Mutex::new(SupervisorInner {
                worker: None,
                state: WorkerState::Stopped,
                last_mode: None,
                mode_epoch: 0,
                blocked_epoch: None,
                last_run: None,
                last_exit: None,
                last_stats: None,
            }),
            snapshot: parking_lot::Mutex::new(StatusSnapshot {
                status: SupervisorStatus {
                    mode: None,
                    worker_state: WorkerState::Stopped,
                    run_epoch: None,
                    blocked: false,
                    last_exit: None,
                    stats: None,
                },
                stats: None,
            }),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: parking_lot::Mutex::new(Some(shutdown_receiver)),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Supervisor over the file token, configured camera, tracker and stores
    pub fn from_config(config: &RoomcountConfig, event_bus: EventBus) -> Self {
        let coordinator = ModeCoordinator::from_config(config).with_event_bus(event_bus.clone());
        let exporter = CountExporter::from_config(config).with_event_bus(event_bus.clone());
        let history = exporter.history();
        let launcher = Arc::new(DefaultLauncher::new(
            config.clone(),
            coordinator.token(),
            coordinator.config_store().clone(),
            exporter,
        ));

        Self::new(config, coordinator, launcher, history, event_bus)
    }

    /// Override the cooperative stop window
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    pub fn coordinator(&self) -> &ModeCoordinator {
        &self.coordinator
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Cancelled when the supervisor shuts down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
