use crate::camera::FrameSource;
use crate::config::WorkerConfig;
use crate::counting::{CountContinuity, CountSample, RunEpoch};
use crate::error::{CameraError, ModeError, Result, RoomcountError, WorkerError};
use crate::export::CountExporter;
use crate::mode::{CameraMode, ModeToken};
use crate::setup::{ConfigStore, CountingSetup, Point};
use crate::tracker::Tracker;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub capture_retry: Duration,
    pub error_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            capture_retry: Duration::from_millis(config.capture_retry_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
        }
    }
}

/// Loop counters, shared with the supervisor
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    samples_exported: AtomicU64,
    capture_failures: AtomicU64,
    tracker_failures: AtomicU64,
    tracker_restarts: AtomicU64,
    export_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub iterations: u64,
    pub samples_exported: u64,
    pub capture_failures: u64,
    pub tracker_failures: u64,
    pub tracker_restarts: u64,
    pub export_failures: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            samples_exported: self.samples_exported.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            tracker_failures: self.tracker_failures.load(Ordering::Relaxed),
            tracker_restarts: self.tracker_restarts.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
        }
    }
}

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The token no longer reads `Counting`
    ModeChanged(CameraMode),
    /// The supervisor asked the worker to stop
    Cancelled,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::ModeChanged(mode) => write!(f, "mode changed to {}", mode),
            WorkerExit::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Frame -> tracker -> exporter loop, alive only while the camera is held
/// for counting.
pub struct CountingWorker {
    epoch: RunEpoch,
    token: Arc<dyn ModeToken>,
    camera: Box<dyn FrameSource>,
    tracker: Box<dyn Tracker>,
    continuity: CountContinuity,
    exporter: CountExporter,
    setup: CountingSetup,
    polygon: [Point; 4],
    settings: WorkerSettings,
    stats: Arc<WorkerStats>,
}

impl CountingWorker {
    /// Check the mode, load the configuration and open the camera, so that
    /// every start failure surfaces before the loop is spawned.
    pub async fn prepare(
        epoch: RunEpoch,
        token: Arc<dyn ModeToken>,
        config_store: &ConfigStore,
        mut camera: Box<dyn FrameSource>,
        tracker: Box<dyn Tracker>,
        exporter: CountExporter,
        settings: WorkerSettings,
    ) -> Result<Self> {
        let current = token.get().await?;
        if current != CameraMode::Counting {
            return Err(ModeError::NotCounting { current }.into());
        }

        let setup = config_store
            .load_complete()
            .await
            .map_err(|e| WorkerError::StartFailure {
                details: e.to_string(),
            })?;

        camera.open().await.map_err(|e| WorkerError::StartFailure {
            details: format!("camera unavailable: {}", e),
        })?;

        info!(
            "Counting worker prepared (run {}, region {:?}, entry {})",
            epoch, setup.region, setup.direction.entry
        );

        Ok(Self {
            epoch,
            token,
            camera,
            tracker,
            continuity: CountContinuity::new(),
            exporter,
            polygon: setup.region.polygon(),
            setup,
            settings,
            stats: Arc::new(WorkerStats::default()),
        })
    }

    pub fn epoch(&self) -> RunEpoch {
        self.epoch
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the mode changes or `cancel` fires. The camera is closed on
    /// the way out.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerExit {
        info!("Counting worker running (run {})", self.epoch);
        let exit = self.run_loop(&cancel).await;

        if let Err(e) = self.camera.close().await {
            warn!("Failed to close camera: {}", e);
        }
        if let Err(e) = self.tracker.shutdown().await {
            warn!("Failed to shut down tracker: {}", e);
        }

        info!(
            "Counting worker stopped (run {}): {} after {} samples",
            self.epoch,
            exit,
            self.stats.samples_exported.load(Ordering::Relaxed)
        );
        exit
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> WorkerExit {
        loop {
            if cancel.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            match self.token.get().await {
                Ok(CameraMode::Counting) => {}
                Ok(mode) => return WorkerExit::ModeChanged(mode),
                Err(e) => {
                    warn!("Mode token unreadable, retrying: {}", e);
                    if pause(self.settings.error_backoff, cancel).await {
                        return WorkerExit::Cancelled;
                    }
                    continue;
                }
            }

            self.stats.iterations.fetch_add(1, Ordering::Relaxed);

            let captured = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WorkerExit::Cancelled,
                captured = self.camera.capture_frame() => captured,
            };
            let frame = match captured {
                Ok(frame) => frame,
                Err(RoomcountError::Camera(CameraError::CaptureUnavailable { details })) => {
                    self.stats.capture_failures.fetch_add(1, Ordering::Relaxed);
                    debug!("Frame unavailable, retrying: {}", details);
                    if pause(self.settings.capture_retry, cancel).await {
                        return WorkerExit::Cancelled;
                    }
                    continue;
                }
                Err(e) => {
                    self.stats.capture_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Capture failed: {}", e);
                    if pause(self.settings.error_backoff, cancel).await {
                        return WorkerExit::Cancelled;
                    }
                    continue;
                }
            };

            // An in-flight tracker call is always completed
            let raw = match self.tracker.track(&frame, &self.polygon).await {
                Ok(raw) => raw,
                Err(e) => {
                    self.stats.tracker_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Tracker failed on frame {}: {}", frame.id, e);
                    if pause(self.settings.error_backoff, cancel).await {
                        return WorkerExit::Cancelled;
                    }
                    continue;
                }
            };

            let restarts = self.continuity.restarts();
            let counts = self.continuity.apply(self.tracker.generation(), raw);
            if self.continuity.restarts() > restarts {
                self.stats.tracker_restarts.fetch_add(1, Ordering::Relaxed);
            }

            let sample =
                CountSample::from_tracker(Utc::now(), counts, &self.setup.direction, self.epoch);
            trace!(
                "Frame {}: in={} out={} current={}",
                frame.id,
                sample.in_count,
                sample.out_count,
                sample.current_count
            );

            if self.exporter.export(&sample).await.any_written() {
                self.stats.samples_exported.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.export_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Sleep for `duration`; returns true if cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
