use super::orchestrator::{RunningWorker, Supervisor, SupervisorInner};
use super::types::WorkerState;
use crate::counting::{RunEpoch, WorkerExit};
use crate::error::{ModeError, Result, WorkerError};
use crate::events::CountEvent;
use crate::mode::CameraMode;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

impl Supervisor {
    /// Observe the mode once and bring the worker in line with it
    pub async fn reconcile(&self) -> Result<()> {
        let mode = self.coordinator.current().await.map_err(|e| {
            warn!("Mode token unreadable, leaving worker as is: {}", e);
            e
        })?;
        let retry_requested = self.take_retry_request().await;

        let mut inner = self.inner.lock().await;
        self.reap(&mut inner).await;
        observe_mode(&mut inner, mode);
        if retry_requested && inner.blocked_epoch.take().is_some() {
            info!("Worker failure block cleared");
        }

        match mode {
            CameraMode::Counting => {
                if inner.worker.is_none() && inner.blocked_epoch != Some(inner.mode_epoch) {
                    self.start_locked(&mut inner).await?;
                }
            }
            CameraMode::Idle | CameraMode::Configuring => {
                if inner.worker.is_some() {
                    info!("Camera left counting mode ({}), stopping worker", mode);
                    self.stop_locked(&mut inner).await?;
                }
            }
        }
        Ok(())
    }

    /// Start a worker now. Rejected unless the camera is held for counting;
    /// a no-op when one is already alive.
    pub async fn start_worker(&self) -> Result<RunEpoch> {
        let current = self.coordinator.current().await?;
        if current != CameraMode::Counting {
            return Err(ModeError::NotCounting { current }.into());
        }

        let mut inner = self.inner.lock().await;
        self.reap(&mut inner).await;
        observe_mode(&mut inner, current);

        if let Some(worker) = &inner.worker {
            debug!("Worker already running (run {})", worker.epoch);
            return Ok(worker.epoch);
        }
        if inner.blocked_epoch == Some(inner.mode_epoch) {
            return Err(WorkerError::StartFailure {
                details: "worker failed in this counting session; retry required".to_string(),
            }
            .into());
        }
        self.start_locked(&mut inner).await
    }

    /// Clear a failure block and start a worker
    pub async fn retry_worker(&self) -> Result<RunEpoch> {
        {
            let mut inner = self.inner.lock().await;
            if inner.blocked_epoch.take().is_some() {
                info!("Worker failure block cleared");
            }
        }
        self.start_worker().await
    }

    /// Stop the worker if one is alive
    pub async fn stop_worker(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.reap(&mut inner).await;
        if inner.worker.is_some() {
            self.stop_locked(&mut inner).await?;
        }
        Ok(())
    }

    async fn start_locked(&self, inner: &mut SupervisorInner) -> Result<RunEpoch> {
        let epoch = RunEpoch::new();
        inner.state = WorkerState::Starting;
        self.publish_status(inner);
        info!("Starting counting worker (run {})", epoch);

        let worker = match self.launcher.launch(epoch).await {
            Ok(worker) => worker,
            Err(e) => {
                inner.state = WorkerState::Failed;
                inner.blocked_epoch = Some(inner.mode_epoch);
                inner.last_exit = Some(format!("start failed: {}", e));
                self.event_bus.publish(CountEvent::WorkerFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let stats = worker.stats();
        let cancel = self.cancellation_token.child_token();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        inner.worker = Some(RunningWorker {
            epoch,
            cancel,
            handle,
            stats: stats.clone(),
        });
        inner.state = WorkerState::Running;
        inner.last_run = Some(epoch);
        inner.last_stats = Some(stats);
        self.event_bus.publish(CountEvent::WorkerStarted { epoch });
        Ok(epoch)
    }

    async fn stop_locked(&self, inner: &mut SupervisorInner) -> Result<()> {
        let Some(RunningWorker {
            epoch,
            cancel,
            mut handle,
            ..
        }) = inner.worker.take()
        else {
            return Ok(());
        };

        inner.state = WorkerState::Stopping;
        self.publish_status(inner);
        cancel.cancel();

        match timeout(self.stop_grace, &mut handle).await {
            Ok(Ok(exit)) => {
                inner.state = WorkerState::Stopped;
                self.record_exit(inner, epoch, exit.to_string());
                Ok(())
            }
            Ok(Err(join_error)) => {
                inner.state = WorkerState::Failed;
                let details = join_error.to_string();
                inner.last_exit = Some(format!("crashed: {}", details));
                self.event_bus.publish(CountEvent::WorkerFailed {
                    error: details.clone(),
                });
                Err(WorkerError::Crashed { details }.into())
            }
            Err(_) => {
                warn!(
                    "Worker (run {}) did not stop within {:?}, aborting",
                    epoch, self.stop_grace
                );
                handle.abort();
                inner.state = WorkerState::Stopped;
                self.record_exit(inner, epoch, "aborted".to_string());
                Ok(())
            }
        }
    }

    /// Collect a worker whose task has finished on its own
    pub(super) async fn reap(&self, inner: &mut SupervisorInner) {
        let finished = inner
            .worker
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished());
        if !finished {
            return;
        }
        let Some(worker) = inner.worker.take() else {
            return;
        };

        match worker.handle.await {
            Ok(WorkerExit::ModeChanged(mode)) => {
                // The worker saw the mode change before the supervisor did
                inner.state = WorkerState::Stopped;
                inner.last_mode = Some(mode);
                self.record_exit(inner, worker.epoch, WorkerExit::ModeChanged(mode).to_string());
            }
            Ok(WorkerExit::Cancelled) => {
                inner.state = WorkerState::Stopped;
                self.record_exit(inner, worker.epoch, WorkerExit::Cancelled.to_string());
            }
            Err(join_error) => {
                error!(
                    "Counting worker (run {}) crashed: {}; not restarting until retried",
                    worker.epoch, join_error
                );
                inner.state = WorkerState::Failed;
                inner.blocked_epoch = Some(inner.mode_epoch);
                inner.last_exit = Some(format!("crashed: {}", join_error));
                self.event_bus.publish(CountEvent::WorkerFailed {
                    error: join_error.to_string(),
                });
            }
        }
    }

    fn record_exit(&self, inner: &mut SupervisorInner, epoch: RunEpoch, reason: String) {
        inner.last_exit = Some(reason.clone());
        self.event_bus
            .publish(CountEvent::WorkerExited { epoch, reason });
    }
}

fn observe_mode(inner: &mut SupervisorInner, mode: CameraMode) {
    if inner.last_mode != Some(mode) {
        if mode == CameraMode::Counting {
            inner.mode_epoch += 1;
        }
        debug!("Supervisor observed mode {}", mode);
        inner.last_mode = Some(mode);
    }
}
