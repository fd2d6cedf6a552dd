use super::orchestrator::{StatusSnapshot, SupervisorInner};
use super::{Supervisor, SupervisorStatus, WorkerState};

impl Supervisor {
    /// Snapshot of the last observed mode and the worker lifecycle.
    ///
    /// Never waits on a start or stop in progress: while one holds the
    /// lifecycle lock, the status published at its last step is returned
    /// with fresh worker stats.
    pub async fn status(&self) -> SupervisorStatus {
        match self.inner.try_lock() {
            Ok(mut inner) => {
                self.reap(&mut inner).await;
                self.publish_status(&inner)
            }
            Err(_) => {
                let StatusSnapshot { mut status, stats } = self.snapshot.lock().clone();
                status.stats = stats.map(|stats| stats.snapshot());
                status
            }
        }
    }

    /// Record the current lifecycle as the status served while busy
    pub(super) fn publish_status(&self, inner: &SupervisorInner) -> SupervisorStatus {
        let status = SupervisorStatus {
            mode: inner.last_mode,
            worker_state: inner.state,
            run_epoch: inner.worker.as_ref().map(|w| w.epoch).or(inner.last_run),
            blocked: inner.blocked_epoch.is_some_and(|epoch| epoch == inner.mode_epoch),
            last_exit: inner.last_exit.clone(),
            stats: inner.last_stats.as_ref().map(|stats| stats.snapshot()),
        };
        *self.snapshot.lock() = StatusSnapshot {
            status: status.clone(),
            stats: inner.last_stats.clone(),
        };
        status
    }

    pub async fn worker_state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    /// True while a worker task exists and has not finished
    pub async fn worker_alive(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}
