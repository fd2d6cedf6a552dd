use super::{ShutdownReason, Supervisor};
use crate::error::{Result, RoomcountError};
use crate::events::CountEvent;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Requests a supervisor shutdown from outside the run loop
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownHandle {
    /// Returns false when a shutdown was already requested
    pub async fn request(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

impl Supervisor {
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }

    /// Reconcile on every poll tick until a shutdown is requested, then stop
    /// the worker and release the camera
    pub async fn run(&self) -> Result<i32> {
        info!("Roomcount supervisor is running");

        let mut shutdown_receiver = self
            .shutdown_receiver
            .lock()
            .take()
            .ok_or_else(|| RoomcountError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retention = interval(RETENTION_INTERVAL);
        retention.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown_reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.unwrap_or_else(|_| {
                        ShutdownReason::Error("shutdown channel closed unexpectedly".to_string())
                    });
                }
                _ = poll.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!("Reconcile failed: {}", e);
                    }
                }
                _ = retention.tick(), if self.retention_days > 0 => {
                    self.apply_retention().await;
                }
            }
        };

        info!("Shutdown initiated: {}", shutdown_reason);
        self.event_bus.publish(CountEvent::ShutdownRequested {
            reason: shutdown_reason.to_string(),
        });

        let exit_code = self.shutdown().await;

        info!("Roomcount supervisor shutdown complete");
        Ok(exit_code)
    }

    /// Drop history partitions older than the retention window
    pub async fn apply_retention(&self) -> usize {
        if self.retention_days == 0 {
            return 0;
        }
        let cutoff = (Utc::now() - ChronoDuration::days(i64::from(self.retention_days))).date_naive();
        match self.history.prune_before(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    info!("Pruned {} history partitions before {}", removed, cutoff);
                } else {
                    debug!("No history partitions before {}", cutoff);
                }
                removed
            }
            Err(e) => {
                error!("History retention failed: {}", e);
                0
            }
        }
    }

    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let handle = self.shutdown_handle();
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            handle
                                .request(ShutdownReason::Signal("SIGTERM".to_string()))
                                .await;
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        // Handle SIGINT (Ctrl+C)
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                handle
                    .request(ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }
}
