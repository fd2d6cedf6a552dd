use crate::counting::{CountSample, RunEpoch};
use crate::export::ExportSink;
use crate::mode::CameraMode;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Lifecycle events published inside the roomcount process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CountEvent {
    /// The mode token moved between modes
    ModeChanged { from: CameraMode, to: CameraMode },
    /// A counting worker was launched
    WorkerStarted { epoch: RunEpoch },
    /// A counting worker finished its loop
    WorkerExited { epoch: RunEpoch, reason: String },
    /// A counting worker could not be started or terminated abnormally
    WorkerFailed { error: String },
    /// A sample reached at least one sink
    SampleExported { sample: CountSample },
    /// A sink rejected or timed out on a sample
    ExportFailed { sink: ExportSink, error: String },
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl CountEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CountEvent::ModeChanged { from, to } => format!("Mode changed: {} -> {}", from, to),
            CountEvent::WorkerStarted { epoch } => format!("Worker started (run {})", epoch),
            CountEvent::WorkerExited { epoch, reason } => {
                format!("Worker exited (run {}): {}", epoch, reason)
            }
            CountEvent::WorkerFailed { error } => format!("Worker failed: {}", error),
            CountEvent::SampleExported { sample } => format!(
                "Sample exported: in={} out={} current={}",
                sample.in_count, sample.out_count, sample.current_count
            ),
            CountEvent::ExportFailed { sink, error } => {
                format!("Export to {} failed: {}", sink, error)
            }
            CountEvent::ShutdownRequested { reason } => format!("Shutdown requested: {}", reason),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CountEvent::ModeChanged { .. } => "mode_changed",
            CountEvent::WorkerStarted { .. } => "worker_started",
            CountEvent::WorkerExited { .. } => "worker_exited",
            CountEvent::WorkerFailed { .. } => "worker_failed",
            CountEvent::SampleExported { .. } => "sample_exported",
            CountEvent::ExportFailed { .. } => "export_failed",
            CountEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CountEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<CountEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: CountEvent) -> usize {
        match &event {
            CountEvent::ModeChanged { from, to } => info!("Mode changed: {} -> {}", from, to),
            CountEvent::WorkerFailed { error } => error!("Counting worker failed: {}", error),
            CountEvent::ExportFailed { sink, error } => {
                warn!("Export to {} failed: {}", sink, error)
            }
            CountEvent::ShutdownRequested { reason } => info!("Shutdown requested: {}", reason),
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        let delivered = event_bus.publish(CountEvent::ShutdownRequested {
            reason: "test".to_string(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        let delivered = event_bus.publish(CountEvent::ModeChanged {
            from: CameraMode::Idle,
            to: CameraMode::Configuring,
        });
        assert_eq!(delivered, 2);

        for receiver in [&mut receiver1, &mut receiver2] {
            let event = timeout(Duration::from_millis(100), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.event_type(), "mode_changed");
        }
    }

    #[test]
    fn test_event_description() {
        let event = CountEvent::ExportFailed {
            sink: ExportSink::History,
            error: "disk full".to_string(),
        };
        assert_eq!(event.description(), "Export to history failed: disk full");
    }
}
