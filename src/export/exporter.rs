use crate::config::RoomcountConfig;
use crate::counting::CountSample;
use crate::error::Result;
use crate::events::{CountEvent, EventBus};
use crate::export::{HistoryStore, JsonlHistoryStore, LatestStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportSink {
    Latest,
    History,
}

impl fmt::Display for ExportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportSink::Latest => write!(f, "latest"),
            ExportSink::History => write!(f, "history"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkResult {
    Written,
    Failed(String),
    TimedOut,
}

impl SinkResult {
    pub fn is_written(&self) -> bool {
        matches!(self, SinkResult::Written)
    }
}

/// Per-sink result of one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub latest: SinkResult,
    pub history: SinkResult,
}

impl ExportOutcome {
    pub fn all_written(&self) -> bool {
        self.latest.is_written() && self.history.is_written()
    }

    pub fn any_written(&self) -> bool {
        self.latest.is_written() || self.history.is_written()
    }
}

/// Writes every sample to the latest document and the history, concurrently
/// and independently. Export never fails the caller.
#[derive(Clone)]
pub struct CountExporter {
    latest: LatestStore,
    history: Arc<dyn HistoryStore>,
    timeout: Duration,
    event_bus: Option<EventBus>,
}

impl CountExporter {
    pub fn new(latest: LatestStore, history: Arc<dyn HistoryStore>, timeout: Duration) -> Self {
        Self {
            latest,
            history,
            timeout,
            event_bus: None,
        }
    }

    pub fn from_config(config: &RoomcountConfig) -> Self {
        Self::new(
            LatestStore::new(&config.storage.latest_path),
            Arc::new(JsonlHistoryStore::new(&config.storage.history_dir)),
            Duration::from_millis(config.storage.export_timeout_ms),
        )
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn latest(&self) -> &LatestStore {
        &self.latest
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.history)
    }

    pub async fn export(&self, sample: &CountSample) -> ExportOutcome {
        let (latest, history) = tokio::join!(
            bounded(self.timeout, self.latest.write(sample)),
            bounded(self.timeout, self.history.append(sample)),
        );
        let outcome = ExportOutcome { latest, history };

        self.report(ExportSink::Latest, &outcome.latest);
        self.report(ExportSink::History, &outcome.history);

        if outcome.any_written() {
            trace!(
                "Exported sample in={} out={} current={}",
                sample.in_count,
                sample.out_count,
                sample.current_count
            );
            if let Some(event_bus) = &self.event_bus {
                event_bus.publish(CountEvent::SampleExported {
                    sample: sample.clone(),
                });
            }
        }

        outcome
    }

    fn report(&self, sink: ExportSink, result: &SinkResult) {
        let error = match result {
            SinkResult::Written => return,
            SinkResult::Failed(error) => error.clone(),
            SinkResult::TimedOut => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        match &self.event_bus {
            Some(event_bus) => {
                event_bus.publish(CountEvent::ExportFailed { sink, error });
            }
            None => warn!("Export to {} failed: {}", sink, error),
        }
    }
}

async fn bounded<F>(limit: Duration, write: F) -> SinkResult
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(limit, write).await {
        Ok(Ok(())) => SinkResult::Written,
        Ok(Err(e)) => SinkResult::Failed(e.to_string()),
        Err(_) => SinkResult::TimedOut,
    }
}
