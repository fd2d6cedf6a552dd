//! Sample sinks: the latest-count document and the append-only history.

pub mod exporter;
pub mod history;
pub mod latest;

pub use exporter::{CountExporter, ExportOutcome, ExportSink, SinkResult};
pub use history::{HistoryStore, JsonlHistoryStore};
pub use latest::LatestStore;

#[cfg(test)]
mod tests;
