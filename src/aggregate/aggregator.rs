use crate::aggregate::{aggregate, Granularity, RangePreset, TimeRange, TimeSeries};
use crate::config::RoomcountConfig;
use crate::counting::CountSample;
use crate::error::Result;
use crate::export::{HistoryStore, JsonlHistoryStore};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

/// Read-side view of the history: raw rows, bucketed series, CSV
#[derive(Clone)]
pub struct CountAggregator {
    history: Arc<dyn HistoryStore>,
    tz: Tz,
}

impl CountAggregator {
    pub fn new(history: Arc<dyn HistoryStore>, tz: Tz) -> Self {
        Self { history, tz }
    }

    pub fn from_config(config: &RoomcountConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(JsonlHistoryStore::new(&config.storage.history_dir)),
            config.timezone()?,
        ))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Raw history rows in `range`, sorted by timestamp
    pub async fn rows(&self, range: TimeRange) -> Result<Vec<CountSample>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.history.query(range.start, range.end).await
    }

    pub async fn query(&self, range: TimeRange, granularity: Granularity) -> Result<TimeSeries> {
        let rows = self.rows(range).await?;
        let series = aggregate(&rows, granularity, self.tz);
        debug!(
            "Aggregated {} rows into {} {} buckets",
            rows.len(),
            series.buckets.len(),
            granularity
        );
        Ok(series)
    }

    /// Query with the bucket width chosen from the range span, or from the
    /// span of the data when a bound is open
    pub async fn query_auto(&self, range: TimeRange) -> Result<TimeSeries> {
        let rows = self.rows(range).await?;
        let span = range.span().unwrap_or_else(|| match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => chrono::Duration::zero(),
        });
        Ok(aggregate(&rows, Granularity::for_span(span), self.tz))
    }

    pub async fn query_preset(&self, preset: RangePreset, now: DateTime<Utc>) -> Result<TimeSeries> {
        self.query(preset.resolve(now, self.tz), preset.granularity())
            .await
    }

    pub async fn export_csv(&self, range: TimeRange, granularity: Granularity) -> Result<String> {
        Ok(self.query(range, granularity).await?.to_csv(self.tz))
    }
}
