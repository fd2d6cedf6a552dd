use crate::setup::DirectionConfig;
use crate::tracker::TrackerCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one counting worker run; counters restart at zero with each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunEpoch(Uuid);

impl RunEpoch {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunEpoch {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunEpoch {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RunEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One exported observation. `current_count` is always `max(0, in - out)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSample {
    pub timestamp: DateTime<Utc>,
    pub in_count: u64,
    pub out_count: u64,
    pub current_count: u64,
    pub total_tracks: u64,
    /// Absent on rows written before run epochs were recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_epoch: Option<RunEpoch>,
}

impl CountSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        in_count: u64,
        out_count: u64,
        total_tracks: u64,
        run_epoch: Option<RunEpoch>,
    ) -> Self {
        Self {
            timestamp,
            in_count,
            out_count,
            current_count: in_count.saturating_sub(out_count),
            total_tracks,
            run_epoch,
        }
    }

    /// Orient raw tracker counts to the configured entry direction
    pub fn from_tracker(
        timestamp: DateTime<Utc>,
        raw: TrackerCounts,
        direction: &DirectionConfig,
        run_epoch: RunEpoch,
    ) -> Self {
        let (in_count, out_count) = if direction.swaps_tracker_counts() {
            (raw.out_count, raw.in_count)
        } else {
            (raw.in_count, raw.out_count)
        };
        Self::new(
            timestamp,
            in_count,
            out_count,
            raw.total_tracks,
            Some(run_epoch),
        )
    }
}

/// The latest count document as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "in")]
    pub in_count: u64,
    #[serde(rename = "out")]
    pub out_count: u64,
    #[serde(rename = "current")]
    pub current_count: u64,
    #[serde(default)]
    pub total_tracks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_epoch: Option<RunEpoch>,
}

impl From<&CountSample> for LatestSnapshot {
    fn from(sample: &CountSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            in_count: sample.in_count,
            out_count: sample.out_count,
            current_count: sample.current_count,
            total_tracks: sample.total_tracks,
            run_epoch: sample.run_epoch,
        }
    }
}
