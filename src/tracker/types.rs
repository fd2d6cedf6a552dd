use crate::camera::Frame;
use crate::error::Result;
use crate::setup::Point;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cumulative tracker output for one run. Missing fields read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerCounts {
    pub in_count: u64,
    pub out_count: u64,
    pub total_tracks: u64,
}

impl TrackerCounts {
    pub fn new(in_count: u64, out_count: u64, total_tracks: u64) -> Self {
        Self {
            in_count,
            out_count,
            total_tracks,
        }
    }
}

#[async_trait]
pub trait Tracker: Send {
    /// Feed one frame; returns counts accumulated since the tracker started
    async fn track(&mut self, frame: &Frame, region: &[Point]) -> Result<TrackerCounts>;

    /// Changes whenever the cumulative counts restart from zero, e.g. after
    /// the backing process was respawned
    fn generation(&self) -> u64 {
        0
    }

    /// Release any external resources
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}
