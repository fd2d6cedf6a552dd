use crate::camera::Frame;
use crate::error::{Result, TrackerError};
use crate::setup::Point;
use crate::tracker::{Tracker, TrackerCounts};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic stand-in producing a slow trickle of crossings
pub struct SimulatedTracker {
    frames_seen: u64,
}

impl SimulatedTracker {
    const FRAMES_PER_ENTRY: u64 = 20;
    const FRAMES_PER_EXIT: u64 = 30;

    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tracker for SimulatedTracker {
    async fn track(&mut self, _frame: &Frame, _region: &[Point]) -> Result<TrackerCounts> {
        self.frames_seen += 1;
        let in_count = self.frames_seen / Self::FRAMES_PER_ENTRY;
        let out_count = self.frames_seen / Self::FRAMES_PER_EXIT;
        Ok(TrackerCounts::new(in_count, out_count, in_count + out_count))
    }
}

/// Replays a fixed sequence of replies, then repeats the last counts
pub struct ScriptedTracker {
    script: VecDeque<std::result::Result<TrackerCounts, String>>,
    last: TrackerCounts,
    delay: Option<Duration>,
    calls: Arc<AtomicU64>,
}

impl ScriptedTracker {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<TrackerCounts, String>>,
    {
        Self {
            script: replies.into_iter().collect(),
            last: TrackerCounts::default(),
            delay: None,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Always answer with the same counts
    pub fn constant(counts: TrackerCounts) -> Self {
        Self::new([Ok(counts)])
    }

    /// Simulate inference time on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter, readable after the tracker is moved into a worker
    pub fn calls(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tracker for ScriptedTracker {
    async fn track(&mut self, _frame: &Frame, _region: &[Point]) -> Result<TrackerCounts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.script.pop_front() {
            Some(Ok(counts)) => {
                self.last = counts;
                Ok(counts)
            }
            Some(Err(details)) => Err(TrackerError::Failure { details }.into()),
            None => Ok(self.last),
        }
    }
}
