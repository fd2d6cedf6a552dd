//! Count samples and the worker loop that produces them.

pub mod continuity;
pub mod sample;
pub mod worker;

pub use continuity::CountContinuity;
pub use sample::{CountSample, LatestSnapshot, RunEpoch};
pub use worker::{CountingWorker, WorkerExit, WorkerSettings, WorkerStats, WorkerStatsSnapshot};
