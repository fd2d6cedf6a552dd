//! The external person tracker, consumed through [`Tracker`].

pub mod mock;
pub mod process;
pub mod types;

pub use mock::{ScriptedTracker, SimulatedTracker};
pub use process::ProcessTracker;
pub use types::{Tracker, TrackerCounts};

use crate::config::{TrackerBackend, TrackerConfig};
use tracing::info;

/// Build the tracker selected by `config.backend`
pub fn tracker(config: &TrackerConfig) -> Box<dyn Tracker> {
    match config.backend {
        TrackerBackend::Simulated => {
            info!("Using simulated tracker");
            Box::new(SimulatedTracker::new())
        }
        TrackerBackend::Process => {
            info!("Using tracker process: {} {:?}", config.command, config.args);
            Box::new(ProcessTracker::new(config))
        }
    }
}

#[cfg(test)]
mod tests;
