use crate::tracker::TrackerCounts;
use tracing::warn;

/// Keeps a run's cumulative counts non-decreasing across tracker restarts.
///
/// When the tracker's generation changes, or any raw counter goes backwards,
/// the last counts seen are folded into a baseline that is added to every
/// later reply.
#[derive(Debug, Default)]
pub struct CountContinuity {
    baseline: TrackerCounts,
    last_raw: TrackerCounts,
    generation: Option<u64>,
    restarts: u64,
}

impl CountContinuity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts for the run so far, given the tracker's raw reply
    pub fn apply(&mut self, generation: u64, raw: TrackerCounts) -> TrackerCounts {
        if let Some(previous) = self.generation {
            let regressed = raw.in_count < self.last_raw.in_count
                || raw.out_count < self.last_raw.out_count
                || raw.total_tracks < self.last_raw.total_tracks;
            if previous != generation || regressed {
                warn!(
                    "Tracker counts restarted (generation {} -> {}), resuming from in={} out={}",
                    previous,
                    generation,
                    self.baseline.in_count.saturating_add(self.last_raw.in_count),
                    self.baseline.out_count.saturating_add(self.last_raw.out_count)
                );
                self.baseline = add(self.baseline, self.last_raw);
                self.restarts += 1;
            }
        }

        self.generation = Some(generation);
        self.last_raw = raw;
        add(self.baseline, raw)
    }

    /// Restarts absorbed so far
    pub fn restarts(&self) -> u64 {
        self.restarts
    }
}

fn add(a: TrackerCounts, b: TrackerCounts) -> TrackerCounts {
    TrackerCounts::new(
        a.in_count.saturating_add(b.in_count),
        a.out_count.saturating_add(b.out_count),
        a.total_tracks.saturating_add(b.total_tracks),
    )
}
