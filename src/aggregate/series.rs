use crate::aggregate::Granularity;
use crate::counting::{CountSample, RunEpoch};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

pub const CSV_HEADER: &str =
    "timestamp,in_count,out_count,current_count,total_tracks,in_delta,run_epoch";

/// One aggregated interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub in_count: u64,
    pub out_count: u64,
    pub current_count: u64,
    pub total_tracks: u64,
    /// Entries since the previous bucket
    pub in_delta: u64,
    pub run_epoch: Option<RunEpoch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub granularity: Granularity,
    pub buckets: Vec<Bucket>,
}

impl TimeSeries {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Entries over the whole series
    pub fn total_entered(&self) -> u64 {
        self.buckets.iter().map(|b| b.in_delta).sum()
    }

    pub fn peak_occupancy(&self) -> u64 {
        self.buckets.iter().map(|b| b.current_count).max().unwrap_or(0)
    }

    /// Buckets as samples stamped at their start, for re-aggregation
    pub fn as_samples(&self) -> Vec<CountSample> {
        self.buckets
            .iter()
            .map(|b| CountSample {
                timestamp: b.start,
                in_count: b.in_count,
                out_count: b.out_count,
                current_count: b.current_count,
                total_tracks: b.total_tracks,
                run_epoch: b.run_epoch,
            })
            .collect()
    }

    /// CSV with bucket starts rendered in `tz`
    pub fn to_csv(&self, tz: Tz) -> String {
        let mut csv = String::with_capacity(64 * (self.buckets.len() + 1));
        csv.push_str(CSV_HEADER);
        csv.push('\n');
        for b in &self.buckets {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{}",
                b.start.with_timezone(&tz).to_rfc3339(),
                b.in_count,
                b.out_count,
                b.current_count,
                b.total_tracks,
                b.in_delta,
                b.run_epoch.map(|e| e.to_string()).unwrap_or_default()
            );
        }
        csv
    }
}

/// Bucket `samples` by `granularity` in `tz`.
///
/// Bucket values come from the samples of the latest run present in the
/// bucket, reduced with `max`. The entry delta sums over every run seen in
/// the bucket: each run contributes its growth since its own value in an
/// earlier bucket, and a run seen for the first time contributes its whole
/// count.
pub fn aggregate(samples: &[CountSample], granularity: Granularity, tz: Tz) -> TimeSeries {
    let mut groups: BTreeMap<DateTime<Utc>, Vec<&CountSample>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(granularity.floor(sample.timestamp, tz))
            .or_default()
            .push(sample);
    }

    let mut last_in: HashMap<Option<RunEpoch>, u64> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::with_capacity(groups.len());
    for (start, group) in groups {
        let Some(latest) = group.iter().max_by_key(|s| s.timestamp) else {
            continue;
        };
        let run_epoch = latest.run_epoch;

        let mut bucket = Bucket {
            start,
            in_count: 0,
            out_count: 0,
            current_count: 0,
            total_tracks: 0,
            in_delta: 0,
            run_epoch,
        };
        for sample in group.iter().filter(|s| s.run_epoch == run_epoch) {
            bucket.in_count = bucket.in_count.max(sample.in_count);
            bucket.out_count = bucket.out_count.max(sample.out_count);
            bucket.current_count = bucket.current_count.max(sample.current_count);
            bucket.total_tracks = bucket.total_tracks.max(sample.total_tracks);
        }

        let mut run_max: HashMap<Option<RunEpoch>, u64> = HashMap::new();
        for sample in &group {
            let max = run_max.entry(sample.run_epoch).or_default();
            *max = (*max).max(sample.in_count);
        }
        for (epoch, max) in run_max {
            let previous = last_in.insert(epoch, max).unwrap_or(0);
            bucket.in_delta = bucket
                .in_delta
                .saturating_add(max.saturating_sub(previous));
        }
        buckets.push(bucket);
    }

    TimeSeries {
        granularity,
        buckets,
    }
}
