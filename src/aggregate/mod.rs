//! Query-time bucketing of the count history.

pub mod aggregator;
pub mod granularity;
pub mod range;
pub mod series;

pub use aggregator::CountAggregator;
pub use granularity::Granularity;
pub use range::{parse_instant, RangePreset, TimeRange};
pub use series::{aggregate, Bucket, TimeSeries};
