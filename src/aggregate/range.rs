use crate::aggregate::Granularity;
use chrono::{DateTime, Duration, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Half-open interval `[start, end)`; a missing bound is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s >= e)
    }

    /// Length of the range when both bounds are known
    pub fn span(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Named dashboard ranges with their bucket widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Today,
    Yesterday,
    LastWeek,
    LastMonth,
    LastYear,
    All,
}

impl RangePreset {
    pub fn granularity(&self) -> Granularity {
        match self {
            RangePreset::Today => Granularity::TenMinutes,
            RangePreset::Yesterday => Granularity::ThirtyMinutes,
            RangePreset::LastWeek => Granularity::Hour,
            RangePreset::LastMonth => Granularity::Day,
            RangePreset::LastYear => Granularity::Week,
            RangePreset::All => Granularity::Month,
        }
    }

    /// Concrete range relative to `now`, with calendar days taken in `tz`
    pub fn resolve(&self, now: DateTime<Utc>, tz: Tz) -> TimeRange {
        let local_now = now.with_timezone(&tz);
        let today_start = Granularity::Day.floor(now, tz);

        match self {
            RangePreset::Today => {
                let tomorrow = local_now.date_naive() + Duration::days(1);
                let tomorrow_start = tomorrow
                    .and_hms_opt(0, 0, 0)
                    .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
                    .map(|dt| dt.with_timezone(&Utc));
                TimeRange::new(Some(today_start), tomorrow_start)
            }
            RangePreset::Yesterday => {
                let yesterday_start =
                    Granularity::Day.floor(today_start - Duration::hours(12), tz);
                TimeRange::between(yesterday_start, today_start)
            }
            RangePreset::LastWeek => TimeRange::new(Some(now - Duration::weeks(1)), None),
            RangePreset::LastMonth => TimeRange::new(
                Some(
                    local_now
                        .checked_sub_months(Months::new(1))
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(now - Duration::days(30)),
                ),
                None,
            ),
            RangePreset::LastYear => TimeRange::new(
                Some(
                    local_now
                        .checked_sub_months(Months::new(12))
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(now - Duration::days(365)),
                ),
                None,
            ),
            RangePreset::All => TimeRange::all(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangePreset::Today => "today",
            RangePreset::Yesterday => "yesterday",
            RangePreset::LastWeek => "last_week",
            RangePreset::LastMonth => "last_month",
            RangePreset::LastYear => "last_year",
            RangePreset::All => "all",
        }
    }
}

impl fmt::Display for RangePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "today" => Ok(RangePreset::Today),
            "yesterday" => Ok(RangePreset::Yesterday),
            "last_week" | "week" => Ok(RangePreset::LastWeek),
            "last_month" | "month" => Ok(RangePreset::LastMonth),
            "last_year" | "year" => Ok(RangePreset::LastYear),
            "all" => Ok(RangePreset::All),
            other => Err(format!("unknown range preset '{}'", other)),
        }
    }
}

/// RFC 3339 timestamp, or a calendar date meaning local midnight in `tz`
pub fn parse_instant(value: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid timestamp '{}'", value))?;
    date.and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("no local midnight on {}", value))
}
