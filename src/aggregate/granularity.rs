use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucket width used when aggregating history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "10min")]
    TenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "1d")]
    Day,
    /// ISO week starting Monday
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1mo")]
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::TenMinutes => "10min",
            Granularity::ThirtyMinutes => "30min",
            Granularity::Hour => "1h",
            Granularity::Day => "1d",
            Granularity::Week => "1w",
            Granularity::Month => "1mo",
        }
    }

    /// Pick a bucket width that keeps a chart of `span` readable
    pub fn for_span(span: Duration) -> Self {
        if span <= Duration::days(1) {
            Granularity::TenMinutes
        } else if span <= Duration::days(2) {
            Granularity::ThirtyMinutes
        } else if span <= Duration::days(8) {
            Granularity::Hour
        } else if span <= Duration::days(45) {
            Granularity::Day
        } else if span <= Duration::days(400) {
            Granularity::Week
        } else {
            Granularity::Month
        }
    }

    /// Start of the bucket containing `ts`, truncated in local time of `tz`
    pub fn floor(self, ts: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let local = ts.with_timezone(&tz);
        let naive = local.naive_local();

        let sub_day = |minute_step: u32| {
            let minute = naive.minute() / minute_step * minute_step;
            naive.date().and_hms_opt(naive.hour(), minute, 0)
        };

        match self {
            Granularity::TenMinutes | Granularity::ThirtyMinutes | Granularity::Hour => {
                let step = match self {
                    Granularity::TenMinutes => 10,
                    Granularity::ThirtyMinutes => 30,
                    _ => 60,
                };
                // Sub-day buckets keep the sample's own UTC offset so the two
                // passes through a repeated DST hour stay apart
                let offset = local.offset().fix();
                sub_day(step)
                    .and_then(|floored| offset.from_local_datetime(&floored).single())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(ts)
            }
            Granularity::Day => localize_day(naive.date(), tz).unwrap_or(ts),
            Granularity::Week => {
                let monday = naive.date()
                    - Duration::days(i64::from(naive.weekday().num_days_from_monday()));
                localize_day(monday, tz).unwrap_or(ts)
            }
            Granularity::Month => NaiveDate::from_ymd_opt(naive.year(), naive.month(), 1)
                .and_then(|first| localize_day(first, tz))
                .unwrap_or(ts),
        }
    }
}

/// First instant of a local calendar day. Where midnight falls into a DST
/// gap the day starts at the first valid local time after it.
fn localize_day(day: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight: NaiveDateTime = day.and_hms_opt(0, 0, 0)?;
    (0..=4).find_map(|half_hours| {
        tz.from_local_datetime(&(midnight + Duration::minutes(30 * half_hours)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "10min" | "10m" => Ok(Granularity::TenMinutes),
            "30min" | "30m" => Ok(Granularity::ThirtyMinutes),
            "1h" | "hour" | "hourly" => Ok(Granularity::Hour),
            "1d" | "day" | "daily" => Ok(Granularity::Day),
            "1w" | "week" | "weekly" => Ok(Granularity::Week),
            "1mo" | "month" | "monthly" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}
