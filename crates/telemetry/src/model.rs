//! Usage report types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Totals over every recorded usage entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_messages: u64,
    pub total_completions: u64,
    pub total_characters: u64,
}

/// Window shown by a usage histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    /// Last 24 hours, one bucket per hour
    Hourly,
    /// Last 7 days, one bucket per day
    #[default]
    Daily,
    /// Last 12 weeks, one bucket per week
    Weekly,
    /// Last 12 thirty-day months
    Monthly,
    /// Last 5 365-day years
    Yearly,
    /// From the oldest entry to now, in 10 equal buckets
    All,
}

impl TimeRange {
    pub const ALL_RANGES: [TimeRange; 6] = [
        TimeRange::Hourly,
        TimeRange::Daily,
        TimeRange::Weekly,
        TimeRange::Monthly,
        TimeRange::Yearly,
        TimeRange::All,
    ];

    /// Bucket width and count for fixed windows; `None` for [`TimeRange::All`].
    pub fn fixed_buckets(self) -> Option<(Duration, usize)> {
        match self {
            TimeRange::Hourly => Some((Duration::hours(1), 24)),
            TimeRange::Daily => Some((Duration::days(1), 7)),
            TimeRange::Weekly => Some((Duration::weeks(1), 12)),
            TimeRange::Monthly => Some((Duration::days(30), 12)),
            TimeRange::Yearly => Some((Duration::days(365), 5)),
            TimeRange::All => None,
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimeRange::Hourly => "hourly",
            TimeRange::Daily => "daily",
            TimeRange::Weekly => "weekly",
            TimeRange::Monthly => "monthly",
            TimeRange::Yearly => "yearly",
            TimeRange::All => "all",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL_RANGES
            .into_iter()
            .find(|r| r.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown time range '{s}'"))
    }
}

/// Entry counts per time bucket, oldest bucket first.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageHistogram {
    pub range: TimeRange,
    pub start: DateTime<Utc>,
    pub bucket_size: Duration,
    pub counts: Vec<u64>,
}

impl UsageHistogram {
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Start time of bucket `i`.
    pub fn bucket_start(&self, i: usize) -> DateTime<Utc> {
        self.start + self.bucket_size * i as i32
    }
}
