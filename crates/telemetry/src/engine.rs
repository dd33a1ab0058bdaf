//! Usage tracker: records usage entries and serves reports.

use crate::model::{TimeRange, UsageHistogram, UsageStats};
use chrono::{DateTime, Duration, Utc};
use lily_core::error::StoreError;
use lily_core::usage::{UsageEntry, UsageKind, UsageLog};
use std::sync::Arc;

/// Buckets used for [`TimeRange::All`].
const ALL_RANGE_BUCKETS: usize = 10;

/// Front end over a [`UsageLog`].
#[derive(Clone)]
pub struct UsageTracker {
    log: Arc<dyn UsageLog>,
}

impl UsageTracker {
    pub fn new(log: Arc<dyn UsageLog>) -> Self {
        Self { log }
    }

    /// Record one message or completion of `character_count` characters.
    pub async fn record(&self, kind: UsageKind, character_count: usize) -> Result<(), StoreError> {
        self.log.append(UsageEntry::now(kind, character_count)).await
    }

    pub async fn stats(&self) -> Result<UsageStats, StoreError> {
        Ok(summarize(&self.log.all().await?))
    }

    pub async fn histogram(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<UsageHistogram, StoreError> {
        let (start, bucket_size, count) = match range.fixed_buckets() {
            Some((size, count)) => (now - size * count as i32, size, count),
            None => {
                let all = self.log.all().await?;
                let Some(oldest) = all.iter().map(|u| u.timestamp).min() else {
                    return Ok(UsageHistogram {
                        range,
                        start: now,
                        bucket_size: Duration::zero(),
                        counts: Vec::new(),
                    });
                };
                let buckets = ALL_RANGE_BUCKETS as i64;
                let span = (now - oldest).num_milliseconds().max(buckets);
                // Round up so the newest entry stays inside the window.
                let size = Duration::milliseconds((span + buckets - 1) / buckets);
                (oldest, size, ALL_RANGE_BUCKETS)
            }
        };

        let entries = self.log.query(start, now).await?;
        Ok(UsageHistogram {
            range,
            start,
            bucket_size,
            counts: bucketize(&entries, start, bucket_size, count),
        })
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.log.clear().await
    }
}

/// Totals by kind.
pub fn summarize(entries: &[UsageEntry]) -> UsageStats {
    entries.iter().fold(UsageStats::default(), |mut stats, u| {
        match u.kind {
            UsageKind::Message => stats.total_messages += 1,
            UsageKind::Completion => stats.total_completions += 1,
        }
        stats.total_characters += u.character_count as u64;
        stats
    })
}

/// Count entries into `count` buckets of `size` starting at `start`.
///
/// An entry exactly at the end of the window lands in the last bucket;
/// entries outside the window are ignored.
pub fn bucketize(
    entries: &[UsageEntry],
    start: DateTime<Utc>,
    size: Duration,
    count: usize,
) -> Vec<u64> {
    let mut counts = vec![0u64; count];
    let size_ms = size.num_milliseconds();
    if count == 0 || size_ms <= 0 {
        return counts;
    }
    let end_ms = size_ms * count as i64;

    for u in entries {
        let offset = (u.timestamp - start).num_milliseconds();
        if offset < 0 || offset > end_ms {
            continue;
        }
        let index = ((offset / size_ms) as usize).min(count - 1);
        counts[index] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::InMemoryUsageLog;

    fn entry(ts: DateTime<Utc>, kind: UsageKind, chars: usize) -> UsageEntry {
        UsageEntry {
            timestamp: ts,
            kind,
            character_count: chars,
        }
    }

    #[test]
    fn summarize_counts_by_kind() {
        let now = Utc::now();
        let stats = summarize(&[
            entry(now, UsageKind::Message, 12),
            entry(now, UsageKind::Completion, 300),
            entry(now, UsageKind::Message, 8),
        ]);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.total_characters, 320);
    }

    #[test]
    fn bucketize_by_floor() {
        let start = Utc::now();
        let hour = Duration::hours(1);
        let counts = bucketize(
            &[
                entry(start, UsageKind::Message, 1),
                entry(start + Duration::minutes(59), UsageKind::Message, 1),
                entry(start + Duration::minutes(61), UsageKind::Message, 1),
                entry(start + hour * 24, UsageKind::Message, 1),
                entry(start - Duration::minutes(1), UsageKind::Message, 1),
            ],
            start,
            hour,
            24,
        );
        assert_eq!(counts.len(), 24);
        assert_eq!(counts[0], 2);
        assert_eq!(counts[1], 1);
        assert_eq!(counts[23], 1);
        assert_eq!(counts.iter().sum::<u64>(), 4);
    }

    #[tokio::test]
    async fn daily_histogram_has_seven_buckets() {
        let log = Arc::new(InMemoryUsageLog::new());
        let now = Utc::now();
        log.append(entry(now - Duration::hours(1), UsageKind::Message, 3))
            .await
            .unwrap();
        log.append(entry(now - Duration::days(3), UsageKind::Completion, 3))
            .await
            .unwrap();
        log.append(entry(now - Duration::days(30), UsageKind::Message, 3))
            .await
            .unwrap();

        let tracker = UsageTracker::new(log);
        let hist = tracker.histogram(TimeRange::Daily, now).await.unwrap();
        assert_eq!(hist.counts.len(), 7);
        assert_eq!(hist.counts[6], 1);
        assert_eq!(hist.counts[4], 1);
        assert_eq!(hist.total(), 2);
    }

    #[tokio::test]
    async fn all_range_spans_oldest_entry() {
        let log = Arc::new(InMemoryUsageLog::new());
        let now = Utc::now();
        log.append(entry(now - Duration::days(100), UsageKind::Message, 1))
            .await
            .unwrap();
        log.append(entry(now, UsageKind::Completion, 1)).await.unwrap();

        let tracker = UsageTracker::new(log);
        let hist = tracker.histogram(TimeRange::All, now).await.unwrap();
        assert_eq!(hist.counts.len(), 10);
        assert_eq!(hist.counts[0], 1);
        assert_eq!(hist.counts[9], 1);
    }

    #[tokio::test]
    async fn all_range_empty_log() {
        let tracker = UsageTracker::new(Arc::new(InMemoryUsageLog::new()));
        let hist = tracker.histogram(TimeRange::All, Utc::now()).await.unwrap();
        assert!(hist.counts.is_empty());
    }

    #[tokio::test]
    async fn record_and_stats() {
        let tracker = UsageTracker::new(Arc::new(InMemoryUsageLog::new()));
        tracker.record(UsageKind::Message, 4).await.unwrap();
        tracker.record(UsageKind::Completion, 40).await.unwrap();
        let stats = tracker.stats().await.unwrap();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.total_characters, 44);

        tracker.clear().await.unwrap();
        assert_eq!(tracker.stats().await.unwrap(), UsageStats::default());
    }
}
