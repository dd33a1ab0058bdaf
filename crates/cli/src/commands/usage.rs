//! `lily usage`: Usage totals and histograms.

use lily_telemetry::{FileUsageLog, TimeRange, UsageHistogram, UsageTracker};
use std::sync::Arc;

const BAR_WIDTH: usize = 40;

pub async fn run(range: TimeRange) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let tracker = UsageTracker::new(Arc::new(FileUsageLog::open(FileUsageLog::default_path(
        &config.data_dir(),
    ))));

    let stats = tracker.stats().await?;
    println!("📊 Usage");
    println!("─────────────────────────────────────");
    println!("  Messages sent:      {}", stats.total_messages);
    println!("  Responses received: {}", stats.total_completions);
    println!("  Characters:         {}", stats.total_characters);
    println!();

    let histogram = tracker.histogram(range, chrono::Utc::now()).await?;
    println!("  Activity ({range})");
    for line in render_histogram(&histogram) {
        println!("  {line}");
    }
    Ok(())
}

fn bucket_label(range: TimeRange, start: chrono::DateTime<chrono::Utc>) -> String {
    let format = match range {
        TimeRange::Hourly => "%m-%d %H:00",
        TimeRange::Yearly => "%Y-%m",
        _ => "%Y-%m-%d",
    };
    start.format(format).to_string()
}

/// One line per bucket, bars scaled to the largest bucket.
fn render_histogram(histogram: &UsageHistogram) -> Vec<String> {
    let max = histogram.counts.iter().copied().max().unwrap_or(0);
    histogram
        .counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let width = if max == 0 {
                0
            } else {
                (count as usize * BAR_WIDTH).div_ceil(max as usize)
            };
            format!(
                "{:<12} {:<bar$} {count}",
                bucket_label(histogram.range, histogram.bucket_start(i)),
                "█".repeat(width),
                bar = BAR_WIDTH,
            )
        })
        .collect()
}
