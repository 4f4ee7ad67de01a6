//! Turning provider readings into a [`Sample`].

use crate::core::{InterfaceCounters, MetricsProvider, Sample, BYTES_PER_MB};
use crate::netfilter::is_virtual;
use crate::provider::ProviderError;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time;
use tracing::{instrument, trace};

/// Takes one sample.
///
/// Bandwidth is the counter delta across physical interfaces over `window`,
/// expressed in MB/s. Any provider failure aborts the whole sample.
#[instrument(skip_all)]
pub async fn capture_sample(
    provider: &dyn MetricsProvider,
    disk_path: &Path,
    window: Duration,
) -> Result<Sample, ProviderError> {
    let cpu_usage = provider.cpu_percent().await?;
    let memory = provider.memory_stats().await?;
    let disk = provider.disk_usage(disk_path).await?;

    let start = provider.interface_counters().await?;
    time::sleep(window).await;
    let end = provider.interface_counters().await?;
    let (upload_bandwidth, download_bandwidth) = bandwidth_between(&start, &end, window);

    let sample = Sample {
        cpu_usage,
        memory_usage: memory.used_percent,
        upload_bandwidth,
        download_bandwidth,
        disk_usage: disk.used_percent,
        captured_at: Utc::now(),
    };
    trace!(?sample, "Sample captured");
    Ok(sample)
}

/// Upload and download throughput in MB/s between two snapshots.
///
/// Interfaces are matched by name; virtual interfaces and interfaces missing
/// from either snapshot are ignored. A zero window yields the raw MB moved.
pub fn bandwidth_between(
    start: &[InterfaceCounters],
    end: &[InterfaceCounters],
    window: Duration,
) -> (f64, f64) {
    let start: HashMap<&str, &InterfaceCounters> =
        start.iter().map(|c| (c.name.as_str(), c)).collect();

    let (sent, recv) = end
        .iter()
        .filter(|c| !is_virtual(&c.name))
        .filter_map(|c| start.get(c.name.as_str()).map(|s| (*s, c)))
        .fold((0u64, 0u64), |(sent, recv), (s, e)| {
            (
                sent.saturating_add(e.bytes_sent.saturating_sub(s.bytes_sent)),
                recv.saturating_add(e.bytes_recv.saturating_sub(s.bytes_recv)),
            )
        });

    let seconds = window.as_secs_f64();
    let per_second = if seconds > 0.0 { seconds } else { 1.0 };
    (
        sent as f64 / BYTES_PER_MB / per_second,
        recv as f64 / BYTES_PER_MB / per_second,
    )
}
