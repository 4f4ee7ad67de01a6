//! # Internal Metrics Module
//!
//! The agent records its own activity through the `metrics` facade. Without an
//! installed recorder every call is a no-op; with `metrics.log_metrics` enabled
//! a [`LoggingRecorder`] writes all counters and gauges to the log at a fixed
//! interval.

pub mod logging_recorder;

use anyhow::{anyhow, Result};
use metrics::Unit;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use logging_recorder::LoggingRecorder;

/// Registers descriptions for every metric the agent emits.
pub fn describe_metrics() {
    metrics::describe_counter!("samples_collected_total", Unit::Count, "Samples taken by the collection task, labeled by status.");
    metrics::describe_counter!("traffic_updates_total", Unit::Count, "Interface counter snapshots folded into the monthly totals, labeled by status.");
    metrics::describe_counter!("traffic_persists_total", Unit::Count, "Writes of the monthly traffic state file, labeled by status.");
    metrics::describe_counter!("submission_attempts_total", Unit::Count, "Individual report delivery attempts, labeled by outcome.");
    metrics::describe_counter!("submission_cycles_total", Unit::Count, "Completed submission cycles, labeled by outcome.");
    metrics::describe_gauge!("monthly_upload_mb", "Megabytes uploaded in the current month.");
    metrics::describe_gauge!("monthly_download_mb", "Megabytes downloaded in the current month.");
    metrics::describe_gauge!("sample_cache_entries", Unit::Count, "Samples waiting in the cache for the next submission.");
}

/// Installs the [`LoggingRecorder`] as the global recorder.
pub fn install_logging_recorder(
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let (recorder, handle) = LoggingRecorder::new(interval, shutdown_rx);
    if let Err(e) = metrics::set_global_recorder(recorder) {
        handle.abort();
        return Err(anyhow!("failed to install logging recorder: {e}"));
    }
    describe_metrics();
    Ok(handle)
}
