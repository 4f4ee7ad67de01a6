//! Monthly network traffic accounting.
//!
//! The accumulator turns successive interface counter snapshots into running
//! upload/download totals for the current calendar month. Totals are zeroed
//! whenever the local calendar month changes, before anything is added to or
//! read from them.
//!
//! Persistence is explicit: [`TrafficAccumulator::persist`] writes the totals
//! atomically and [`TrafficAccumulator::load`] restores them at start-up. A
//! missing, unreadable, corrupt or stale (other month) file loads as zeroed
//! totals for the current month.

use crate::core::{month_key, InterfaceCounters, MonthlyTraffic, BYTES_PER_MB};
use crate::netfilter::is_virtual;
use crate::store::{self, StoreError};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The accumulator shared between the update task and the submission cycle.
pub type SharedTraffic = Arc<Mutex<TrafficAccumulator>>;

/// Megabytes added by one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrafficDelta {
    pub upload_mb: f64,
    pub download_mb: f64,
}

pub struct TrafficAccumulator {
    totals: MonthlyTraffic,
    last_snapshot: Option<HashMap<String, InterfaceCounters>>,
    path: PathBuf,
}

impl TrafficAccumulator {
    /// Creates an accumulator starting from `totals`, with no prior snapshot.
    pub fn new(path: impl Into<PathBuf>, totals: MonthlyTraffic) -> Self {
        Self {
            totals,
            last_snapshot: None,
            path: path.into(),
        }
    }

    /// Restores the accumulator from its state file.
    pub async fn load(path: impl Into<PathBuf>, now: DateTime<Local>) -> Self {
        let path = path.into();
        let totals = load_totals(&path, &now).await;
        Self::new(path, totals)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Totals as last mutated, without a rollover check.
    pub fn totals(&self) -> &MonthlyTraffic {
        &self.totals
    }

    pub fn has_baseline(&self) -> bool {
        self.last_snapshot.is_some()
    }

    /// Zeroes the totals if `now` falls in a different month. Returns whether it did.
    fn roll_over(&mut self, now: &DateTime<Local>) -> bool {
        let month = month_key(now);
        if self.totals.month == month {
            return false;
        }
        info!(
            previous_month = %self.totals.month,
            month = %month,
            upload_mb = self.totals.upload_mb,
            download_mb = self.totals.download_mb,
            "Calendar month changed, resetting traffic totals"
        );
        self.totals = MonthlyTraffic::zeroed(month);
        true
    }

    /// Folds one counter snapshot into the totals.
    ///
    /// Only physical interfaces present in both the previous and the current
    /// snapshot contribute. A counter that went backwards contributes its
    /// current raw value. The first snapshot only establishes the baseline.
    pub fn apply(&mut self, snapshot: Vec<InterfaceCounters>, now: DateTime<Local>) -> TrafficDelta {
        self.roll_over(&now);

        let mut delta = TrafficDelta::default();
        if let Some(previous) = &self.last_snapshot {
            let mut sent: u64 = 0;
            let mut recv: u64 = 0;
            for current in snapshot.iter().filter(|c| !is_virtual(&c.name)) {
                if let Some(prev) = previous.get(&current.name) {
                    sent = sent.saturating_add(counter_delta(prev.bytes_sent, current.bytes_sent));
                    recv = recv.saturating_add(counter_delta(prev.bytes_recv, current.bytes_recv));
                }
            }
            delta.upload_mb = sent as f64 / BYTES_PER_MB;
            delta.download_mb = recv as f64 / BYTES_PER_MB;
            self.totals.upload_mb += delta.upload_mb;
            self.totals.download_mb += delta.download_mb;
        }

        self.last_snapshot = Some(
            snapshot
                .into_iter()
                .map(|counters| (counters.name.clone(), counters))
                .collect(),
        );
        debug!(
            added_upload_mb = delta.upload_mb,
            added_download_mb = delta.download_mb,
            "Traffic snapshot applied"
        );
        delta
    }

    /// Totals for the month containing `now`.
    pub fn current(&mut self, now: DateTime<Local>) -> MonthlyTraffic {
        self.roll_over(&now);
        self.totals.clone()
    }

    /// Writes the current totals to the state file.
    pub async fn persist(&mut self, now: DateTime<Local>) -> Result<MonthlyTraffic, StoreError> {
        let totals = self.current(now);
        save_totals(&self.path, &totals).await?;
        Ok(totals)
    }
}

/// Writes `totals` to the state file at `path`.
pub async fn save_totals(path: &Path, totals: &MonthlyTraffic) -> Result<(), StoreError> {
    store::write_json_atomic(path, totals, true).await
}

/// Bytes transferred between two readings of a cumulative counter.
fn counter_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        // The counter was reset or wrapped; count everything it shows now.
        current
    }
}

/// Reads persisted totals, falling back to zero for the month of `now`.
pub async fn load_totals(path: &Path, now: &DateTime<Local>) -> MonthlyTraffic {
    let month = month_key(now);
    match store::read_json::<MonthlyTraffic>(path).await {
        Ok(Some(totals)) if totals.month == month => {
            info!(
                month = %totals.month,
                upload_mb = totals.upload_mb,
                download_mb = totals.download_mb,
                "Restored monthly traffic"
            );
            totals
        }
        Ok(Some(stale)) => {
            info!(stored_month = %stale.month, "Stored traffic belongs to another month, starting at zero");
            MonthlyTraffic::zeroed(month)
        }
        Ok(None) => MonthlyTraffic::zeroed(month),
        Err(e) => {
            warn!(error = %e, "Traffic state unreadable, starting at zero");
            MonthlyTraffic::zeroed(month)
        }
    }
}
