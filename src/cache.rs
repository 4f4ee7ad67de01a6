//! Disk-backed cache of the samples taken since the last submission.
//!
//! The cache file is a JSON array rewritten in full on every append. A file
//! that cannot be read or decoded is treated as an empty cache: appending
//! starts a fresh list and [`SampleCache::worst`] reports nothing.

use crate::core::Sample;
use crate::store::{self, StoreError};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Append-only sample log with a "worst sample" query.
pub struct SampleCache {
    path: PathBuf,
    // Serializes the read-modify-write cycles of concurrent tasks.
    lock: Mutex<()>,
}

impl SampleCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a sample and returns the number of cached samples.
    pub async fn append(&self, sample: Sample) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut samples = self.read_or_empty().await;
        samples.push(sample);
        store::write_json_atomic(&self.path, &samples, false).await?;
        debug!(cached = samples.len(), "Sample appended to cache");
        Ok(samples.len())
    }

    /// Returns the sample with the highest CPU usage, if any.
    pub async fn worst(&self) -> Option<Sample> {
        let _guard = self.lock.lock().await;
        let samples = self.read_or_empty().await;
        worst_of(&samples).cloned()
    }

    /// Number of readable cached samples.
    pub async fn len(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.read_or_empty().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Deletes the cache file. Clearing an absent cache succeeds.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        store::remove_if_exists(&self.path).await
    }

    /// Returns the worst sample and empties the cache under a single lock.
    ///
    /// A sample appended concurrently lands either before the read (and is
    /// considered) or after the removal (and stays cached).
    pub async fn take_worst(&self) -> Result<Option<Sample>, StoreError> {
        let _guard = self.lock.lock().await;
        let samples = self.read_or_empty().await;
        store::remove_if_exists(&self.path).await?;
        debug!(cached = samples.len(), "Sample cache drained");
        Ok(worst_of(&samples).cloned())
    }

    async fn read_or_empty(&self) -> Vec<Sample> {
        match store::read_json::<Vec<Sample>>(&self.path).await {
            Ok(Some(samples)) => samples,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Sample cache unreadable, treating it as empty");
                Vec::new()
            }
        }
    }
}

/// Picks the sample with the highest `cpu_usage`; on a tie the later one wins.
pub fn worst_of(samples: &[Sample]) -> Option<&Sample> {
    samples.iter().fold(None, |worst, sample| match worst {
        Some(current) if sample.cpu_usage < current.cpu_usage => Some(current),
        _ => Some(sample),
    })
}
