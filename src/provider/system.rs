//! # System Metrics Provider
//!
//! `SysinfoProvider` reads host resource usage through the `sysinfo` crate.
//! CPU usage needs two refreshes separated by a measurement window, so the
//! shared `System` handle lives behind an async mutex that may be held across
//! that wait.

use crate::core::{CpuInfo, DiskStats, InterfaceCounters, MemoryStats, MetricsProvider};
use crate::provider::ProviderError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;
use tokio::time;
use tracing::trace;

/// A metrics provider backed by the local operating system.
pub struct SysinfoProvider {
    system: Mutex<System>,
    cpu_window: Duration,
}

impl SysinfoProvider {
    /// Creates a new `SysinfoProvider`.
    ///
    /// # Arguments
    /// * `cpu_window` - How long to observe the CPU for a usage reading. Values
    ///   below `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` are raised to it.
    pub fn new(cpu_window: Duration) -> Self {
        Self {
            system: Mutex::new(System::new()),
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn cpu_percent(&self) -> Result<f64, ProviderError> {
        let mut system = self.system.lock().await;
        system.refresh_cpu();
        time::sleep(self.cpu_window).await;
        system.refresh_cpu();

        if system.cpus().is_empty() {
            return Err(ProviderError::NoCpu);
        }
        Ok(system.global_cpu_info().cpu_usage() as f64)
    }

    async fn memory_stats(&self) -> Result<MemoryStats, ProviderError> {
        let mut system = self.system.lock().await;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(ProviderError::Memory);
        }
        Ok(MemoryStats {
            total_bytes: total,
            used_percent: percent(system.used_memory(), total),
        })
    }

    async fn disk_usage(&self, path: &Path) -> Result<DiskStats, ProviderError> {
        let disks = Disks::new_with_refreshed_list();

        // The filesystem holding `path` is the one with the longest matching mount point.
        let disk = disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .ok_or_else(|| ProviderError::DiskNotFound(path.display().to_string()))?;

        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        trace!(mount = %disk.mount_point().display(), total, used, "Disk usage read");
        Ok(DiskStats {
            total_bytes: total,
            used_percent: percent(used, total),
        })
    }

    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
        let networks = Networks::new_with_refreshed_list();
        let mut counters: Vec<InterfaceCounters> = networks
            .list()
            .iter()
            .map(|(name, data)| {
                InterfaceCounters::new(name.clone(), data.total_transmitted(), data.total_received())
            })
            .collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(counters)
    }

    async fn cpu_static_info(&self) -> Result<CpuInfo, ProviderError> {
        let mut system = self.system.lock().await;
        system.refresh_cpu();

        let cpus = system.cpus();
        let first = cpus.first().ok_or(ProviderError::NoCpu)?;
        Ok(CpuInfo {
            model_name: first.brand().trim().to_string(),
            cores: cpus.len(),
        })
    }
}
