//! Core domain types and service traits for nodeprobe
//!
//! This module defines the data structures that flow through the sampling,
//! accounting and submission pipeline, and the trait contracts for the two
//! external collaborators: the metrics provider and the report sink.

use crate::provider::ProviderError;
use crate::submission::SubmitError;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of bytes in one megabyte, as used for every MB figure the agent reports.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A single point-in-time resource usage reading.
///
/// The serialized form is the element type of the on-disk sample cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// CPU usage in percent across all cores
    pub cpu_usage: f64,
    /// Memory usage in percent
    pub memory_usage: f64,
    /// Upload throughput in MB/s over the measurement window
    pub upload_bandwidth: f64,
    /// Download throughput in MB/s over the measurement window
    pub download_bandwidth: f64,
    /// Usage of the monitored disk in percent
    pub disk_usage: f64,
    /// When the sample was taken, stored as unix seconds
    #[serde(rename = "timestamp", with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,
}

/// Cumulative byte counters of one network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

impl InterfaceCounters {
    pub fn new(name: impl Into<String>, bytes_sent: u64, bytes_recv: u64) -> Self {
        Self {
            name: name.into(),
            bytes_sent,
            bytes_recv,
        }
    }
}

/// Network traffic accumulated during one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyTraffic {
    /// Calendar month in `YYYY-MM` form
    pub month: String,
    /// Uploaded megabytes
    #[serde(rename = "upload")]
    pub upload_mb: f64,
    /// Downloaded megabytes
    #[serde(rename = "download")]
    pub download_mb: f64,
}

impl MonthlyTraffic {
    /// Zero totals for the given month.
    pub fn zeroed(month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
            upload_mb: 0.0,
            download_mb: 0.0,
        }
    }

    /// Zero totals for the month containing `now`.
    pub fn zeroed_for(now: &DateTime<Local>) -> Self {
        Self::zeroed(month_key(now))
    }
}

/// Formats the calendar month of `now` as `YYYY-MM`.
pub fn month_key(now: &DateTime<Local>) -> String {
    now.format("%Y-%m").to_string()
}

/// Static hardware description of the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub cpu_model: String,
    /// Total memory in MB
    pub memory_size: f64,
    /// Total disk size in MB
    pub disk_size: f64,
}

/// The load figures carried in a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeLoad {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub upload_bandwidth: f64,
    pub download_bandwidth: f64,
    pub disk_usage: f64,
}

impl From<&Sample> for NodeLoad {
    fn from(sample: &Sample) -> Self {
        Self {
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            upload_bandwidth: sample.upload_bandwidth,
            download_bandwidth: sample.download_bandwidth,
            disk_usage: sample.disk_usage,
        }
    }
}

/// The body POSTed to the collector once per submission cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeReport {
    pub node_id: i64,
    pub node_secret: String,
    pub node_config: NodeConfig,
    pub node_load: NodeLoad,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_traffic: Option<MonthlyTraffic>,
    /// Capture time of the sample the load was taken from, in unix seconds
    pub timestamp: i64,
}

/// Memory totals reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_percent: f64,
}

/// Usage of the filesystem backing a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskStats {
    pub total_bytes: u64,
    pub used_percent: f64,
}

/// Static CPU description.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuInfo {
    pub model_name: String,
    pub cores: usize,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Source of raw OS metrics.
///
/// Every call returns a complete value or an error, never partial data.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// CPU usage in percent, measured over a short window.
    async fn cpu_percent(&self) -> Result<f64, ProviderError>;

    async fn memory_stats(&self) -> Result<MemoryStats, ProviderError>;

    /// Usage of the filesystem that `path` lives on.
    async fn disk_usage(&self, path: &Path) -> Result<DiskStats, ProviderError>;

    /// Cumulative byte counters for every interface the OS reports.
    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError>;

    async fn cpu_static_info(&self) -> Result<CpuInfo, ProviderError>;
}

/// Delivers a report to the remote collector
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// A short name for logs (e.g. "http").
    fn name(&self) -> &str;

    /// Performs a single delivery attempt.
    ///
    /// # Returns
    /// * `Ok(())` if the collector accepted the report
    /// * `Err` on transport failure or a non-success status
    async fn send(&self, report: &NodeReport) -> Result<(), SubmitError>;
}
