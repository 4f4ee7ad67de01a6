//! Assembly of the outbound [`NodeReport`].

use crate::core::{
    MetricsProvider, MonthlyTraffic, NodeConfig, NodeLoad, NodeReport, Sample, BYTES_PER_MB,
};
use crate::provider::ProviderError;
use std::path::Path;

/// Who the node is, as configured.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeIdentity {
    pub node_id: i64,
    pub node_secret: String,
}

/// Static host description sent with every report.
#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    pub cpu_model: String,
    pub memory_mb: f64,
    pub disk_mb: f64,
}

impl HostInfo {
    /// Queries the provider for the CPU model, memory size and disk size.
    pub async fn gather(
        provider: &dyn MetricsProvider,
        disk_path: &Path,
    ) -> Result<Self, ProviderError> {
        let cpu = provider.cpu_static_info().await?;
        let memory = provider.memory_stats().await?;
        let disk = provider.disk_usage(disk_path).await?;

        Ok(Self {
            cpu_model: cpu.model_name,
            memory_mb: memory.total_bytes as f64 / BYTES_PER_MB,
            disk_mb: disk.total_bytes as f64 / BYTES_PER_MB,
        })
    }
}

/// Combines the load sample, traffic totals and static data into a report.
///
/// The report timestamp is the capture time of `load`.
pub fn build_report(
    identity: &NodeIdentity,
    host: &HostInfo,
    load: &Sample,
    traffic: Option<MonthlyTraffic>,
) -> NodeReport {
    NodeReport {
        node_id: identity.node_id,
        node_secret: identity.node_secret.clone(),
        node_config: NodeConfig {
            cpu_model: host.cpu_model.clone(),
            memory_size: host.memory_mb,
            disk_size: host.disk_mb,
        },
        node_load: NodeLoad::from(load),
        monthly_traffic: traffic,
        timestamp: load.captured_at.timestamp(),
    }
}
