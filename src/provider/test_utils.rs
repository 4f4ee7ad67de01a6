use crate::{
    core::{CpuInfo, DiskStats, InterfaceCounters, MemoryStats, MetricsProvider},
    provider::ProviderError,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Scriptable metrics provider for testing
#[derive(Clone)]
pub struct FakeMetricsProvider {
    state: Arc<Mutex<FakeState>>,
}

struct FakeState {
    cpu: VecDeque<f64>,
    last_cpu: f64,
    memory: MemoryStats,
    disk: DiskStats,
    // Queued snapshots; the last one is repeated once the queue runs dry.
    counters: VecDeque<Vec<InterfaceCounters>>,
    last_counters: Vec<InterfaceCounters>,
    cpu_info: CpuInfo,
    failing: bool,
    call_count: HashMap<&'static str, u32>,
}

impl Default for FakeMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMetricsProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                cpu: VecDeque::new(),
                last_cpu: 10.0,
                memory: MemoryStats {
                    total_bytes: 8 * 1024 * 1024 * 1024,
                    used_percent: 50.0,
                },
                disk: DiskStats {
                    total_bytes: 100 * 1024 * 1024 * 1024,
                    used_percent: 25.0,
                },
                counters: VecDeque::new(),
                last_counters: Vec::new(),
                cpu_info: CpuInfo {
                    model_name: "Fake CPU @ 3.00GHz".to_string(),
                    cores: 4,
                },
                failing: false,
                call_count: HashMap::new(),
            })),
        }
    }

    /// Queue CPU readings; the last one is repeated once the queue runs dry.
    pub fn push_cpu(&self, values: &[f64]) {
        let mut state = self.state.lock().unwrap();
        state.cpu.extend(values.iter().copied());
    }

    pub fn set_memory(&self, total_bytes: u64, used_percent: f64) {
        self.state.lock().unwrap().memory = MemoryStats {
            total_bytes,
            used_percent,
        };
    }

    pub fn set_disk(&self, total_bytes: u64, used_percent: f64) {
        self.state.lock().unwrap().disk = DiskStats {
            total_bytes,
            used_percent,
        };
    }

    /// Queue an interface counter snapshot
    pub fn push_counters(&self, snapshot: Vec<InterfaceCounters>) {
        self.state.lock().unwrap().counters.push_back(snapshot);
    }

    /// Make every call fail with `ProviderError::Unavailable` until reset.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Get the number of times a provider method was called
    pub fn get_call_count(&self, method: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.call_count.get(method).copied().unwrap_or(0)
    }

    fn enter(&self, method: &'static str) -> Result<std::sync::MutexGuard<'_, FakeState>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        *state.call_count.entry(method).or_insert(0) += 1;
        if state.failing {
            return Err(ProviderError::Unavailable(format!("{method} is failing")));
        }
        Ok(state)
    }
}

#[async_trait]
impl MetricsProvider for FakeMetricsProvider {
    async fn cpu_percent(&self) -> Result<f64, ProviderError> {
        let mut state = self.enter("cpu_percent")?;
        if let Some(value) = state.cpu.pop_front() {
            state.last_cpu = value;
        }
        Ok(state.last_cpu)
    }

    async fn memory_stats(&self) -> Result<MemoryStats, ProviderError> {
        Ok(self.enter("memory_stats")?.memory)
    }

    async fn disk_usage(&self, _path: &Path) -> Result<DiskStats, ProviderError> {
        Ok(self.enter("disk_usage")?.disk)
    }

    async fn interface_counters(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
        let mut state = self.enter("interface_counters")?;
        if let Some(snapshot) = state.counters.pop_front() {
            state.last_counters = snapshot;
        }
        Ok(state.last_counters.clone())
    }

    async fn cpu_static_info(&self) -> Result<CpuInfo, ProviderError> {
        Ok(self.enter("cpu_static_info")?.cpu_info.clone())
    }
}
