//! Process-wide agent state and the work each recurring task performs.
//!
//! An [`AgentContext`] is built once at start-up and shared as `Arc` by the
//! collection, traffic, persistence and submission tasks.

use crate::cache::SampleCache;
use crate::config::{Config, ReportConfig, ReportMode, SamplingConfig};
use crate::core::{MetricsProvider, MonthlyTraffic, ReportSink, Sample};
use crate::provider::ProviderError;
use crate::report::{build_report, HostInfo, NodeIdentity};
use crate::sampling::capture_sample;
use crate::store::StoreError;
use crate::submission::{RetryPolicy, SubmitError, Submitter};
use crate::traffic::{save_totals, SharedTraffic, TrafficAccumulator, TrafficDelta};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// How a submission cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The collector accepted the report.
    Delivered { attempts: u32, fallback: bool },
    /// Every attempt failed and the report was discarded.
    Dropped { attempts: u32, fallback: bool },
    /// No report could be built.
    Aborted(ProviderError),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Delivered { .. } => "delivered",
            CycleOutcome::Dropped { .. } => "dropped",
            CycleOutcome::Aborted(_) => "aborted",
        }
    }
}

/// Shared state of a running agent.
pub struct AgentContext {
    identity: NodeIdentity,
    sampling: SamplingConfig,
    report: ReportConfig,
    provider: Arc<dyn MetricsProvider>,
    cache: SampleCache,
    traffic: SharedTraffic,
    // Keeps state file writes in snapshot order without holding `traffic`.
    persist_lock: Mutex<()>,
    submitter: Submitter,
}

impl AgentContext {
    /// Builds the context, loading the persisted monthly totals.
    ///
    /// Samples left in the cache by a previous process are discarded, so the
    /// agent always starts with an empty cache.
    pub async fn new(
        config: &Config,
        provider: Arc<dyn MetricsProvider>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let traffic = TrafficAccumulator::load(config.state.traffic_path(), Local::now()).await;
        let cache = SampleCache::new(config.state.cache_path());
        let stale = cache.len().await;
        match cache.clear().await {
            Ok(()) => debug!(discarded = stale, "Sample cache reset at start-up"),
            Err(e) => error!(error = %e, "Failed to reset sample cache at start-up"),
        }
        let policy = RetryPolicy {
            max_retries: config.submission.max_retries,
            delay: Duration::from_secs(config.submission.retry_delay_secs),
        };

        Self {
            identity: NodeIdentity {
                node_id: config.node_id,
                node_secret: config.node_secret.clone(),
            },
            sampling: config.sampling.clone(),
            report: config.report.clone(),
            provider,
            cache,
            traffic: Arc::new(Mutex::new(traffic)),
            persist_lock: Mutex::new(()),
            submitter: Submitter::new(sink, policy),
        }
    }

    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    pub fn traffic(&self) -> SharedTraffic {
        self.traffic.clone()
    }

    async fn live_sample(&self) -> Result<Sample, ProviderError> {
        capture_sample(
            self.provider.as_ref(),
            &self.sampling.disk_path,
            self.sampling.window(),
        )
        .await
    }

    /// Takes one sample and appends it to the cache.
    pub async fn collect_sample(&self) {
        let sample = match self.live_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                metrics::counter!("samples_collected_total", "status" => "failure").increment(1);
                warn!(error = %e, "Failed to collect sample");
                return;
            }
        };

        match self.cache.append(sample).await {
            Ok(len) => {
                metrics::counter!("samples_collected_total", "status" => "success").increment(1);
                metrics::gauge!("sample_cache_entries").set(len as f64);
                debug!(cached = len, "Sample cached");
            }
            Err(e) => {
                metrics::counter!("samples_collected_total", "status" => "failure").increment(1);
                error!(error = %e, "Failed to write sample cache");
            }
        }
    }

    /// Folds a fresh counter snapshot into the monthly totals.
    pub async fn update_traffic(&self) -> Result<TrafficDelta, ProviderError> {
        let snapshot = match self.provider.interface_counters().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                metrics::counter!("traffic_updates_total", "status" => "failure").increment(1);
                warn!(error = %e, "Failed to read interface counters");
                return Err(e);
            }
        };

        let mut traffic = self.traffic.lock().await;
        let delta = traffic.apply(snapshot, Local::now());
        let totals = traffic.totals();
        metrics::counter!("traffic_updates_total", "status" => "success").increment(1);
        metrics::gauge!("monthly_upload_mb").set(totals.upload_mb);
        metrics::gauge!("monthly_download_mb").set(totals.download_mb);
        debug!(
            upload_mb = delta.upload_mb,
            download_mb = delta.download_mb,
            month = %totals.month,
            "Traffic updated"
        );
        Ok(delta)
    }

    /// Writes the monthly totals to disk.
    pub async fn persist_traffic(&self) -> Result<MonthlyTraffic, StoreError> {
        let _write = self.persist_lock.lock().await;
        let (path, totals) = {
            let mut traffic = self.traffic.lock().await;
            (traffic.path().to_path_buf(), traffic.current(Local::now()))
        };
        let result = save_totals(&path, &totals).await.map(|()| totals);
        match &result {
            Ok(totals) => {
                metrics::counter!("traffic_persists_total", "status" => "success").increment(1);
                debug!(
                    month = %totals.month,
                    upload_mb = totals.upload_mb,
                    download_mb = totals.download_mb,
                    "Traffic persisted"
                );
            }
            Err(e) => {
                metrics::counter!("traffic_persists_total", "status" => "failure").increment(1);
                error!(error = %e, "Failed to persist monthly traffic");
            }
        }
        result
    }

    /// Builds and submits one report, then clears the sample cache.
    ///
    /// The worst sample is taken and the cache drained under one lock. The
    /// cache is cleared again once the cycle ends, whatever the outcome, so
    /// samples are reported at most once.
    #[instrument(skip_all, fields(node_id = self.identity.node_id))]
    pub async fn run_submission_cycle(&self) -> CycleOutcome {
        let outcome = self.submission_cycle().await;

        if let Err(e) = self.cache.clear().await {
            error!(error = %e, "Failed to clear sample cache");
        }
        metrics::gauge!("sample_cache_entries").set(0.0);
        metrics::counter!("submission_cycles_total", "outcome" => outcome.label()).increment(1);

        match &outcome {
            CycleOutcome::Delivered { attempts, fallback } => {
                info!(attempts, fallback, "Submission cycle finished")
            }
            CycleOutcome::Dropped { attempts, fallback } => {
                warn!(attempts, fallback, "Submission cycle dropped the report")
            }
            CycleOutcome::Aborted(e) => warn!(error = %e, "Submission cycle aborted"),
        }
        outcome
    }

    async fn submission_cycle(&self) -> CycleOutcome {
        let cached = match self.report.mode {
            ReportMode::WorstCached => match self.cache.take_worst().await {
                Ok(sample) => sample,
                Err(e) => {
                    error!(error = %e, "Failed to drain sample cache");
                    None
                }
            },
            ReportMode::Live => None,
        };
        let fallback = cached.is_none();
        let load = match cached {
            Some(sample) => sample,
            None => {
                debug!("No cached sample, taking a live one");
                match self.live_sample().await {
                    Ok(sample) => sample,
                    Err(e) => return CycleOutcome::Aborted(e),
                }
            }
        };

        let host = match HostInfo::gather(self.provider.as_ref(), &self.sampling.disk_path).await {
            Ok(host) => host,
            Err(e) => return CycleOutcome::Aborted(e),
        };

        let traffic = if self.report.include_monthly_traffic {
            Some(self.traffic.lock().await.current(Local::now()))
        } else {
            None
        };

        let report = build_report(&self.identity, &host, &load, traffic);
        let result = self.submitter.submit(&report).await;
        if result.delivered {
            CycleOutcome::Delivered {
                attempts: result.attempts,
                fallback,
            }
        } else {
            if let Some(SubmitError::Status { status, body }) = &result.last_error {
                debug!(status, body = %body, "Last collector response");
            }
            CycleOutcome::Dropped {
                attempts: result.attempts,
                fallback,
            }
        }
    }
}
