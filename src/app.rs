//! The main application logic, decoupled from the entry point.

use crate::{
    agent::AgentContext,
    config::Config,
    core::{MetricsProvider, ReportSink},
    provider::SysinfoProvider,
    submission::HttpReportSink,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A handle to the running agent, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    context: Arc<AgentContext>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn context(&self) -> Arc<AgentContext> {
        self.context.clone()
    }

    /// Waits for the shutdown signal, stops all tasks and persists the traffic totals.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        // Persistence failures are already logged by the context.
        let _ = self.context.persist_traffic().await;
        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Production builds talk to the OS through sysinfo and to the collector over
/// HTTP; tests swap either side through the overrides.
pub struct AppBuilder {
    config: Config,
    provider_override: Option<Arc<dyn MetricsProvider>>,
    sink_override: Option<Arc<dyn ReportSink>>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            provider_override: None,
            sink_override: None,
        }
    }

    /// Overrides the metrics provider for testing.
    pub fn provider_override(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    /// Overrides the report sink for testing.
    pub fn sink_override(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Builds only the shared context, without spawning any task.
    pub async fn build_context(self) -> Result<AgentContext> {
        let provider = match self.provider_override {
            Some(provider) => provider,
            None => Arc::new(SysinfoProvider::new(self.config.sampling.window())),
        };
        let sink: Arc<dyn ReportSink> = match self.sink_override {
            Some(sink) => sink,
            None => Arc::new(
                HttpReportSink::new(
                    &self.config.master_address,
                    &self.config.submission.endpoint_path,
                    Duration::from_secs(self.config.submission.timeout_secs),
                )
                .context("failed to create HTTP report sink")?,
            ),
        };
        Ok(AgentContext::new(&self.config, provider, sink).await)
    }

    /// Builds the context and starts the four recurring tasks.
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let schedule = self.config.schedule.clone();
        let context = Arc::new(self.build_context().await?);
        let task_manager = TaskManager::new(shutdown_rx);

        // Write the loaded (or freshly zeroed) totals so the file exists from the start.
        let _ = context.persist_traffic().await;

        let ctx = context.clone();
        spawn_periodic(
            &task_manager,
            "SampleCollector",
            schedule.sample_interval(),
            false,
            move || {
                let ctx = ctx.clone();
                async move { ctx.collect_sample().await }
            },
        );

        let ctx = context.clone();
        spawn_periodic(
            &task_manager,
            "TrafficAccumulator",
            schedule.traffic_interval(),
            true,
            move || {
                let ctx = ctx.clone();
                async move {
                    let _ = ctx.update_traffic().await;
                }
            },
        );

        let ctx = context.clone();
        spawn_periodic(
            &task_manager,
            "TrafficPersister",
            schedule.persist_interval(),
            false,
            move || {
                let ctx = ctx.clone();
                async move {
                    let _ = ctx.persist_traffic().await;
                }
            },
        );

        let ctx = context.clone();
        spawn_periodic(
            &task_manager,
            "ReportSubmitter",
            schedule.submit_interval(),
            true,
            move || {
                let ctx = ctx.clone();
                async move {
                    ctx.run_submission_cycle().await;
                }
            },
        );

        info!(
            tasks = task_manager.task_count(),
            "Agent started. Collecting and reporting metrics..."
        );

        Ok(App {
            task_manager,
            context,
        })
    }
}

/// Runs `action` every `period` until shutdown.
///
/// With `immediate` the first run happens at once, otherwise after one period.
/// A run is never interrupted by shutdown; the loop exits before the next one.
fn spawn_periodic<F, Fut>(
    task_manager: &TaskManager,
    name: &'static str,
    period: Duration,
    immediate: bool,
    mut action: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut shutdown_rx = task_manager.get_shutdown_rx();
    task_manager.spawn(name, async move {
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(task = name, period_secs = period.as_secs_f64(), immediate, "Task started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                res = shutdown_rx.changed() => {
                    if res.is_err() {
                        warn!(task = name, "Shutdown channel closed");
                    }
                    break;
                }
                _ = ticker.tick() => action().await,
            }
        }
        debug!(task = name, "Task finished");
    });
}
