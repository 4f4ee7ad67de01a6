//! nodeprobe - node telemetry agent
//!
//! Samples CPU, memory, disk and bandwidth, keeps monthly traffic totals and
//! reports to the collector configured in `conf.json`.

use anyhow::Result;
use clap::Parser;
use nodeprobe::{
    agent::CycleOutcome,
    app::App,
    cli::Cli,
    config::Config,
    internal_metrics::install_logging_recorder,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("nodeprobe starting up...");

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Master Address: {}", config.master_address);
    info!("Node ID: {}", config.node_id);
    info!("Endpoint Path: {}", config.submission.endpoint_path);
    info!("State Directory: {}", config.state.state_dir.display());
    info!(
        "Intervals: sample {}s, traffic {}s, persist {}s, submit {}s",
        config.schedule.sample_interval_secs,
        config.schedule.traffic_interval_secs,
        config.schedule.persist_interval_secs,
        config.schedule.submit_interval_secs
    );
    info!("Sampling Window: {}ms", config.sampling.window_ms);
    info!("Disk Path: {}", config.sampling.disk_path.display());
    info!(
        "Retries: {} (delay {}s, timeout {}s)",
        config.submission.max_retries,
        config.submission.retry_delay_secs,
        config.submission.timeout_secs
    );
    info!("Report Mode: {:?}", config.report.mode);
    info!(
        "Monthly Traffic In Report: {}",
        config.report.include_monthly_traffic
    );
    info!("Log Metrics: {}", config.metrics.log_metrics);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = None;
    if config.metrics.log_metrics {
        info!(
            "Logging recorder enabled. Metrics will be printed every {} seconds.",
            config.metrics.log_aggregation_seconds
        );
        metrics_task = Some(install_logging_recorder(
            Duration::from_secs(config.metrics.log_aggregation_seconds),
            shutdown_rx.clone(),
        )?);
    }

    if cli.once {
        // A single cycle has no traffic baseline, so only the persisted totals are reported.
        let context = App::builder(config).build_context().await?;
        let outcome = context.run_submission_cycle().await;
        let _ = context.persist_traffic().await;
        let _ = shutdown_tx.send(true);
        if let Some(handle) = metrics_task {
            let _ = handle.await;
        }
        return match outcome {
            CycleOutcome::Delivered { .. } => Ok(()),
            CycleOutcome::Dropped { attempts, .. } => {
                Err(anyhow::anyhow!("report dropped after {attempts} attempts"))
            }
            CycleOutcome::Aborted(e) => Err(anyhow::anyhow!("submission cycle aborted: {e}")),
        };
    }

    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received. Shutting down gracefully..."),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}. Shutting down.", e),
        }
        let _ = shutdown_tx.send(true);
    });

    app.run().await?;

    if let Some(handle) = metrics_task {
        if let Err(e) = handle.await {
            error!("Metrics task panicked: {:?}", e);
        }
    }

    info!("Exiting.");
    Ok(())
}
