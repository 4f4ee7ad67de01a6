//! Configuration management for nodeprobe
//!
//! This module defines the main `Config` struct and its sections. It uses the
//! `figment` crate to layer the JSON configuration file, `NODEPROBE_`-prefixed
//! environment variables and command-line flags, in that order of precedence.
//!
//! Only the node identity (`master_address`, `node_id`, `node_secret`) is
//! required; every other setting has a default.

use crate::cli::Cli;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "conf.json";

/// Upper bound for `submission.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// The main configuration struct for the agent.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the collector, e.g. `https://master.example.com`.
    pub master_address: String,
    /// Numeric node id assigned by the collector.
    pub node_id: i64,
    /// Shared secret authenticating this node.
    pub node_secret: String,
    /// The logging level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where local state files live.
    #[serde(default)]
    pub state: StateConfig,
    /// Periods of the recurring tasks.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// How samples are measured.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Delivery to the collector.
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// What goes into a report.
    #[serde(default)]
    pub report: ReportConfig,
    /// Internal metrics logging.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locations of the persisted state.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding the state files.
    pub state_dir: PathBuf,
    /// File name of the sample cache.
    pub cache_file: String,
    /// File name of the monthly traffic totals.
    pub traffic_file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            cache_file: "cache.json".to_string(),
            traffic_file: "monthly_traffic.json".to_string(),
        }
    }
}

impl StateConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.state_dir.join(&self.cache_file)
    }

    pub fn traffic_path(&self) -> PathBuf {
        self.state_dir.join(&self.traffic_file)
    }
}

/// Periods of the four recurring tasks, in seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub sample_interval_secs: u64,
    pub traffic_interval_secs: u64,
    pub persist_interval_secs: u64,
    pub submit_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 10,
            traffic_interval_secs: 30,
            persist_interval_secs: 300,
            submit_interval_secs: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn traffic_interval(&self) -> Duration {
        Duration::from_secs(self.traffic_interval_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    pub fn submit_interval(&self) -> Duration {
        Duration::from_secs(self.submit_interval_secs)
    }
}

/// Sample measurement settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Measurement window for CPU usage and bandwidth, in milliseconds.
    pub window_ms: u64,
    /// Path whose filesystem is reported as the node's disk.
    pub disk_path: PathBuf,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            disk_path: PathBuf::from("/"),
        }
    }
}

impl SamplingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Delivery settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Path of the report endpoint below `master_address`.
    pub endpoint_path: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts after the first failed one.
    pub max_retries: u32,
    /// Fixed wait between attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/api/api.php".to_string(),
            timeout_secs: 30,
            max_retries: 2,
            retry_delay_secs: 5,
        }
    }
}

/// Where the load figures of a report come from.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// The CPU-heaviest cached sample, or a live sample if the cache is empty.
    #[default]
    WorstCached,
    /// Always a fresh live sample.
    Live,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub mode: ReportMode,
    pub include_monthly_traffic: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            mode: ReportMode::WorstCached,
            include_monthly_traffic: true,
        }
    }
}

/// Configuration for internal metrics logging.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Log counters and gauges periodically.
    pub log_metrics: bool,
    /// Interval between two metrics log lines, in seconds.
    pub log_aggregation_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_metrics: false,
            log_aggregation_seconds: 60,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("master_address must be an http(s) URL, got {0:?}")]
    InvalidMasterAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("submission.max_retries must be at most {max}, got {got}")]
    TooManyRetries { max: u32, got: u32 },
}

impl Config {
    /// Loads the configuration by layering the file, the environment and the CLI.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path, cli)
    }

    fn load_from(path: &Path, cli: &Cli) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        let config: Config = Figment::new()
            .merge(Json::file(path))
            // e.g. NODEPROBE_SUBMISSION__MAX_RETRIES=5
            .merge(Env::prefixed("NODEPROBE_").split("__"))
            .merge(cli)
            .extract()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = self.master_address.trim();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(ConfigError::InvalidMasterAddress(self.master_address.clone()));
        }

        let intervals = [
            ("schedule.sample_interval_secs", self.schedule.sample_interval_secs),
            ("schedule.traffic_interval_secs", self.schedule.traffic_interval_secs),
            ("schedule.persist_interval_secs", self.schedule.persist_interval_secs),
            ("schedule.submit_interval_secs", self.schedule.submit_interval_secs),
            ("submission.timeout_secs", self.submission.timeout_secs),
            ("metrics.log_aggregation_seconds", self.metrics.log_aggregation_seconds),
        ];
        if let Some(&(name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroInterval(name));
        }

        if self.submission.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::TooManyRetries {
                max: MAX_RETRIES_LIMIT,
                got: self.submission.max_retries,
            });
        }
        Ok(())
    }

    /// Builds a configuration with default settings for the given identity.
    pub fn with_identity(master_address: &str, node_id: i64, node_secret: &str) -> Self {
        Self {
            master_address: master_address.to_string(),
            node_id,
            node_secret: node_secret.to_string(),
            log_level: default_log_level(),
            state: StateConfig::default(),
            schedule: ScheduleConfig::default(),
            sampling: SamplingConfig::default(),
            submission: SubmissionConfig::default(),
            report: ReportConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
