//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the agent using the
//! `clap` crate. Flags that map onto configuration keys are merged on top of
//! the config file and environment through the figment `Provider` impl.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// A lightweight node telemetry agent.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file (defaults to `conf.json`).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Override the collector base URL.
    #[arg(long, value_name = "URL")]
    pub master_address: Option<String>,

    /// Directory for the sample cache and traffic state.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Periodically log internal metrics.
    #[arg(long)]
    pub log_metrics: bool,

    /// Run a single submission cycle and exit.
    #[arg(long)]
    pub once: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(address) = &self.master_address {
            dict.insert("master_address".into(), Value::from(address.clone()));
        }

        if let Some(dir) = &self.state_dir {
            let mut state = Dict::new();
            state.insert(
                "state_dir".into(),
                Value::from(dir.to_string_lossy().into_owned()),
            );
            dict.insert("state".into(), Value::Dict(Tag::Default, state));
        }

        // Only an explicit flag overrides; absence keeps the file's setting.
        if self.log_metrics {
            let mut metrics = Dict::new();
            metrics.insert("log_metrics".into(), Value::from(true));
            dict.insert("metrics".into(), Value::Dict(Tag::Default, metrics));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
