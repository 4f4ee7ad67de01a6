//! nodeprobe - A lightweight node telemetry agent
//!
//! This library samples host resource usage, accounts monthly network traffic
//! and periodically reports the node's state to a central collector.

pub mod agent;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod internal_metrics;
pub mod netfilter;
pub mod provider;
pub mod report;
pub mod sampling;
pub mod store;
pub mod submission;
pub mod task_manager;
pub mod traffic;

// Re-export core types for convenience
pub use core::*;
