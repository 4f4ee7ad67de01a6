//! Metrics providers.
//!
//! The agent only talks to the [`MetricsProvider`] trait. [`SysinfoProvider`]
//! is the production implementation; a scriptable fake is available to tests
//! through the `test-utils` feature.

pub mod system;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use thiserror::Error;

pub use crate::core::MetricsProvider;
pub use system::SysinfoProvider;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no CPU information available")]
    NoCpu,

    #[error("memory statistics unavailable")]
    Memory,

    #[error("no mounted disk found for {0}")]
    DiskNotFound(String),

    #[error("metrics provider unavailable: {0}")]
    Unavailable(String),
}
