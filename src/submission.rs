//! Delivery of reports to the collector.
//!
//! [`HttpReportSink`] performs a single POST; [`Submitter`] wraps any
//! [`ReportSink`] with the fixed-delay retry policy.

use crate::core::{NodeReport, ReportSink};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("report sink failed: {0}")]
    Sink(String),
}

/// Joins the master address and the endpoint path into the report URL.
pub fn report_url(master_address: &str, endpoint_path: &str) -> String {
    format!(
        "{}/{}",
        master_address.trim_end_matches('/'),
        endpoint_path.trim_start_matches('/')
    )
}

/// A sink that POSTs the report as JSON.
pub struct HttpReportSink {
    client: reqwest::Client,
    url: String,
}

impl HttpReportSink {
    /// Creates a new `HttpReportSink`.
    ///
    /// # Arguments
    /// * `master_address` - Base URL of the collector
    /// * `endpoint_path` - Path of the report endpoint, e.g. `/api/api.php`
    /// * `timeout` - Timeout for a whole request
    pub fn new(
        master_address: &str,
        endpoint_path: &str,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: report_url(master_address, endpoint_path),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, report: &NodeReport) -> Result<(), SubmitError> {
        let response = self.client.post(&self.url).json(report).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, "Collector accepted report");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SubmitError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// How often and how patiently a report is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Fixed wait between two attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

/// Result of one submission.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub attempts: u32,
    pub delivered: bool,
    pub last_error: Option<SubmitError>,
}

/// Sends reports through a sink, retrying on failure.
pub struct Submitter {
    sink: Arc<dyn ReportSink>,
    policy: RetryPolicy,
}

impl Submitter {
    pub fn new(sink: Arc<dyn ReportSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `report`, stopping at the first success or after `1 + max_retries` attempts.
    #[instrument(skip_all, fields(sink = self.sink.name(), node_id = report.node_id))]
    pub async fn submit(&self, report: &NodeReport) -> SubmitOutcome {
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.sink.send(report).await {
                Ok(()) => {
                    metrics::counter!("submission_attempts_total", "outcome" => "success")
                        .increment(1);
                    info!(attempt, "Report delivered");
                    return SubmitOutcome {
                        attempts: attempt,
                        delivered: true,
                        last_error: None,
                    };
                }
                Err(e) => {
                    metrics::counter!("submission_attempts_total", "outcome" => "failure")
                        .increment(1);
                    warn!(attempt, max_attempts, error = %e, "Report delivery failed");
                    last_error = Some(e);

                    if attempt < max_attempts {
                        debug!(delay_ms = self.policy.delay.as_millis() as u64, "Retrying after delay");
                        sleep(self.policy.delay).await;
                    }
                }
            }
        }

        warn!(attempts = max_attempts, "Giving up on report, it will be dropped");
        SubmitOutcome {
            attempts: max_attempts,
            delivered: false,
            last_error,
        }
    }
}
