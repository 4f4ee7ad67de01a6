//! A metrics recorder that periodically logs all captured metrics.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A metrics recorder that logs every counter and gauge at a fixed interval.
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    /// Creates a new `LoggingRecorder` and starts a background task to log metrics.
    ///
    /// # Arguments
    /// * `interval` - The interval at which to log the metrics.
    /// * `shutdown_rx` - Stops the logging task when it changes.
    pub fn new(interval: Duration, mut shutdown_rx: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(Registry::new(AtomicStorage));
        let recorder = Self {
            registry: registry.clone(),
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; nothing has been recorded yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => log_snapshot(&registry),
                    _ = shutdown_rx.changed() => {
                        log_snapshot(&registry);
                        tracing::debug!("Metrics logging task received shutdown signal.");
                        break;
                    }
                }
            }
        });

        (recorder, handle)
    }
}

fn log_snapshot(registry: &Registry<Key, AtomicStorage>) {
    for (key, counter) in registry.get_counter_handles() {
        tracing::info!("[Counter] {}: {}", key, counter.load(Ordering::Relaxed));
    }
    for (key, gauge) in registry.get_gauge_handles() {
        let value = f64::from_bits(gauge.load(Ordering::Relaxed));
        tracing::info!("[Gauge] {}: {:.2}", key, value);
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}
