use nodeprobe::app::App;
use nodeprobe::config::Config;
use nodeprobe::provider::test_utils::FakeMetricsProvider;
use nodeprobe::{InterfaceCounters, MonthlyTraffic};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(master_address: &str, dir: &TempDir) -> Config {
    let mut config = Config::with_identity(master_address, 3, "secret");
    config.state.state_dir = dir.path().to_path_buf();
    config.sampling.window_ms = 10;
    config.submission.retry_delay_secs = 0;
    config.submission.timeout_secs = 2;
    config.schedule.sample_interval_secs = 1;
    config.schedule.traffic_interval_secs = 1;
    config.schedule.persist_interval_secs = 60;
    config.schedule.submit_interval_secs = 60;
    config
}

async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_app_submits_on_start_and_persists_on_shutdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/api.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server.uri(), &dir);
    let traffic_path = config.state.traffic_path();
    let provider = FakeMetricsProvider::new();
    // Live samples read the counters too, so the exact split between tasks varies.
    for step in 0..20u64 {
        provider.push_counters(vec![InterfaceCounters::new("eth0", step * 1024 * 1024, 0)]);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config)
        .provider_override(Arc::new(provider.clone()))
        .build(shutdown_rx)
        .await
        .unwrap();

    // The state file is written as soon as the agent starts.
    assert!(traffic_path.exists());

    let server_ref = &server;
    let submitted = wait_for(
        move || async move { !server_ref.received_requests().await.unwrap().is_empty() },
        Duration::from_secs(3),
    )
    .await;
    assert!(submitted, "no report was submitted at start-up");

    let ctx = app.context();
    let ctx_ref = &ctx;
    let counted = wait_for(
        move || async move { ctx_ref.traffic().lock().await.totals().upload_mb > 0.0 },
        Duration::from_secs(4),
    )
    .await;
    assert!(counted, "traffic task never accumulated any traffic");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), app.run())
        .await
        .expect("app did not shut down")
        .unwrap();

    let persisted: MonthlyTraffic =
        serde_json::from_str(&std::fs::read_to_string(&traffic_path).unwrap()).unwrap();
    let in_memory = ctx.traffic().lock().await.totals().clone();
    assert!(persisted.upload_mb > 0.0);
    assert_eq!(persisted, in_memory);
}

#[tokio::test]
async fn test_samples_left_by_previous_run_are_not_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/api.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = fast_config(&server.uri(), &dir);
    std::fs::write(
        config.state.cache_path(),
        r#"[{"cpu_usage":99.0,"memory_usage":1.0,"upload_bandwidth":0.0,"download_bandwidth":0.0,"disk_usage":1.0,"timestamp":1600000000}]"#,
    )
    .unwrap();
    let provider = FakeMetricsProvider::new();
    provider.push_cpu(&[12.5]);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config)
        .provider_override(Arc::new(provider))
        .build(shutdown_rx)
        .await
        .unwrap();

    let server_ref = &server;
    let submitted = wait_for(
        move || async move { !server_ref.received_requests().await.unwrap().is_empty() },
        Duration::from_secs(3),
    )
    .await;
    assert!(submitted, "no report was submitted at start-up");

    let requests = server.received_requests().await.unwrap();
    let first: serde_json::Value = requests[0].body_json().unwrap();
    assert_ne!(first["node_load"]["cpu_usage"], 99.0);
    assert_ne!(first["timestamp"], 1_600_000_000);
    assert_eq!(first["node_load"]["cpu_usage"], 12.5);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), app.run())
        .await
        .expect("app did not shut down")
        .unwrap();
}

#[tokio::test]
async fn test_collection_fills_cache_between_submissions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(fast_config(&server.uri(), &dir))
        .provider_override(Arc::new(FakeMetricsProvider::new()))
        .build(shutdown_rx)
        .await
        .unwrap();
    let ctx = app.context();

    let ctx_ref = &ctx;
    let cached = wait_for(
        move || async move { ctx_ref.cache().len().await >= 1 },
        Duration::from_secs(4),
    )
    .await;
    assert!(cached, "collection task never appended a sample");
    // Exactly the immediate submission so far; the next one is a minute away.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), app.run())
        .await
        .expect("app did not shut down")
        .unwrap();
}

#[tokio::test]
async fn test_app_stops_promptly_when_already_shut_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(fast_config(&server.uri(), &dir))
        .provider_override(Arc::new(FakeMetricsProvider::new()))
        .build(shutdown_rx)
        .await
        .unwrap();

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), app.run())
        .await
        .expect("app did not shut down")
        .unwrap();
}
