use async_trait::async_trait;
use chrono::{Local, TimeZone};
use nodeprobe::agent::AgentContext;
use nodeprobe::config::Config;
use nodeprobe::provider::test_utils::FakeMetricsProvider;
use nodeprobe::store;
use nodeprobe::submission::SubmitError;
use nodeprobe::traffic::{load_totals, TrafficAccumulator};
use nodeprobe::{month_key, InterfaceCounters, MonthlyTraffic, NodeReport, ReportSink};
use std::sync::Arc;
use tempfile::TempDir;

const MB: u64 = 1024 * 1024;

struct NullSink;

#[async_trait]
impl ReportSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn send(&self, _report: &NodeReport) -> Result<(), SubmitError> {
        Ok(())
    }
}

async fn context(dir: &TempDir, provider: &FakeMetricsProvider) -> (Config, AgentContext) {
    let mut config = Config::with_identity("http://127.0.0.1:9", 1, "s");
    config.state.state_dir = dir.path().to_path_buf();
    config.sampling.window_ms = 0;
    let ctx = AgentContext::new(&config, Arc::new(provider.clone()), Arc::new(NullSink)).await;
    (config, ctx)
}

#[tokio::test]
async fn test_physical_interfaces_are_summed_in_megabytes() {
    let dir = TempDir::new().unwrap();
    let provider = FakeMetricsProvider::new();
    provider.push_counters(vec![
        InterfaceCounters::new("eth0", 0, 0),
        InterfaceCounters::new("wlan0", 0, 0),
        InterfaceCounters::new("docker0", 0, 0),
    ]);
    provider.push_counters(vec![
        InterfaceCounters::new("eth0", 3 * MB, 10 * MB),
        InterfaceCounters::new("wlan0", MB, 2 * MB),
        InterfaceCounters::new("docker0", 500 * MB, 500 * MB),
    ]);
    let (_config, ctx) = context(&dir, &provider).await;

    let first = ctx.update_traffic().await.unwrap();
    assert_eq!(first.upload_mb, 0.0, "first snapshot only sets the baseline");

    let second = ctx.update_traffic().await.unwrap();
    assert_eq!(second.upload_mb, 4.0);
    assert_eq!(second.download_mb, 12.0);

    let traffic = ctx.traffic();
    let totals = traffic.lock().await.current(Local::now());
    assert_eq!(totals.upload_mb, 4.0);
    assert_eq!(totals.download_mb, 12.0);
}

#[tokio::test]
async fn test_counter_decrease_adds_current_raw_value() {
    let dir = TempDir::new().unwrap();
    let provider = FakeMetricsProvider::new();
    provider.push_counters(vec![InterfaceCounters::new("eth0", 100 * MB, 100 * MB)]);
    // Interface reset: counters restart from a small value.
    provider.push_counters(vec![InterfaceCounters::new("eth0", 2 * MB, 5 * MB)]);
    let (_config, ctx) = context(&dir, &provider).await;

    ctx.update_traffic().await.unwrap();
    let delta = ctx.update_traffic().await.unwrap();

    assert_eq!(delta.upload_mb, 2.0);
    assert_eq!(delta.download_mb, 5.0);
}

#[tokio::test]
async fn test_interfaces_missing_from_either_snapshot_are_ignored() {
    let dir = TempDir::new().unwrap();
    let provider = FakeMetricsProvider::new();
    provider.push_counters(vec![InterfaceCounters::new("eth0", 0, 0)]);
    provider.push_counters(vec![
        InterfaceCounters::new("eth0", MB, MB),
        InterfaceCounters::new("eth1", 50 * MB, 50 * MB),
    ]);
    let (_config, ctx) = context(&dir, &provider).await;

    ctx.update_traffic().await.unwrap();
    let delta = ctx.update_traffic().await.unwrap();

    assert_eq!(delta.upload_mb, 1.0);
    assert_eq!(delta.download_mb, 1.0);
}

#[test]
fn test_month_change_resets_totals_exactly_once() {
    let dir = TempDir::new().unwrap();
    let march = Local.with_ymd_and_hms(2025, 3, 31, 23, 59, 0).unwrap();
    let april = Local.with_ymd_and_hms(2025, 4, 1, 0, 1, 0).unwrap();
    let mut acc = TrafficAccumulator::new(
        dir.path().join("monthly_traffic.json"),
        MonthlyTraffic {
            month: "2025-03".to_string(),
            upload_mb: 700.0,
            download_mb: 900.0,
        },
    );

    acc.apply(vec![InterfaceCounters::new("eth0", 0, 0)], march);
    acc.apply(vec![InterfaceCounters::new("eth0", MB, MB)], march);
    assert_eq!(acc.totals().upload_mb, 701.0);

    let delta = acc.apply(vec![InterfaceCounters::new("eth0", 3 * MB, 2 * MB)], april);
    assert_eq!(delta.upload_mb, 2.0);
    let totals = acc.current(april);
    assert_eq!(totals.month, "2025-04");
    assert_eq!(totals.upload_mb, 2.0);
    assert_eq!(totals.download_mb, 1.0);

    // Later in the same month nothing is reset again.
    let later = Local.with_ymd_and_hms(2025, 4, 20, 12, 0, 0).unwrap();
    assert_eq!(acc.current(later).upload_mb, 2.0);
}

#[tokio::test]
async fn test_persisted_totals_survive_restart() {
    let dir = TempDir::new().unwrap();
    let provider = FakeMetricsProvider::new();
    provider.push_counters(vec![InterfaceCounters::new("eth0", 0, 0)]);
    provider.push_counters(vec![InterfaceCounters::new("eth0", 8 * MB, 16 * MB)]);
    let (config, ctx) = context(&dir, &provider).await;
    ctx.update_traffic().await.unwrap();
    ctx.update_traffic().await.unwrap();
    ctx.persist_traffic().await.unwrap();
    drop(ctx);

    let (_config, restarted) = context(&dir, &provider).await;
    let traffic = restarted.traffic();
    let totals = traffic.lock().await.current(Local::now());
    assert_eq!(totals.month, month_key(&Local::now()));
    assert_eq!(totals.upload_mb, 8.0);
    assert_eq!(totals.download_mb, 16.0);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.state.traffic_path()).unwrap())
            .unwrap();
    assert_eq!(raw["upload"], 8.0);
    assert_eq!(raw["download"], 16.0);
}

#[tokio::test]
async fn test_crash_before_rename_keeps_previous_file_valid() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monthly_traffic.json");
    let now = Local::now();
    let month = month_key(&now);

    let mut acc = TrafficAccumulator::new(
        &path,
        MonthlyTraffic {
            month: month.clone(),
            upload_mb: 12.5,
            download_mb: 25.0,
        },
    );
    acc.persist(now).await.unwrap();

    // A directory at the temp path makes the next write fail before the rename.
    std::fs::create_dir(store::temp_path(&path)).unwrap();
    acc.apply(vec![InterfaceCounters::new("eth0", 0, 0)], now);
    acc.apply(vec![InterfaceCounters::new("eth0", 10 * MB, 0)], now);
    assert!(acc.persist(now).await.is_err());

    let restored = load_totals(&path, &now).await;
    assert_eq!(restored.month, month);
    assert_eq!(restored.upload_mb, 12.5);
    assert_eq!(restored.download_mb, 25.0);
}

#[tokio::test]
async fn test_corrupt_or_stale_state_starts_at_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monthly_traffic.json");
    let now = Local::now();

    std::fs::write(&path, "{not json").unwrap();
    assert_eq!(load_totals(&path, &now).await, MonthlyTraffic::zeroed_for(&now));

    std::fs::write(&path, r#"{"month": "1999-01", "upload": 5.0, "download": 6.0}"#).unwrap();
    assert_eq!(load_totals(&path, &now).await, MonthlyTraffic::zeroed_for(&now));
}
