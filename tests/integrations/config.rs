use nodeprobe::cli::Cli;
use nodeprobe::config::{Config, ConfigError, ReportMode};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", json).unwrap();
    file
}

fn cli_for(file: &NamedTempFile) -> Cli {
    Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let file = write_config(
        r#"{
            "master_address": "https://master.example.com",
            "node_id": 42,
            "node_secret": "s3cret",
            "log_level": "debug",
            "state": { "state_dir": "/var/lib/nodeprobe", "cache_file": "samples.json" },
            "schedule": {
                "sample_interval_secs": 5,
                "traffic_interval_secs": 15,
                "persist_interval_secs": 120,
                "submit_interval_secs": 30
            },
            "sampling": { "window_ms": 500, "disk_path": "/data" },
            "submission": {
                "endpoint_path": "/collect",
                "timeout_secs": 10,
                "max_retries": 4,
                "retry_delay_secs": 1
            },
            "report": { "mode": "live", "include_monthly_traffic": false },
            "metrics": { "log_metrics": true, "log_aggregation_seconds": 15 }
        }"#,
    );

    let config = Config::load(&cli_for(&file)).unwrap();

    assert_eq!(config.master_address, "https://master.example.com");
    assert_eq!(config.node_id, 42);
    assert_eq!(config.node_secret, "s3cret");
    assert_eq!(config.log_level, "debug");
    assert_eq!(
        config.state.cache_path(),
        PathBuf::from("/var/lib/nodeprobe/samples.json")
    );
    // Not in the file, so the default file name is kept.
    assert_eq!(
        config.state.traffic_path(),
        PathBuf::from("/var/lib/nodeprobe/monthly_traffic.json")
    );
    assert_eq!(config.schedule.sample_interval(), Duration::from_secs(5));
    assert_eq!(config.schedule.submit_interval(), Duration::from_secs(30));
    assert_eq!(config.sampling.window(), Duration::from_millis(500));
    assert_eq!(config.sampling.disk_path, PathBuf::from("/data"));
    assert_eq!(config.submission.endpoint_path, "/collect");
    assert_eq!(config.submission.max_retries, 4);
    assert_eq!(config.report.mode, ReportMode::Live);
    assert!(!config.report.include_monthly_traffic);
    assert!(config.metrics.log_metrics);
    assert_eq!(config.metrics.log_aggregation_seconds, 15);
}

#[test]
#[serial]
fn test_minimal_config_uses_defaults() {
    let file = write_config(
        r#"{"master_address": "http://10.0.0.1", "node_id": 1, "node_secret": "abc"}"#,
    );

    let config = Config::load(&cli_for(&file)).unwrap();

    assert_eq!(
        config,
        Config::with_identity("http://10.0.0.1", 1, "abc"),
        "only the identity should differ from the defaults"
    );
    assert_eq!(config.submission.endpoint_path, "/api/api.php");
    assert_eq!(config.submission.timeout_secs, 30);
    assert_eq!(config.submission.max_retries, 2);
    assert_eq!(config.submission.retry_delay_secs, 5);
    assert_eq!(config.schedule.sample_interval_secs, 10);
    assert_eq!(config.schedule.traffic_interval_secs, 30);
    assert_eq!(config.schedule.persist_interval_secs, 300);
    assert_eq!(config.schedule.submit_interval_secs, 60);
    assert_eq!(config.report.mode, ReportMode::WorstCached);
    assert!(config.report.include_monthly_traffic);
}

#[test]
#[serial]
fn test_missing_identity_field_is_an_error() {
    let file = write_config(r#"{"master_address": "http://10.0.0.1", "node_id": 1}"#);

    let err = Config::load(&cli_for(&file)).unwrap_err();
    assert!(format!("{:#}", err).contains("node_secret"), "{:#}", err);
}

#[test]
#[serial]
fn test_non_integer_node_id_is_an_error() {
    let file = write_config(
        r#"{"master_address": "http://10.0.0.1", "node_id": "one", "node_secret": "abc"}"#,
    );

    assert!(Config::load(&cli_for(&file)).is_err());
}

#[test]
#[serial]
fn test_malformed_json_is_an_error() {
    let file = write_config(r#"{"master_address": "http://10.0.0.1", "node_id": "#);

    assert!(Config::load(&cli_for(&file)).is_err());
}

#[test]
#[serial]
fn test_missing_file_is_not_found() {
    let cli = Cli {
        config: Some(PathBuf::from("/definitely/not/here/conf.json")),
        ..Default::default()
    };

    let err = Config::load(&cli).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::NotFound(PathBuf::from(
            "/definitely/not/here/conf.json"
        )))
    );
}

#[test]
#[serial]
fn test_invalid_master_address_is_rejected() {
    let file = write_config(
        r#"{"master_address": "ftp://10.0.0.1", "node_id": 1, "node_secret": "abc"}"#,
    );

    let err = Config::load(&cli_for(&file)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidMasterAddress(_))
    ));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"{
            "master_address": "http://10.0.0.1",
            "node_id": 1,
            "node_secret": "abc",
            "submission": { "max_retries": 1 }
        }"#,
    );

    std::env::set_var("NODEPROBE_SUBMISSION__MAX_RETRIES", "5");
    std::env::set_var("NODEPROBE_NODE_SECRET", "from-env");
    let result = Config::load(&cli_for(&file));
    std::env::remove_var("NODEPROBE_SUBMISSION__MAX_RETRIES");
    std::env::remove_var("NODEPROBE_NODE_SECRET");

    let config = result.unwrap();
    assert_eq!(config.submission.max_retries, 5);
    assert_eq!(config.node_secret, "from-env");
}

#[test]
#[serial]
fn test_cli_overrides_environment_and_file() {
    let file = write_config(
        r#"{
            "master_address": "http://10.0.0.1",
            "node_id": 1,
            "node_secret": "abc",
            "log_level": "warn",
            "state": { "state_dir": "/from/file", "cache_file": "kept.json" }
        }"#,
    );
    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        log_level: Some("trace".to_string()),
        master_address: Some("https://cli.example".to_string()),
        state_dir: Some(PathBuf::from("/from/cli")),
        log_metrics: true,
        once: false,
    };

    std::env::set_var("NODEPROBE_MASTER_ADDRESS", "http://env.example");
    let result = Config::load(&cli);
    std::env::remove_var("NODEPROBE_MASTER_ADDRESS");

    let config = result.unwrap();
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.master_address, "https://cli.example");
    assert_eq!(config.state.state_dir, PathBuf::from("/from/cli"));
    // Sibling keys of an overridden section survive the merge.
    assert_eq!(config.state.cache_file, "kept.json");
    assert!(config.metrics.log_metrics);
}
