use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use xattr_sync::engine::ChecksumCheck;
use xattr_sync::load_config::{default_config, load_config, ENDPOINTS_ENV, WORKERS_ENV};
use xattr_sync::sink::LogRotation;

fn clear_env() {
    env::remove_var(WORKERS_ENV);
    env::remove_var(ENDPOINTS_ENV);
}

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

/// A full config file is parsed field by field.
#[tokio::test]
#[serial]
async fn test_load_config_reads_every_section() {
    clear_env();
    let file = config_file(
        r#"
endpoints:
  - "https://provider-a.example"
  - "https://provider-b.example"
workers: 12
request_timeout_secs: 5
checksum_check: warn
retry:
  max_attempts: 4
  initial_backoff_ms: 10
  max_backoff_ms: 100
  jitter: false
confirmation_log:
  dir: ./tmp/logs
  prefix: confirmed
  rotation: hourly
failure_log:
  dir: ./tmp/error-logs
  prefix: failed
buckets:
  mnk21: bucket-mnk
  bn25: bucket-bn
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.endpoints.len(), 2);
    assert_eq!(config.workers, 12);
    assert_eq!(config.request_timeout(), Duration::from_secs(5));
    assert_eq!(config.checksum_check, ChecksumCheck::Warn);

    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, Some(4));
    assert_eq!(policy.initial_backoff, Duration::from_millis(10));
    assert!(!policy.jitter);

    assert_eq!(config.confirmation_log.dir, PathBuf::from("./tmp/logs"));
    assert_eq!(config.confirmation_log.rotation, LogRotation::Hourly);
    assert_eq!(config.confirmation_log.suffix, "txt");
    assert_eq!(config.failure_log.rotation, LogRotation::Daily);

    let table = config.bucket_table();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("bn25"), Some("bucket-bn"));
    assert_eq!(table.get("nac"), None);
}

/// Omitted sections fall back to the built-in defaults.
#[tokio::test]
#[serial]
async fn test_load_config_partial_file_keeps_defaults() {
    clear_env();
    let file = config_file("workers: 3\nretry:\n  max_attempts: null\n");

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.workers, 3);
    assert_eq!(config.retry.max_attempts, None);
    assert_eq!(config.endpoints.len(), 2);
    assert_eq!(config.checksum_check, ChecksumCheck::Enforce);
    assert_eq!(config.bucket_table().get("mnk21"), Some("bucket-mnk"));
    assert_eq!(config.confirmation_log.prefix, "confirmed");
}

#[tokio::test]
#[serial]
async fn test_load_config_empty_file_is_default() {
    clear_env();
    let file = config_file("");

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config, default_config().unwrap());
}

/// Env vars take precedence over the file.
#[tokio::test]
#[serial]
async fn test_load_config_env_overrides_file() {
    clear_env();
    let file = config_file("workers: 3\nendpoints: [\"https://from-file.example\"]\n");
    env::set_var(WORKERS_ENV, "7");
    env::set_var(ENDPOINTS_ENV, "https://a.example, https://b.example,");

    let config = load_config(file.path());
    clear_env();
    let config = config.expect("Config should load");

    assert_eq!(config.workers, 7);
    assert_eq!(
        config.endpoints,
        vec!["https://a.example".to_string(), "https://b.example".to_string()]
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_rejects_bad_worker_env() {
    clear_env();
    env::set_var(WORKERS_ENV, "many");

    let err = default_config().unwrap_err();
    clear_env();

    let msg = err.to_string();
    assert!(msg.contains(WORKERS_ENV), "got: {msg}");
}

/// Validation runs after parsing.
#[tokio::test]
#[serial]
async fn test_load_config_rejects_invalid_values() {
    clear_env();
    for yaml in [
        "endpoints: []\n",
        "workers: 0\n",
        "buckets: {}\n",
        "retry:\n  max_attempts: 0\n",
    ] {
        let file = config_file(yaml);
        let err = load_config(file.path()).unwrap_err();
        assert!(
            err.to_string().contains("configuration error"),
            "yaml {yaml:?} gave: {err}"
        );
    }
}

/// This test ensures that if the config file is not valid YAML, load_config errors and reports as such.
#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    clear_env();
    let file = config_file("not-yaml: [:::");

    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_missing_file() {
    clear_env();
    let err = load_config("/nonexistent/xattr-sync.yaml").unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
