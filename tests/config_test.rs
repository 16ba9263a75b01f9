// ABOUTME: Tests for environment configuration, retry policy, and version parsing
// ABOUTME: Environment tests run serially since they mutate process-wide variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serial_test::serial;

use toolpin::config::ToolpinConfig;
use toolpin::errors::{AppError, ErrorCode};
use toolpin::logging::LogFormat;
use toolpin::models::SemanticVersion;
use toolpin::retry::{with_retry, RetryPolicy};

const VARS: &[&str] = &[
    "TOOLPIN_DATA_DIR",
    "TOOLPIN_DATABASE_URL",
    "TOOLPIN_MASTER_KEY",
    "TOOLPIN_MASTER_KEY_PATH",
    "TOOLPIN_TOOLS_FILE",
    "TOOLPIN_REQUEST_TIMEOUT_SECS",
    "TOOLPIN_MAX_RETRIES",
    "TOOLPIN_RETRY_BASE_DELAY_MS",
    "TOOLPIN_REFRESH_THRESHOLD_SECS",
    "TOOLPIN_MANUAL_AUTH_TIMEOUT_SECS",
    "TOOLPIN_VALIDATION_INTERVAL_HOURS",
    "TOOLPIN_REFRESH_INTERVAL_SECS",
    "TOOLPIN_KDF_MEMORY_KIB",
    "TOOLPIN_KDF_ITERATIONS",
    "TOOLPIN_LOG_FORMAT",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_live_under_the_data_dir() {
    clear_env();
    std::env::set_var("TOOLPIN_DATA_DIR", "/tmp/toolpin-test");

    let config = ToolpinConfig::from_env().unwrap();

    assert_eq!(config.database_url, "sqlite:/tmp/toolpin-test/toolpin.db");
    assert_eq!(
        config.master_key_path,
        std::path::PathBuf::from("/tmp/toolpin-test/master.key")
    );
    assert_eq!(
        config.tools_file,
        std::path::PathBuf::from("/tmp/toolpin-test/tools.json")
    );
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.refresh_threshold, Duration::from_secs(300));
    assert_eq!(config.manual_auth_timeout, Duration::from_secs(600));
    assert_eq!(config.validation_interval, Duration::from_secs(24 * 3600));
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.log_format, LogFormat::Pretty);
    assert!(config.master_key_override.is_none());
    clear_env();
}

#[test]
#[serial]
fn test_overrides_are_parsed() {
    clear_env();
    std::env::set_var("TOOLPIN_DATA_DIR", "/tmp/toolpin-test");
    std::env::set_var("TOOLPIN_DATABASE_URL", "sqlite::memory:");
    std::env::set_var("TOOLPIN_REQUEST_TIMEOUT_SECS", "5");
    std::env::set_var("TOOLPIN_MAX_RETRIES", "0");
    std::env::set_var("TOOLPIN_VALIDATION_INTERVAL_HOURS", "1");
    std::env::set_var("TOOLPIN_LOG_FORMAT", "JSON");
    std::env::set_var("TOOLPIN_MASTER_KEY", "c2VjcmV0");

    let config = ToolpinConfig::from_env().unwrap();

    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.registry_settings().request_timeout, Duration::from_secs(5));
    assert_eq!(config.registry_settings().retry.max_attempts(), 1);
    assert_eq!(config.validation_interval, Duration::from_secs(3600));
    assert_eq!(config.log_format, LogFormat::Json);
    assert!(!format!("{config:?}").contains("c2VjcmV0"));
    clear_env();
}

#[test]
#[serial]
fn test_malformed_value_names_the_variable() {
    clear_env();
    std::env::set_var("TOOLPIN_DATA_DIR", "/tmp/toolpin-test");
    std::env::set_var("TOOLPIN_REQUEST_TIMEOUT_SECS", "soon");

    let error = ToolpinConfig::from_env().unwrap_err();

    assert_eq!(error.code, ErrorCode::ConfigError);
    assert!(error.message.contains("TOOLPIN_REQUEST_TIMEOUT_SECS"));
    clear_env();
}

#[test]
#[serial]
fn test_unusable_kdf_cost_is_rejected() {
    clear_env();
    std::env::set_var("TOOLPIN_DATA_DIR", "/tmp/toolpin-test");
    std::env::set_var("TOOLPIN_KDF_MEMORY_KIB", "1");

    assert_eq!(
        ToolpinConfig::from_env().unwrap_err().code,
        ErrorCode::ConfigError
    );
    clear_env();
}

#[test]
fn test_backoff_doubles_up_to_the_cap() {
    let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    assert_eq!(policy.max_attempts(), 6);
    assert_eq!(RetryPolicy::none().max_attempts(), 1);
}

#[tokio::test]
async fn test_retry_stops_on_success() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));

    let retried = with_retry(policy, "test", |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err(AppError::timeout("slow"))
            } else {
                Ok(attempt)
            }
        }
    })
    .await;

    assert_eq!(retried.result.unwrap(), 3);
    assert_eq!(retried.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_policy_and_on_permanent_errors() {
    let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));

    let retried: toolpin::retry::Retried<()> =
        with_retry(policy, "test", |_| async { Err(AppError::network("down")) }).await;
    assert_eq!(retried.attempts, 3);
    assert_eq!(retried.result.unwrap_err().code, ErrorCode::NetworkError);

    let retried: toolpin::retry::Retried<()> = with_retry(policy, "test", |_| async {
        Err(AppError::upstream(Some(400), "bad request"))
    })
    .await;
    assert_eq!(retried.attempts, 1);
}

#[test]
fn test_semantic_version_parsing_and_ordering() {
    let version: SemanticVersion = "v1.2.3".parse().unwrap();
    assert_eq!(version, SemanticVersion::new(1, 2, 3));
    assert_eq!(version.to_string(), "1.2.3");
    assert_eq!(version.bump_patch(), SemanticVersion::new(1, 2, 4));
    assert!(SemanticVersion::new(1, 10, 0) > SemanticVersion::new(1, 9, 9));
    assert_eq!(SemanticVersion::default(), SemanticVersion::INITIAL);

    for bad in ["1.2", "1.2.x", "1.-2.3", ""] {
        let error = bad.parse::<SemanticVersion>().unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidInput, "{bad}");
    }
}
