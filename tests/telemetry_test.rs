// ABOUTME: Tests for performance scoring, percentile aggregation, and windowed statistics
// ABOUTME: Samples are written through the tracker into an in-memory store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::time::Duration;

use chrono::Utc;

use common::test_database;
use toolpin::errors::{AppError, ErrorCode};
use toolpin::models::{AccessType, PerformanceMetric};
use toolpin::telemetry::{
    build_metric, percentile, performance_score, summarize, PerformanceTracker, StatsQuery,
};

fn sample(access_type: AccessType, millis: u64, error: Option<&AppError>) -> PerformanceMetric {
    build_metric(
        None,
        "weather",
        access_type,
        "forecast",
        Duration::from_millis(millis),
        error,
        None,
    )
}

#[test]
fn test_percentile_uses_nearest_rank() {
    let sorted: Vec<i64> = (1..=100).collect();
    assert_eq!(percentile(&sorted, 50.0), 50);
    assert_eq!(percentile(&sorted, 95.0), 95);
    assert_eq!(percentile(&sorted, 99.0), 99);
    assert_eq!(percentile(&sorted, 0.0), 1);
    assert_eq!(percentile(&[42], 99.0), 42);
    assert_eq!(percentile(&[], 50.0), 0);
}

#[test]
fn test_performance_score_weights_success_and_latency() {
    assert!((performance_score(10, 10, 0.0) - 100.0).abs() < 1e-9);
    assert!((performance_score(10, 10, 5_000.0) - 70.0).abs() < 1e-9);
    assert!((performance_score(0, 10, 0.0) - 30.0).abs() < 1e-9);
    assert!((performance_score(5, 10, 2_500.0) - 50.0).abs() < 1e-9);
    assert!(performance_score(0, 0, 10.0).abs() < f64::EPSILON);
    assert!(performance_score(3, 3, 60_000.0) >= 0.0);
}

#[test]
fn test_summary_of_mixed_samples() {
    let timeout = AppError::timeout("slow");
    let samples = vec![
        sample(AccessType::Fixed, 10, None),
        sample(AccessType::Fixed, 30, None),
        sample(AccessType::Fixed, 20, None),
        sample(AccessType::Fixed, 200, Some(&timeout)),
        sample(AccessType::Fixed, 5, Some(&AppError::validation("bad", Vec::new()))),
    ];

    let stats = summarize(&samples, Some("weather".to_owned()), None, None, None);

    assert_eq!(stats.total_calls, 5);
    assert_eq!(stats.successful_calls, 3);
    assert!((stats.success_rate - 0.6).abs() < 1e-9);
    assert!((stats.avg_response_time_ms - 53.0).abs() < 1e-9);
    assert_eq!(stats.median_response_time_ms, 20);
    assert_eq!(stats.min_response_time_ms, 5);
    assert_eq!(stats.max_response_time_ms, 200);
    assert_eq!(stats.error_breakdown.get("timeout"), Some(&1));
    assert_eq!(stats.error_breakdown.get("validation_failed"), Some(&1));
}

#[test]
fn test_empty_summary_is_zeroed() {
    let stats = summarize(&[], None, None, Some(AccessType::Dynamic), None);
    assert_eq!(stats.total_calls, 0);
    assert!(stats.success_rate.abs() < f64::EPSILON);
    assert!(stats.error_breakdown.is_empty());
}

#[test]
fn test_failed_sample_keeps_code_and_message() {
    let error = AppError::network("Tool endpoint unreachable").with_cause("secret detail");
    let metric = sample(AccessType::Dynamic, 12, Some(&error));

    assert!(!metric.success);
    assert_eq!(metric.error_category.as_deref(), Some("network_error"));
    assert_eq!(metric.error_message.as_deref(), Some("Tool endpoint unreachable"));
    assert_eq!(metric.response_time_ms, 12);
}

#[tokio::test]
async fn test_stats_filter_by_access_type_and_window() {
    let tracker = PerformanceTracker::new(test_database().await);

    let mut old = sample(AccessType::Dynamic, 900, None);
    old.timestamp = Utc::now() - chrono::Duration::hours(3);
    tracker.record(&old).await.unwrap();
    tracker
        .record_dynamic_call("weather", "forecast", Duration::from_millis(40), None)
        .await
        .unwrap();
    tracker
        .record_discovery(None, "weather", "forecast", Duration::from_millis(15), None)
        .await
        .unwrap();
    tracker
        .record_dynamic_call("news", "headlines", Duration::from_millis(70), None)
        .await
        .unwrap();

    let all_dynamic = tracker
        .get_stats(&StatsQuery {
            tool_id: Some("weather".to_owned()),
            access_type: Some(AccessType::Dynamic),
            ..StatsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(all_dynamic.total_calls, 2);

    let recent = tracker
        .get_stats(&StatsQuery {
            tool_id: Some("weather".to_owned()),
            access_type: Some(AccessType::Dynamic),
            window: Some(Duration::from_secs(3600)),
            ..StatsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.total_calls, 1);
    assert_eq!(recent.max_response_time_ms, 40);
    assert!(recent.window_start.is_some());

    let by_operation = tracker
        .get_stats(&StatsQuery {
            operation_name: Some("headlines".to_owned()),
            ..StatsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(by_operation.total_calls, 1);

    let comparison = tracker
        .compare_access_types("weather", Some(Duration::from_secs(3600)))
        .await
        .unwrap();
    assert_eq!(comparison.dynamic.total_calls, 1);
    assert_eq!(comparison.discovery.total_calls, 1);
    assert_eq!(comparison.fixed.total_calls, 0);
    assert!(comparison.speedup.is_none());
}

#[tokio::test]
async fn test_window_beyond_the_calendar_is_invalid_input() {
    let tracker = PerformanceTracker::new(test_database().await);

    for window in [Duration::from_secs(100_000_000_000_000), Duration::MAX] {
        let error = tracker
            .get_stats(&StatsQuery {
                window: Some(window),
                ..StatsQuery::default()
            })
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::InvalidInput);
    }

    let error = tracker
        .compare_access_types("weather", Some(Duration::from_secs(100_000_000_000_000)))
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);
}
