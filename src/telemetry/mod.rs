// ABOUTME: Performance samples for every remote call and their aggregate statistics
// ABOUTME: Nearest-rank percentiles, access-type comparison, and interface performance scoring
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Performance Telemetry
//!
//! One immutable [`PerformanceMetric`] is appended per remote call. Fixed
//! interface executions are recorded by the registry together with the
//! interface counters; ad-hoc calls and capability queries go through
//! [`PerformanceTracker`].

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::constants::scoring::LATENCY_CEILING_MS;
use crate::database::{Database, MetricFilter};
use crate::errors::{AppError, AppResult};
use crate::models::{AccessType, AccessTypeComparison, PerformanceMetric, PerformanceStats};

/// Filter for [`PerformanceTracker::get_stats`]
#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    /// Restrict to one tool
    pub tool_id: Option<String>,
    /// Restrict to one operation
    pub operation_name: Option<String>,
    /// Restrict to one access type
    pub access_type: Option<AccessType>,
    /// Only samples from the last `window`; all history when `None`
    pub window: Option<Duration>,
}

/// Build a sample for a finished call
///
/// `error` is `None` for a successful call; its code becomes the error
/// category and its sanitized message is kept.
#[must_use]
pub fn build_metric(
    interface_id: Option<Uuid>,
    tool_id: &str,
    access_type: AccessType,
    operation_name: &str,
    elapsed: Duration,
    error: Option<&AppError>,
    metadata: Option<Value>,
) -> PerformanceMetric {
    PerformanceMetric {
        id: Uuid::new_v4(),
        interface_id,
        tool_id: tool_id.to_owned(),
        access_type,
        operation_name: operation_name.to_owned(),
        response_time_ms: i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        success: error.is_none(),
        error_category: error.map(|e| e.code.as_str().to_owned()),
        error_message: error.map(|e| e.message.clone()),
        metadata,
        timestamp: Utc::now(),
    }
}

/// Score in `[0, 100]`: 70% success rate, 30% latency below the ceiling
#[must_use]
pub fn performance_score(success_count: i64, execution_count: i64, average_ms: f64) -> f64 {
    if execution_count <= 0 {
        return 0.0;
    }
    let success_rate = (success_count as f64 / execution_count as f64).clamp(0.0, 1.0);
    let latency = (1.0 - average_ms.max(0.0) / LATENCY_CEILING_MS).max(0.0);
    100.0 * 0.3f64.mul_add(latency, 0.7 * success_rate)
}

/// Nearest-rank percentile of an ascending slice; 0 when empty
#[must_use]
pub fn percentile(sorted: &[i64], pct: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let len = sorted.len();
    let rank = (pct.clamp(0.0, 100.0) / 100.0 * len as f64).ceil() as usize;
    sorted[rank.clamp(1, len) - 1]
}

/// Aggregate `samples` into statistics labelled with the filter that produced them
#[must_use]
pub fn summarize(
    samples: &[PerformanceMetric],
    tool_id: Option<String>,
    operation_name: Option<String>,
    access_type: Option<AccessType>,
    window_start: Option<DateTime<Utc>>,
) -> PerformanceStats {
    let mut stats = PerformanceStats::empty(tool_id, operation_name, access_type, window_start);
    if samples.is_empty() {
        return stats;
    }

    let mut latencies: Vec<i64> = samples.iter().map(|s| s.response_time_ms).collect();
    latencies.sort_unstable();

    let mut error_breakdown = BTreeMap::new();
    for sample in samples.iter().filter(|s| !s.success) {
        let category = sample
            .error_category
            .clone()
            .unwrap_or_else(|| "unknown".to_owned());
        *error_breakdown.entry(category).or_insert(0u64) += 1;
    }

    let total = samples.len() as u64;
    let successful = samples.iter().filter(|s| s.success).count() as u64;
    let sum: f64 = latencies.iter().map(|&ms| ms as f64).sum();

    stats.total_calls = total;
    stats.successful_calls = successful;
    stats.success_rate = successful as f64 / total as f64;
    stats.avg_response_time_ms = sum / total as f64;
    stats.median_response_time_ms = percentile(&latencies, 50.0);
    stats.p95_response_time_ms = percentile(&latencies, 95.0);
    stats.p99_response_time_ms = percentile(&latencies, 99.0);
    stats.min_response_time_ms = latencies.first().copied().unwrap_or(0);
    stats.max_response_time_ms = latencies.last().copied().unwrap_or(0);
    stats.error_breakdown = error_breakdown;
    stats
}

/// Records and aggregates performance samples
#[derive(Clone)]
pub struct PerformanceTracker {
    database: Database,
}

impl PerformanceTracker {
    /// Create a tracker over the store
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    /// Append a sample that is not a fixed interface execution
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn record(&self, metric: &PerformanceMetric) -> AppResult<()> {
        self.database.insert_performance_metric(metric).await?;
        debug!(
            tool_id = %metric.tool_id,
            operation = %metric.operation_name,
            access_type = %metric.access_type,
            response_time_ms = metric.response_time_ms,
            success = metric.success,
            "Recorded performance sample"
        );
        Ok(())
    }

    /// Record an ad-hoc call made without a fixed interface
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn record_dynamic_call(
        &self,
        tool_id: &str,
        operation_name: &str,
        elapsed: Duration,
        error: Option<&AppError>,
    ) -> AppResult<PerformanceMetric> {
        let metric = build_metric(
            None,
            tool_id,
            AccessType::Dynamic,
            operation_name,
            elapsed,
            error,
            None,
        );
        self.record(&metric).await?;
        Ok(metric)
    }

    /// Record a capability query
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn record_discovery(
        &self,
        interface_id: Option<Uuid>,
        tool_id: &str,
        operation_name: &str,
        elapsed: Duration,
        error: Option<&AppError>,
    ) -> AppResult<PerformanceMetric> {
        let metric = build_metric(
            interface_id,
            tool_id,
            AccessType::Discovery,
            operation_name,
            elapsed,
            error,
            None,
        );
        self.record(&metric).await?;
        Ok(metric)
    }

    /// Statistics over the samples matching `query`
    ///
    /// # Errors
    ///
    /// Returns an error if the window is out of range or the query fails
    pub async fn get_stats(&self, query: &StatsQuery) -> AppResult<PerformanceStats> {
        let window_start = window_start(query.window)?;
        let samples = self
            .database
            .list_performance_metrics(&MetricFilter {
                tool_id: query.tool_id.clone(),
                interface_id: None,
                operation_name: query.operation_name.clone(),
                access_type: query.access_type,
                since: window_start,
            })
            .await?;

        Ok(summarize(
            &samples,
            query.tool_id.clone(),
            query.operation_name.clone(),
            query.access_type,
            window_start,
        ))
    }

    /// Statistics of one interface's executions
    ///
    /// # Errors
    ///
    /// Returns an error if the window is out of range or the query fails
    pub async fn get_interface_stats(
        &self,
        interface_id: Uuid,
        window: Option<Duration>,
    ) -> AppResult<PerformanceStats> {
        let window_start = window_start(window)?;
        let samples = self
            .database
            .list_performance_metrics(&MetricFilter {
                interface_id: Some(interface_id),
                access_type: Some(AccessType::Fixed),
                since: window_start,
                ..MetricFilter::default()
            })
            .await?;

        let tool_id = samples.first().map(|s| s.tool_id.clone());
        let operation_name = samples.first().map(|s| s.operation_name.clone());
        Ok(summarize(
            &samples,
            tool_id,
            operation_name,
            Some(AccessType::Fixed),
            window_start,
        ))
    }

    /// Fixed versus dynamic versus discovery latency for a tool
    ///
    /// `speedup` is `dynamic.avg / fixed.avg` when both have samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the window is out of range or the query fails
    pub async fn compare_access_types(
        &self,
        tool_id: &str,
        window: Option<Duration>,
    ) -> AppResult<AccessTypeComparison> {
        let window_start = window_start(window)?;
        let samples = self
            .database
            .list_performance_metrics(&MetricFilter {
                tool_id: Some(tool_id.to_owned()),
                since: window_start,
                ..MetricFilter::default()
            })
            .await?;

        let stats_for = |access_type: AccessType| {
            let subset: Vec<PerformanceMetric> = samples
                .iter()
                .filter(|s| s.access_type == access_type)
                .cloned()
                .collect();
            summarize(
                &subset,
                Some(tool_id.to_owned()),
                None,
                Some(access_type),
                window_start,
            )
        };
        let fixed = stats_for(AccessType::Fixed);
        let dynamic = stats_for(AccessType::Dynamic);
        let discovery = stats_for(AccessType::Discovery);

        let speedup = (fixed.total_calls > 0
            && dynamic.total_calls > 0
            && fixed.avg_response_time_ms > 0.0)
            .then(|| dynamic.avg_response_time_ms / fixed.avg_response_time_ms);

        Ok(AccessTypeComparison {
            tool_id: tool_id.to_owned(),
            window_start,
            fixed,
            dynamic,
            discovery,
            speedup,
        })
    }
}

fn window_start(window: Option<Duration>) -> AppResult<Option<DateTime<Utc>>> {
    window
        .map(|window| {
            chrono::Duration::from_std(window)
                .ok()
                .and_then(|window| Utc::now().checked_sub_signed(window))
                .ok_or_else(|| {
                    AppError::invalid_input("Stats window exceeds the supported date range")
                })
        })
        .transpose()
}
