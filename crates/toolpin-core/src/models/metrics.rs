// ABOUTME: Performance samples recorded per remote call and their aggregates
// ABOUTME: AccessType, PerformanceMetric, PerformanceStats, and access-type comparison
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;

/// How a remote operation was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Through a registered fixed interface
    Fixed,
    /// Ad-hoc call that discovered the operation on the fly
    Dynamic,
    /// Capability query against the live endpoint
    Discovery,
}

impl AccessType {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Dynamic => "dynamic",
            Self::Discovery => "discovery",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "dynamic" => Ok(Self::Dynamic),
            "discovery" => Ok(Self::Discovery),
            other => Err(AppError::invalid_input(format!(
                "Unknown access type '{other}': expected fixed, dynamic or discovery"
            ))),
        }
    }
}

/// One immutable performance sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// Sample identifier
    pub id: Uuid,
    /// Interface that served the call; `None` for non-fixed access or after interface removal
    pub interface_id: Option<Uuid>,
    /// Tool that was called
    pub tool_id: String,
    /// How the operation was reached
    pub access_type: AccessType,
    /// Operation name
    pub operation_name: String,
    /// Wall-clock latency in milliseconds
    pub response_time_ms: i64,
    /// Whether the call succeeded
    pub success: bool,
    /// Error category (`validation_failed`, `network_error`, ...) on failure
    pub error_category: Option<String>,
    /// Sanitized error message on failure
    pub error_message: Option<String>,
    /// Free-form context (attempt count, discovery timing)
    pub metadata: Option<Value>,
    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,
}

/// Aggregate of the samples matching a filter over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Tool filter applied, if any
    pub tool_id: Option<String>,
    /// Operation filter applied, if any
    pub operation_name: Option<String>,
    /// Access type filter applied, if any
    pub access_type: Option<AccessType>,
    /// Start of the window, `None` for all history
    pub window_start: Option<DateTime<Utc>>,
    /// Number of samples
    pub total_calls: u64,
    /// Number of successful samples
    pub successful_calls: u64,
    /// `successful_calls / total_calls`, 0 when there are no samples
    pub success_rate: f64,
    /// Mean latency in milliseconds
    pub avg_response_time_ms: f64,
    /// Median latency
    pub median_response_time_ms: i64,
    /// 95th percentile latency
    pub p95_response_time_ms: i64,
    /// 99th percentile latency
    pub p99_response_time_ms: i64,
    /// Fastest sample
    pub min_response_time_ms: i64,
    /// Slowest sample
    pub max_response_time_ms: i64,
    /// Failure count per error category
    pub error_breakdown: BTreeMap<String, u64>,
}

impl PerformanceStats {
    /// Stats with no samples for the given filter
    #[must_use]
    pub const fn empty(
        tool_id: Option<String>,
        operation_name: Option<String>,
        access_type: Option<AccessType>,
        window_start: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            tool_id,
            operation_name,
            access_type,
            window_start,
            total_calls: 0,
            successful_calls: 0,
            success_rate: 0.0,
            avg_response_time_ms: 0.0,
            median_response_time_ms: 0,
            p95_response_time_ms: 0,
            p99_response_time_ms: 0,
            min_response_time_ms: 0,
            max_response_time_ms: 0,
            error_breakdown: BTreeMap::new(),
        }
    }
}

/// Fixed versus dynamic versus discovery latency for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTypeComparison {
    /// Tool compared
    pub tool_id: String,
    /// Start of the window, `None` for all history
    pub window_start: Option<DateTime<Utc>>,
    /// Calls through fixed interfaces
    pub fixed: PerformanceStats,
    /// Ad-hoc calls
    pub dynamic: PerformanceStats,
    /// Capability queries
    pub discovery: PerformanceStats,
    /// `dynamic.avg / fixed.avg` when both have samples
    pub speedup: Option<f64>,
}
