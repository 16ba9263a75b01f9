// ABOUTME: Fixed interface record and the results of validating or executing one
// ABOUTME: DTOs for schema-diff classification and execution outcomes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::SemanticVersion;
use crate::errors::AppError;

/// A named, versioned, schema-validated snapshot of one remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedInterface {
    /// Unique interface identifier
    pub id: Uuid,
    /// Tool that owns this interface
    pub tool_id: String,
    /// Operation name, unique per tool
    pub name: String,
    /// Optional human-friendly name
    pub display_name: Option<String>,
    /// Optional description
    pub description: Option<String>,
    /// Schema of the request envelope that selects the operation
    pub operation_schema: Value,
    /// Schema the call parameters must satisfy
    pub parameters_schema: Value,
    /// Schema the response body is expected to satisfy
    pub response_schema: Value,
    /// Semantic version, non-decreasing per (tool, name)
    pub version: SemanticVersion,
    /// Soft-retirement flag
    pub is_active: bool,
    /// Outcome of the most recent validation against the live endpoint
    pub validation_status: ValidationStatus,
    /// Breaking changes found by the most recent failed validation
    pub validation_notes: Vec<SchemaChange>,
    /// When the interface was first registered
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
    /// When the stored schemas were last confirmed against the live endpoint
    pub last_validated: Option<DateTime<Utc>>,
    /// Latency-weighted success score in `[0, 100]`
    pub performance_score: f64,
    /// Number of recorded executions
    pub execution_count: i64,
    /// Number of successful executions
    pub success_count: i64,
    /// Rolling average latency in milliseconds
    pub average_response_time: f64,
}

impl FixedInterface {
    /// Fraction of executions that succeeded, `None` before the first execution
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.execution_count == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.execution_count as f64)
        }
    }

    /// Whether the schemas are due for re-validation
    ///
    /// An interface that has never been validated is stale once it is older
    /// than the interval.
    #[must_use]
    pub fn is_stale(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let reference = self.last_validated.unwrap_or(self.created_at);
        now - reference > interval
    }
}

/// Outcome of the last validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Never validated against the live endpoint
    #[default]
    Unknown,
    /// Live shape is compatible with the stored schemas
    Valid,
    /// Live shape has breaking differences; a human must decide on re-registration
    Invalid,
}

impl ValidationStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            other => Err(AppError::internal(format!(
                "Unknown validation status: {other}"
            ))),
        }
    }
}

/// What changed between a stored schema and the live one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Property present live but not stored
    PropertyAdded,
    /// Property stored but missing live
    PropertyRemoved,
    /// Declared `type` differs
    TypeChanged,
    /// Property is required live but was optional or absent
    BecameRequired,
    /// Property is optional live but was required
    BecameOptional,
}

/// Whether a change breaks calls built from the stored schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// Additive or relaxing change
    Compatible,
    /// Stored calls may now fail
    Breaking,
}

/// One classified schema difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    /// Which schema document (`parameters` or `response`)
    pub schema: String,
    /// Property path inside the document (`filter/limit`)
    pub path: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Classification
    pub compatibility: Compatibility,
    /// Human readable detail
    pub detail: String,
}

/// Result of comparing stored schemas with the live operation shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Validated interface
    pub interface_id: Uuid,
    /// True when no breaking change was found
    pub valid: bool,
    /// Resulting status
    pub status: ValidationStatus,
    /// Breaking differences
    pub breaking_changes: Vec<SchemaChange>,
    /// Compatible differences
    pub compatible_changes: Vec<SchemaChange>,
    /// When the validation ran
    pub validated_at: DateTime<Utc>,
    /// Time spent querying the live endpoint
    pub discovery_time_ms: u64,
}

/// Outcome of a successful fixed-interface execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Executed interface
    pub interface_id: Uuid,
    /// Owning tool
    pub tool_id: String,
    /// Operation name
    pub operation: String,
    /// Always true; failures are reported as errors after their metric is recorded
    pub success: bool,
    /// Remote response body
    pub data: Value,
    /// Wall-clock latency including retries
    pub response_time_ms: u64,
    /// Number of remote attempts made
    pub attempts: u32,
    /// Whether the interface is due for re-validation
    pub stale: bool,
    /// Whether the OAuth token was refreshed to serve this call
    pub auth_refreshed: bool,
    /// Identifier of the recorded performance sample
    pub metric_id: Uuid,
}
