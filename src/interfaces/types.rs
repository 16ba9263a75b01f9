// ABOUTME: Inputs and outputs of fixed interface registry operations
// ABOUTME: Registration, update, execution options, listings, and revalidation reports
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ErrorPayload;
use crate::models::{FixedInterface, PerformanceStats, SemanticVersion, ValidationResult};

/// Data for a new or re-registered interface
///
/// Missing schemas default to the `tools/call` envelope for `name`, an
/// object parameters schema, and an accept-anything response schema, unless
/// auto-discovery supplies them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterInterfaceRequest {
    /// Owning tool
    pub tool_id: String,
    /// Operation name
    pub name: String,
    /// Human-friendly name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Operation selector schema
    #[serde(default)]
    pub operation_schema: Option<Value>,
    /// Parameters schema
    #[serde(default)]
    pub parameters_schema: Option<Value>,
    /// Response schema
    #[serde(default)]
    pub response_schema: Option<Value>,
    /// Explicit version; re-registration bumps the patch number when absent
    #[serde(default)]
    pub version: Option<SemanticVersion>,
}

/// Flags for [`register`](super::FixedInterfaceRegistry::register)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Overwrite an existing interface with the same name, keeping its id
    pub force: bool,
    /// Require the tool to resolve and advertise the operation
    pub validate_tool: bool,
    /// Fill missing schemas from a live capability query
    pub auto_discover: bool,
    /// Return the would-be record without persisting it
    pub dry_run: bool,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInterfaceRequest {
    /// New display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// New description
    #[serde(default)]
    pub description: Option<String>,
    /// New operation selector schema
    #[serde(default)]
    pub operation_schema: Option<Value>,
    /// New parameters schema
    #[serde(default)]
    pub parameters_schema: Option<Value>,
    /// New response schema
    #[serde(default)]
    pub response_schema: Option<Value>,
    /// New version, never lower than the current one
    #[serde(default)]
    pub version: Option<SemanticVersion>,
}

/// Flags for [`execute`](super::FixedInterfaceRegistry::execute)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Deadline per remote attempt; the configured default when `None`
    pub timeout: Option<Duration>,
    /// Validate the response body against the response schema
    pub validate_response: bool,
    /// Retries for network failures; the configured default when `None`
    pub retry_attempts: Option<u32>,
    /// Allow executing a retired interface
    pub force: bool,
}

/// Interface record with derived read-path fields
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    /// The stored record
    #[serde(flatten)]
    pub interface: FixedInterface,
    /// Due for re-validation
    pub stale: bool,
    /// Fraction of successful executions
    pub success_rate: Option<f64>,
}

/// Statistics of one interface
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceStats {
    /// The interface
    pub interface: InterfaceSummary,
    /// Aggregate of its execution samples
    pub stats: PerformanceStats,
}

/// Interface that could not be re-validated
#[derive(Debug, Clone, Serialize)]
pub struct RevalidationFailure {
    /// Interface id
    pub interface_id: Uuid,
    /// Owning tool
    pub tool_id: String,
    /// Operation name
    pub name: String,
    /// Why validation failed
    pub error: ErrorPayload,
}

/// Outcome of re-validating every stale interface
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevalidationReport {
    /// Interfaces validated, compatible or not
    pub validated: Vec<ValidationResult>,
    /// Interfaces whose validation could not run
    pub failed: Vec<RevalidationFailure>,
}

/// Outcome of an ad-hoc call that discovered the operation first
#[derive(Debug, Clone, Serialize)]
pub struct DynamicCallResult {
    /// Tool called
    pub tool_id: String,
    /// Operation called
    pub operation: String,
    /// Remote response body
    pub data: Value,
    /// Wall-clock latency including discovery
    pub response_time_ms: u64,
    /// Time spent on the capability query
    pub discovery_time_ms: u64,
    /// Identifier of the recorded performance sample
    pub metric_id: Uuid,
}
