// ABOUTME: Unified error taxonomy for toolpin with typed error codes
// ABOUTME: Provides AppError, field violations, and the structured OperationResponse envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Error Handling
//!
//! Every fallible operation in toolpin returns [`AppResult`]. An [`AppError`]
//! carries a closed [`ErrorCode`], a message that is safe to show to the
//! operator, and optionally the full list of field violations (for validation
//! failures) or a manual-intervention payload (for authorization failures).
//!
//! The underlying cause of an error (a driver message, a provider response) is
//! kept in a private field. It is available to internal logging through
//! [`AppError::internal_cause`] but never rendered by `Display` or serialized,
//! so secret material that may appear in a cause does not cross the process
//! boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ManualIntervention;

/// Result type used throughout toolpin
pub type AppResult<T> = Result<T, AppError>;

/// Closed set of error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Schema or parameter mismatch; carries every violation
    ValidationFailed,
    /// Unique-constraint violation
    Conflict,
    /// Unknown tool, interface, configuration, or authorization state
    #[serde(rename = "not_found")]
    ResourceNotFound,
    /// No valid credential is available for the tool
    AuthRequired,
    /// Credential refresh failed and a new login is required
    AuthExpired,
    /// Transport failure reaching a remote endpoint
    NetworkError,
    /// Remote call exceeded its deadline
    Timeout,
    /// Remote endpoint answered with a structured failure
    UpstreamError,
    /// Caller supplied an unusable argument
    InvalidInput,
    /// Configuration value missing or malformed
    ConfigError,
    /// Persistence layer failure
    DatabaseError,
    /// Unexpected internal failure
    InternalError,
}

impl ErrorCode {
    /// Whether an operation failing with this code may succeed if retried
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError | Self::Timeout)
    }

    /// Stable machine-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::Conflict => "conflict",
            Self::ResourceNotFound => "not_found",
            Self::AuthRequired => "auth_required",
            Self::AuthExpired => "auth_expired",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::UpstreamError => "upstream_error",
            Self::InvalidInput => "invalid_input",
            Self::ConfigError => "config_error",
            Self::DatabaseError => "database_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violated constraint, named by the field it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// JSON pointer-like path of the offending field (`query`, `filter/limit`)
    pub field: String,
    /// Human readable description of the violated constraint
    pub message: String,
}

impl FieldViolation {
    /// Create a new violation
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Unified application error
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// Error category
    pub code: ErrorCode,
    /// Sanitized message
    pub message: String,
    /// Every violated constraint (validation failures only)
    pub violations: Vec<FieldViolation>,
    /// Resume instructions when a human must complete an authorization step
    pub manual_intervention: Option<ManualIntervention>,
    /// HTTP status reported by a remote endpoint, if any
    pub upstream_status: Option<u16>,
    cause: Option<String>,
}

impl AppError {
    /// Create a new error with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            violations: Vec::new(),
            manual_intervention: None,
            upstream_status: None,
            cause: None,
        }
    }

    /// Persistence failure
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Unexpected internal failure
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Unusable caller input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Unknown resource
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    /// Unique-constraint violation
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation failure listing every violation
    #[must_use]
    pub fn validation(message: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        let mut error = Self::new(ErrorCode::ValidationFailed, message);
        error.violations = violations;
        error
    }

    /// No valid credential available
    #[must_use]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, message)
    }

    /// Refresh failed, re-authentication required
    #[must_use]
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthExpired, message)
    }

    /// Transport failure (retryable)
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Deadline exceeded (retryable)
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Structured remote failure
    #[must_use]
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorCode::UpstreamError, message);
        error.upstream_status = status;
        error
    }

    /// Configuration problem
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Attach a manual-intervention payload
    #[must_use]
    pub fn with_manual_intervention(mut self, intervention: ManualIntervention) -> Self {
        self.manual_intervention = Some(intervention);
        self
    }

    /// Attach an internal cause that is never rendered to the operator
    #[must_use]
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Internal cause for diagnostics
    #[must_use]
    pub fn internal_cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Whether retrying the failed operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Names of every field mentioned by the violations
    #[must_use]
    pub fn violated_fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

impl From<uuid::Error> for AppError {
    fn from(error: uuid::Error) -> Self {
        Self::invalid_input("Invalid identifier format").with_cause(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal("JSON serialization failed").with_cause(error)
    }
}

/// Serializable error summary for the command surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error category
    pub code: ErrorCode,
    /// Sanitized message
    pub message: String,
    /// Every violated constraint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
    /// Whether the caller may retry
    pub retryable: bool,
}

impl From<&AppError> for ErrorPayload {
    fn from(error: &AppError) -> Self {
        Self {
            code: error.code,
            message: error.message.clone(),
            violations: error.violations.clone(),
            retryable: error.is_retryable(),
        }
    }
}

/// Structured result returned across the process boundary
///
/// Exactly one of `data` or `error` is set. A manual-intervention payload may
/// accompany either: on success it is a pending authorization step, on failure
/// it explains how to obtain the missing credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Operation output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Typed error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    /// Pending human step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_intervention: Option<ManualIntervention>,
}

impl<T> OperationResponse<T> {
    /// Successful response
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            manual_intervention: None,
        }
    }

    /// Failed response
    #[must_use]
    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorPayload::from(error)),
            manual_intervention: error.manual_intervention.clone(),
        }
    }

    /// Attach a manual-intervention payload to a response
    #[must_use]
    pub fn with_manual_intervention(mut self, intervention: Option<ManualIntervention>) -> Self {
        self.manual_intervention = intervention;
        self
    }
}

impl<T> From<AppResult<T>> for OperationResponse<T> {
    fn from(result: AppResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failure(&error),
        }
    }
}
