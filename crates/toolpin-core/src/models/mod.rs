// ABOUTME: Canonical data models shared across toolpin components
// ABOUTME: Re-exports interface, OAuth, metric, and version types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Fixed interface records, validation and execution results
pub mod interface;
/// Performance samples and aggregates
pub mod metrics;
/// OAuth configuration, tokens, pending flows, and authorization state
pub mod oauth;
/// Semantic version numbers for interfaces
pub mod version;

pub use interface::{
    ChangeKind, Compatibility, ExecutionResult, FixedInterface, SchemaChange, ValidationResult,
    ValidationStatus,
};
pub use metrics::{AccessType, AccessTypeComparison, PerformanceMetric, PerformanceStats};
pub use oauth::{
    AuthState, AuthStatus, AuthTestResult, AuthenticationResult, ManualIntervention,
    OAuthConfiguration, OAuthToken, PendingAuthorizationFlow, TokenRefreshResult,
};
pub use version::SemanticVersion;
