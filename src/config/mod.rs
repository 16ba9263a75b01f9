// ABOUTME: Configuration module root
// ABOUTME: Environment-driven settings for storage, crypto, OAuth, and execution
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Environment variable parsing into typed configuration
pub mod environment;

pub use environment::{OAuthSettings, RegistrySettings, ToolpinConfig};
