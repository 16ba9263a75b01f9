// ABOUTME: Library entry point for toolpin, fixed interfaces over remote tool endpoints
// ABOUTME: Wires the interface registry, OAuth PKCE engine, credential cipher, and telemetry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![deny(unsafe_code)]

//! # toolpin
//!
//! Pins the shape of operations exposed by remote tool-calling endpoints.
//! Instead of asking a tool what it can do before every call, a caller
//! registers a *fixed interface* once (operation, parameter, and response
//! schemas) and afterwards executes it directly with new parameters.
//!
//! ## Components
//!
//! - **Interfaces**: registration, validated execution, drift detection, caching
//! - **`OAuth2`**: authorization code flow with PKCE, manual intervention, token refresh
//! - **Crypto**: AES-256-GCM credential encryption with per-record Argon2id keys
//! - **Telemetry**: one performance sample per remote call, percentile statistics
//! - **Database**: `SQLite` persistence for all of the above
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use toolpin::config::ToolpinConfig;
//! use toolpin::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ToolpinConfig::from_env()?;
//!     println!("toolpin database: {}", config.database_url);
//!     Ok(())
//! }
//! ```

/// Error taxonomy and response envelopes
pub use toolpin_core::errors;

/// Persisted data model
pub use toolpin_core::models;

/// Static credentials and header resolution for remote calls
pub mod auth;

/// Environment-driven configuration
pub mod config;

/// Application constants
pub mod constants;

/// Credential encryption and master key management
pub mod crypto;

/// `SQLite` persistence
pub mod database;

/// Remote tool endpoints and the JSON-RPC client that reaches them
pub mod external;

/// Fixed interface registry and cache
pub mod interfaces;

/// Tracing subscriber setup
pub mod logging;

/// `OAuth2` authorization code flow with PKCE
pub mod oauth;

/// Retry with exponential backoff for transient failures
pub mod retry;

/// JSON Schema validation, diffing, and synthesis
pub mod schema;

/// Performance samples and statistics
pub mod telemetry;
