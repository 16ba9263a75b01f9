// ABOUTME: Credential variants per tool and the headers they produce
// ABOUTME: AuthHeaderProvider is the seam the registry uses to authenticate remote calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Tool Authentication
//!
//! Every tool authenticates with exactly one [`AuthMethod`]. Static variants
//! (`api_key`, `bearer`, `basic`) build their header directly from the stored
//! payload; the `oauth` variant delegates to the OAuth flow engine, which may
//! refresh the token first.

/// Tagged credential variants and their header builders
pub mod method;
/// Credential lookup implementing [`AuthHeaderProvider`]
pub mod resolver;

pub use method::AuthMethod;
pub use resolver::CredentialResolver;

use std::fmt;

use async_trait::async_trait;

use crate::errors::AppResult;

/// Headers to attach to one remote call
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders {
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
    /// Whether an OAuth token was refreshed to produce them
    pub refreshed: bool,
}

impl AuthHeaders {
    /// No authentication
    #[must_use]
    pub const fn none() -> Self {
        Self {
            headers: Vec::new(),
            refreshed: false,
        }
    }

    /// A single header
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>, refreshed: bool) -> Self {
        Self {
            headers: vec![(name.into(), value.into())],
            refreshed,
        }
    }

    /// Whether no header is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("AuthHeaders")
            .field("headers", &names)
            .field("refreshed", &self.refreshed)
            .finish()
    }
}

/// Supplies authentication headers for calls to a tool
#[async_trait]
pub trait AuthHeaderProvider: Send + Sync {
    /// Headers for `tool_id`; `force_refresh` asks for a fresh OAuth token
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` or `AuthExpired` when no usable credential exists
    async fn auth_headers(&self, tool_id: &str, force_refresh: bool) -> AppResult<AuthHeaders>;
}
