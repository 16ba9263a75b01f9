// ABOUTME: Closed set of credential kinds with one header builder per kind
// ABOUTME: Serialized as an internally tagged JSON payload for encrypted storage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderName, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// How a tool authenticates
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Static key sent in a named header
    ApiKey {
        /// Header name, e.g. `X-API-Key`
        header: String,
        /// Key value
        key: String,
    },
    /// Static bearer token
    Bearer {
        /// Token value
        token: String,
    },
    /// HTTP basic credentials
    Basic {
        /// User name
        username: String,
        /// Password
        password: String,
    },
    /// Token managed by the OAuth flow engine
    #[serde(rename = "oauth")]
    OAuth {
        /// Provider label of the tool's OAuth configuration
        provider: String,
    },
}

impl AuthMethod {
    /// Storage tag of the variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::Bearer { .. } => "bearer",
            Self::Basic { .. } => "basic",
            Self::OAuth { .. } => "oauth",
        }
    }

    /// Reject empty values and unusable header names
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending field
    pub fn validate(&self) -> AppResult<()> {
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(AppError::invalid_input(format!(
                    "{} credential requires a non-empty {field}",
                    self.kind()
                )))
            } else {
                Ok(())
            }
        };

        match self {
            Self::ApiKey { header, key } => {
                require("header", header)?;
                require("key", key)?;
                HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                    AppError::invalid_input(format!("'{header}' is not a valid header name"))
                })?;
                Ok(())
            }
            Self::Bearer { token } => require("token", token),
            Self::Basic { username, password } => {
                require("username", username)?;
                require("password", password)
            }
            Self::OAuth { provider } => require("provider", provider),
        }
    }

    /// Header for the static variants; `None` for `oauth`
    #[must_use]
    pub fn header(&self) -> Option<(String, String)> {
        match self {
            Self::ApiKey { header, key } => Some(api_key_header(header, key)),
            Self::Bearer { token } => Some(bearer_header(token)),
            Self::Basic { username, password } => Some(basic_header(username, password)),
            Self::OAuth { .. } => None,
        }
    }
}

fn api_key_header(header: &str, key: &str) -> (String, String) {
    (header.to_owned(), key.to_owned())
}

fn bearer_header(token: &str) -> (String, String) {
    (AUTHORIZATION.as_str().to_owned(), format!("Bearer {token}"))
}

fn basic_header(username: &str, password: &str) -> (String, String) {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    (AUTHORIZATION.as_str().to_owned(), format!("Basic {encoded}"))
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"[REDACTED]").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::OAuth { provider } => f.debug_struct("OAuth").field("provider", provider).finish(),
        }
    }
}
