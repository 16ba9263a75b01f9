// ABOUTME: Client for the provider token endpoint (code exchange and refresh)
// ABOUTME: Maps invalid_grant to AuthExpired and transport failures to retryable errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::timeouts::REQUEST_TIMEOUT_SECS;
use crate::errors::{AppError, AppResult};

/// Grant presented to the token endpoint
#[derive(Clone, Copy)]
pub enum TokenGrant<'a> {
    /// Exchange an authorization code
    AuthorizationCode {
        /// Code returned on the redirect
        code: &'a str,
        /// Redirect URI used for the authorization request
        redirect_uri: &'a str,
        /// PKCE verifier, when PKCE is enabled
        code_verifier: Option<&'a str>,
    },
    /// Obtain a new access token
    RefreshToken {
        /// Stored refresh token
        refresh_token: &'a str,
    },
}

impl TokenGrant<'_> {
    /// `grant_type` form value
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

impl fmt::Debug for TokenGrant<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// One token endpoint request
#[derive(Clone, Copy)]
pub struct TokenRequest<'a> {
    /// Provider token endpoint
    pub token_url: &'a str,
    /// OAuth client identifier
    pub client_id: &'a str,
    /// Confidential client secret, if any
    pub client_secret: Option<&'a str>,
    /// Grant being presented
    pub grant: TokenGrant<'a>,
}

impl fmt::Debug for TokenRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

impl TokenRequest<'_> {
    fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![
            ("grant_type", self.grant.grant_type()),
            ("client_id", self.client_id),
        ];
        if let Some(secret) = self.client_secret {
            form.push(("client_secret", secret));
        }
        match self.grant {
            TokenGrant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                form.push(("code", code));
                form.push(("redirect_uri", redirect_uri));
                if let Some(verifier) = code_verifier {
                    form.push(("code_verifier", verifier));
                }
            }
            TokenGrant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token));
            }
        }
        form
    }
}

/// Successful token endpoint response (RFC 6749 section 5.1)
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// Token type, usually "Bearer"
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// New refresh token; providers may omit it on refresh
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope (space separated)
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

/// Error body of the token endpoint (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Provider token endpoint
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Present a grant and return the issued tokens
    ///
    /// # Errors
    ///
    /// - `AuthExpired` if the provider answers `invalid_grant`
    /// - `NetworkError`/`Timeout` for transport failures and 5xx/429 answers
    /// - `UpstreamError` for any other rejection
    async fn request_token(&self, request: &TokenRequest<'_>) -> AppResult<TokenResponse>;
}

/// Token endpoint client posting form-encoded requests with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http_client: Client,
    timeout: Duration,
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }
}

impl HttpTokenEndpoint {
    /// Create a client with a per-request deadline
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn request_token(&self, request: &TokenRequest<'_>) -> AppResult<TokenResponse> {
        let grant_type = request.grant.grant_type();
        debug!(grant_type, "Requesting token");

        let response = self
            .http_client
            .post(request.token_url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&request.form())
            .send()
            .await
            .map_err(|e| {
                let timed_out = e.is_timeout();
                let e = e.without_url();
                if timed_out {
                    AppError::timeout("Token endpoint timed out").with_cause(e)
                } else {
                    AppError::network("Token endpoint unreachable").with_cause(e)
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::network("Failed to read token response").with_cause(e.without_url()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                AppError::upstream(Some(status.as_u16()), "Malformed token response").with_cause(e)
            });
        }

        Err(token_error(status, &body))
    }
}

/// Classify a rejected token request; the body is never echoed since it may hold secrets
fn token_error(status: StatusCode, body: &str) -> AppError {
    let parsed = serde_json::from_str::<TokenErrorResponse>(body).ok();
    let code = parsed.as_ref().map_or("unknown_error", |e| e.error.as_str());

    if code == "invalid_grant" {
        warn!(status = status.as_u16(), "Token endpoint rejected grant as invalid_grant");
        return AppError::auth_expired(
            "Provider rejected the grant (invalid_grant); re-authentication required",
        );
    }

    let description = parsed
        .as_ref()
        .and_then(|e| e.error_description.as_deref())
        .unwrap_or("no description");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::network(format!("Token endpoint unavailable (HTTP {status})"))
            .with_cause(format!("{code}: {description}"))
    } else {
        AppError::upstream(
            Some(status.as_u16()),
            format!("Token endpoint rejected the request: {code}"),
        )
        .with_cause(description)
    }
}
