// ABOUTME: OAuth configuration, token, and pending authorization flow types
// ABOUTME: DTOs for the authorization state machine and manual-intervention reporting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth provider configuration for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfiguration {
    /// Unique configuration identifier
    pub id: Uuid,
    /// Tool that owns this configuration
    pub tool_id: String,
    /// Provider label (e.g., "notion", "github")
    pub provider: String,
    /// OAuth client identifier
    pub client_id: String,
    /// Whether a confidential client secret is stored (the secret itself is never exposed)
    pub has_client_secret: bool,
    /// HTTPS authorization endpoint
    pub auth_url: String,
    /// HTTPS token endpoint
    pub token_url: String,
    /// Default scopes requested
    pub scopes: Vec<String>,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Whether PKCE (S256) is used
    pub pkce_enabled: bool,
    /// When the configuration was created
    pub created_at: DateTime<Utc>,
    /// When the configuration was last corrected
    pub updated_at: DateTime<Utc>,
}

/// Decrypted OAuth token held in memory only
///
/// This type intentionally does not implement `Serialize`, and its `Debug`
/// output redacts both token values.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    /// Unique token identifier
    pub id: Uuid,
    /// Tool the token grants access to
    pub tool_id: String,
    /// Owning configuration
    pub config_id: Uuid,
    /// Access token (plaintext, in memory only)
    pub access_token: String,
    /// Refresh token (plaintext, in memory only)
    pub refresh_token: Option<String>,
    /// Token type, usually "Bearer"
    pub token_type: String,
    /// Expiry of the access token
    pub expires_at: Option<DateTime<Utc>>,
    /// Scope granted by the provider
    pub scopes: Option<String>,
    /// When the token was first issued
    pub created_at: DateTime<Utc>,
    /// When the token was last refreshed
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Whether the access token is past its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether the access token expires within `threshold`
    #[must_use]
    pub fn expires_within(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| {
                now.checked_add_signed(threshold)
                    .is_none_or(|limit| expires_at <= limit)
            })
    }

    /// Value of the `Authorization` header for this token
    #[must_use]
    pub fn authorization_value(&self) -> String {
        let token_type = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{token_type} {}", self.access_token)
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("id", &self.id)
            .field("tool_id", &self.tool_id)
            .field("config_id", &self.config_id)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .field("last_refreshed", &self.last_refreshed)
            .finish()
    }
}

/// Authorization started but not yet completed by the human operator
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAuthorizationFlow {
    /// Single-use CSRF state value
    pub state: String,
    /// Configuration the flow belongs to
    pub config_id: Uuid,
    /// Tool the flow belongs to
    pub tool_id: String,
    /// PKCE verifier (plaintext, in memory only)
    pub code_verifier: Option<String>,
    /// PKCE S256 challenge sent to the provider
    pub code_challenge: Option<String>,
    /// Redirect URI used for this flow
    pub redirect_uri: String,
    /// Scopes requested
    pub scopes: Vec<String>,
    /// When the flow was initiated
    pub created_at: DateTime<Utc>,
    /// When the flow stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorizationFlow {
    /// Whether the flow can no longer be completed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for PendingAuthorizationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorizationFlow")
            .field("config_id", &self.config_id)
            .field("tool_id", &self.tool_id)
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Authorization state of one OAuth configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No token stored and no flow in progress
    NoToken,
    /// Authorization URL built
    AuthorizationRequested,
    /// Waiting for the human to complete the browser redirect
    ManualInterventionPending,
    /// Token just obtained from a code exchange
    TokenIssued,
    /// Token usable and not near expiry
    TokenValid,
    /// Token usable but within the refresh threshold
    TokenExpiring,
    /// Token just refreshed
    Refreshed,
    /// Token past expiry
    Expired,
    /// Credentials deleted by logout
    Revoked,
}

impl AuthState {
    /// Whether the state machine allows moving from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use AuthState::{
            AuthorizationRequested, Expired, ManualInterventionPending, NoToken, Refreshed,
            Revoked, TokenExpiring, TokenIssued, TokenValid,
        };
        matches!(
            (self, next),
            (
                NoToken
                    | ManualInterventionPending
                    | Revoked
                    | Expired
                    | TokenValid
                    | TokenExpiring
                    | Refreshed,
                AuthorizationRequested
            ) | (AuthorizationRequested, ManualInterventionPending | NoToken)
                | (ManualInterventionPending, TokenIssued | NoToken)
                | (TokenIssued, TokenValid | TokenExpiring | Expired | Revoked)
                | (
                    TokenValid,
                    TokenExpiring | Expired | Refreshed | Revoked
                )
                | (TokenExpiring, Refreshed | Expired | Revoked)
                | (Refreshed, TokenValid | TokenExpiring | Expired | Revoked)
                | (Expired, Refreshed | Revoked)
                | (Revoked, NoToken)
        )
    }

    /// State of a stored token at `now`
    #[must_use]
    pub fn for_token(token: &OAuthToken, threshold: Duration, now: DateTime<Utc>) -> Self {
        if token.is_expired(now) {
            Self::Expired
        } else if token.expires_within(threshold, now) {
            Self::TokenExpiring
        } else {
            Self::TokenValid
        }
    }

    /// Whether a token in this state can be presented to the remote endpoint
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(
            self,
            Self::TokenIssued | Self::TokenValid | Self::TokenExpiring | Self::Refreshed
        )
    }
}

/// Instructions for a step that only a human can complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualIntervention {
    /// Always true when present on a pending flow
    pub required: bool,
    /// Why intervention is needed
    pub reason: String,
    /// URL the human must open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    /// State value the callback must carry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// When the pending flow stops being accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Ordered resume steps
    pub instructions: Vec<String>,
}

/// Result of initiating or completing an authorization flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationResult {
    /// Whether the step completed without error
    pub success: bool,
    /// Tool being authorized
    pub tool_id: String,
    /// Provider label
    pub provider: String,
    /// Resulting state
    pub state: AuthState,
    /// Pending human step, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_intervention: Option<ManualIntervention>,
    /// Expiry of the issued token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scope granted or requested
    pub scopes: Vec<String>,
    /// Operator-facing summary
    pub message: String,
}

/// Result of a refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefreshResult {
    /// Tool whose token was considered
    pub tool_id: String,
    /// Provider label
    pub provider: String,
    /// Whether a new access token was obtained
    pub refreshed: bool,
    /// Resulting state
    pub state: AuthState,
    /// Expiry of the current access token
    pub expires_at: Option<DateTime<Utc>>,
    /// Operator-facing summary
    pub message: String,
}

/// Read-only authorization status (contains no secret material)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Tool inspected
    pub tool_id: String,
    /// Provider label
    pub provider: String,
    /// Current state
    pub state: AuthState,
    /// Whether an access token is stored
    pub has_token: bool,
    /// Whether a refresh token is stored
    pub has_refresh_token: bool,
    /// Access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scope
    pub scopes: Option<String>,
    /// When the token was last refreshed
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Expiry of a pending authorization flow, if one is waiting
    pub pending_flow_expires_at: Option<DateTime<Utc>>,
}

/// Result of probing whether usable credentials exist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTestResult {
    /// Tool tested
    pub tool_id: String,
    /// Provider label
    pub provider: String,
    /// Whether a usable access token is available
    pub authenticated: bool,
    /// State after the probe
    pub state: AuthState,
    /// Whether the probe had to refresh the token
    pub refreshed: bool,
    /// Operator-facing summary
    pub message: String,
}
