// ABOUTME: OAuth authorization-code flow with PKCE, manual intervention, and token refresh
// ABOUTME: Pauses for the human browser step, resumes from the callback, and refreshes single-flight
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # OAuth Flow Engine
//!
//! Drives one state machine per OAuth configuration:
//!
//! ```text
//! NoToken -> AuthorizationRequested -> ManualInterventionPending -> TokenIssued
//!   -> TokenValid -> TokenExpiring -> {Refreshed | Expired} -> ... -> Revoked
//! ```
//!
//! Authorization always needs a human to complete a browser redirect, so
//! [`OAuthEngine::initiate_auth_flow`] returns immediately with a
//! [`ManualIntervention`] describing the resume steps. The pending flow is
//! persisted keyed by its single-use state value and is consumed by
//! [`OAuthEngine::handle_callback`].
//!
//! Refreshes of one configuration are serialized by an async mutex; a caller
//! that waited re-reads the token and returns without calling the provider
//! when the token is already fresh.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pkce::{generate_state, PkcePair};
use super::token_client::{TokenEndpoint, TokenGrant, TokenRequest, TokenResponse};
use super::urls::{build_authorization_url, require_https, require_redirect_uri, AuthorizationRequest};
use crate::auth::AuthHeaders;
use crate::config::OAuthSettings;
use crate::constants::oauth::DEFAULT_TOKEN_TYPE;
use crate::database::{Database, RefreshedTokenData};
use crate::errors::{AppError, AppResult, ErrorCode, FieldViolation};
use crate::models::{
    AuthState, AuthStatus, AuthTestResult, AuthenticationResult, ManualIntervention,
    OAuthConfiguration, OAuthToken, PendingAuthorizationFlow, TokenRefreshResult,
};
use crate::retry::with_retry;

/// Data needed to set up OAuth for a tool
#[derive(Clone, Deserialize)]
pub struct CreateOAuthConfigRequest {
    /// Tool the configuration belongs to
    pub tool_id: String,
    /// Provider label
    pub provider: String,
    /// OAuth client identifier
    pub client_id: String,
    /// Confidential client secret, stored encrypted
    #[serde(default)]
    pub client_secret: Option<String>,
    /// HTTPS authorization endpoint
    pub auth_url: String,
    /// HTTPS token endpoint
    pub token_url: String,
    /// Default scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Registered redirect URI
    pub redirect_uri: String,
    /// Whether PKCE is used
    #[serde(default = "default_pkce")]
    pub pkce_enabled: bool,
}

const fn default_pkce() -> bool {
    true
}

impl fmt::Debug for CreateOAuthConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOAuthConfigRequest")
            .field("tool_id", &self.tool_id)
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("pkce_enabled", &self.pkce_enabled)
            .finish()
    }
}

/// Correction of endpoints, scopes, or redirect URI; `None` keeps the value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOAuthConfigRequest {
    /// New authorization endpoint
    #[serde(default)]
    pub auth_url: Option<String>,
    /// New token endpoint
    #[serde(default)]
    pub token_url: Option<String>,
    /// New default scopes
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// New redirect URI
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Options for starting an authorization
#[derive(Debug, Clone, Default)]
pub struct AuthFlowOptions {
    /// Provider, required when the tool has several configurations
    pub provider: Option<String>,
    /// Redirect URI overriding the configured one
    pub redirect_uri: Option<String>,
    /// Scopes overriding the configured ones
    pub scopes: Option<Vec<String>>,
}

/// Result of one pass of the background refresh scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSweep {
    /// Tokens inside the refresh threshold
    pub examined: usize,
    /// Tokens refreshed
    pub refreshed: usize,
    /// Tokens whose refresh failed
    pub failed: usize,
}

struct RefreshOutcome {
    result: TokenRefreshResult,
    token: OAuthToken,
}

/// OAuth flow engine
pub struct OAuthEngine {
    database: Database,
    token_endpoint: Arc<dyn TokenEndpoint>,
    settings: OAuthSettings,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OAuthEngine {
    /// Create an engine
    #[must_use]
    pub fn new(
        database: Database,
        token_endpoint: Arc<dyn TokenEndpoint>,
        settings: OAuthSettings,
    ) -> Self {
        Self {
            database,
            token_endpoint,
            settings,
            refresh_locks: DashMap::new(),
        }
    }

    /// Settings in effect
    #[must_use]
    pub const fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Set up OAuth for a tool
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` listing every missing field or non-HTTPS endpoint
    /// - `Conflict` if the tool already has a configuration for the provider
    pub async fn create_configuration(
        &self,
        request: CreateOAuthConfigRequest,
    ) -> AppResult<OAuthConfiguration> {
        let mut violations = Vec::new();
        for (field, value) in [
            ("tool_id", &request.tool_id),
            ("provider", &request.provider),
            ("client_id", &request.client_id),
        ] {
            if value.trim().is_empty() {
                violations.push(FieldViolation::new(field, "is required"));
            }
        }
        collect_violations(&mut violations, require_https("auth_url", &request.auth_url));
        collect_violations(&mut violations, require_https("token_url", &request.token_url));
        collect_violations(
            &mut violations,
            require_redirect_uri("redirect_uri", &request.redirect_uri),
        );
        if !violations.is_empty() {
            return Err(AppError::validation(
                "Invalid OAuth configuration",
                violations,
            ));
        }

        let client_secret = request
            .client_secret
            .filter(|secret| !secret.trim().is_empty());
        let now = Utc::now();
        let config = OAuthConfiguration {
            id: Uuid::new_v4(),
            tool_id: request.tool_id.trim().to_owned(),
            provider: request.provider.trim().to_owned(),
            client_id: request.client_id.trim().to_owned(),
            has_client_secret: client_secret.is_some(),
            auth_url: request.auth_url,
            token_url: request.token_url,
            scopes: normalize_scopes(&request.scopes),
            redirect_uri: request.redirect_uri,
            pkce_enabled: request.pkce_enabled,
            created_at: now,
            updated_at: now,
        };

        self.database
            .insert_oauth_configuration(&config, client_secret.as_deref())
            .await?;

        info!(
            tool_id = %config.tool_id,
            provider = %config.provider,
            config_id = %config.id,
            pkce = config.pkce_enabled,
            "Created OAuth configuration"
        );
        Ok(config)
    }

    /// Correct the endpoints, scopes, or redirect URI of a configuration
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown configuration or
    /// `ValidationFailed` for a non-HTTPS endpoint
    pub async fn update_configuration(
        &self,
        tool_id: &str,
        provider: Option<&str>,
        request: UpdateOAuthConfigRequest,
    ) -> AppResult<OAuthConfiguration> {
        let mut config = self.resolve_configuration(tool_id, provider).await?;

        let mut violations = Vec::new();
        if let Some(auth_url) = request.auth_url {
            collect_violations(&mut violations, require_https("auth_url", &auth_url));
            config.auth_url = auth_url;
        }
        if let Some(token_url) = request.token_url {
            collect_violations(&mut violations, require_https("token_url", &token_url));
            config.token_url = token_url;
        }
        if let Some(redirect_uri) = request.redirect_uri {
            collect_violations(
                &mut violations,
                require_redirect_uri("redirect_uri", &redirect_uri),
            );
            config.redirect_uri = redirect_uri;
        }
        if let Some(scopes) = request.scopes {
            config.scopes = normalize_scopes(&scopes);
        }
        if !violations.is_empty() {
            return Err(AppError::validation(
                "Invalid OAuth configuration update",
                violations,
            ));
        }

        let now = Utc::now();
        if !self.database.update_oauth_configuration(&config, now).await? {
            return Err(AppError::not_found(format!(
                "OAuth configuration {} no longer exists",
                config.id
            )));
        }
        config.updated_at = now;

        info!(tool_id = %config.tool_id, provider = %config.provider, "Updated OAuth configuration");
        Ok(config)
    }

    /// The configuration of `tool_id`, selected by `provider` when given
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if nothing matches, or `InvalidInput` if the
    /// tool has several configurations and no provider was given
    pub async fn resolve_configuration(
        &self,
        tool_id: &str,
        provider: Option<&str>,
    ) -> AppResult<OAuthConfiguration> {
        let mut configs = self.database.get_oauth_configurations_for_tool(tool_id).await?;
        if let Some(provider) = provider {
            configs.retain(|config| config.provider == provider);
        }

        match configs.len() {
            0 => Err(AppError::not_found(provider.map_or_else(
                || format!("No OAuth configuration for tool '{tool_id}'"),
                |provider| {
                    format!("No OAuth configuration for tool '{tool_id}' and provider '{provider}'")
                },
            ))),
            1 => Ok(configs.remove(0)),
            _ => {
                let providers: Vec<&str> = configs.iter().map(|c| c.provider.as_str()).collect();
                Err(AppError::invalid_input(format!(
                    "Tool '{tool_id}' has several OAuth providers ({}); specify one",
                    providers.join(", ")
                )))
            }
        }
    }

    /// Start an authorization and describe the browser step to the operator
    ///
    /// Any older pending flow of the configuration is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown configuration,
    /// `ValidationFailed` for an unusable redirect URI, or a storage error
    pub async fn initiate_auth_flow(
        &self,
        tool_id: &str,
        options: AuthFlowOptions,
    ) -> AppResult<AuthenticationResult> {
        let config = self
            .resolve_configuration(tool_id, options.provider.as_deref())
            .await?;
        let now = Utc::now();
        let (_, _, current) = self.current_state(&config, now).await?;

        let redirect_uri = options
            .redirect_uri
            .unwrap_or_else(|| config.redirect_uri.clone());
        require_redirect_uri("redirect_uri", &redirect_uri)?;
        let scopes = options
            .scopes
            .map_or_else(|| config.scopes.clone(), |scopes| normalize_scopes(&scopes));

        let state = generate_state()?;
        let pkce = if config.pkce_enabled {
            Some(PkcePair::generate()?)
        } else {
            None
        };
        let expires_at = shift(now, self.settings.manual_auth_timeout)?;

        let authorization_url = build_authorization_url(&AuthorizationRequest {
            auth_url: &config.auth_url,
            client_id: &config.client_id,
            redirect_uri: &redirect_uri,
            scopes: &scopes,
            state: &state,
            code_challenge: pkce.as_ref().map(|pair| pair.challenge.as_str()),
        })?;
        log_transition(&config, current, AuthState::AuthorizationRequested);

        let flow = PendingAuthorizationFlow {
            state: state.clone(),
            config_id: config.id,
            tool_id: config.tool_id.clone(),
            code_verifier: pkce.as_ref().map(|pair| pair.verifier.clone()),
            code_challenge: pkce.map(|pair| pair.challenge),
            redirect_uri: redirect_uri.clone(),
            scopes: scopes.clone(),
            created_at: now,
            expires_at,
        };
        self.database.replace_pending_flow(&flow).await?;
        log_transition(
            &config,
            AuthState::AuthorizationRequested,
            AuthState::ManualInterventionPending,
        );

        let manual_intervention = ManualIntervention {
            required: true,
            reason: format!(
                "{} requires a browser sign-in that only a human can complete",
                config.provider
            ),
            authorization_url: Some(authorization_url),
            state: Some(state),
            expires_at: Some(expires_at),
            instructions: vec![
                format!(
                    "Open the authorization URL in a browser and sign in to {}",
                    config.provider
                ),
                if scopes.is_empty() {
                    "Approve the access request".to_owned()
                } else {
                    format!("Approve the requested scopes: {}", scopes.join(" "))
                },
                format!(
                    "After the redirect to {redirect_uri}, copy the `code` and `state` query parameters"
                ),
                format!(
                    "Run `toolpin auth {} --callback <code> --state <state>` before {}",
                    config.tool_id,
                    expires_at.to_rfc3339()
                ),
            ],
        };

        info!(
            tool_id = %config.tool_id,
            provider = %config.provider,
            expires_at = %expires_at,
            "Authorization requested, waiting for manual intervention"
        );

        Ok(AuthenticationResult {
            success: true,
            tool_id: config.tool_id,
            provider: config.provider,
            state: AuthState::ManualInterventionPending,
            manual_intervention: Some(manual_intervention),
            expires_at: None,
            scopes,
            message: "Manual intervention required: complete the browser authorization".to_owned(),
        })
    }

    /// Complete an authorization with the code and state from the redirect
    ///
    /// The pending flow is consumed before the exchange, so a state value can
    /// be used at most once.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` for an unknown, already used, or expired state
    /// - `AuthExpired` if the provider rejects the code
    /// - `NetworkError`/`Timeout` once retries are exhausted
    pub async fn handle_callback(&self, code: &str, state: &str) -> AppResult<AuthenticationResult> {
        if code.trim().is_empty() {
            return Err(AppError::invalid_input("Authorization code cannot be empty"));
        }

        let Some(flow) = self.database.consume_pending_flow(state).await? else {
            warn!("Callback with unknown or already used state rejected");
            return Err(AppError::not_found(
                "Unknown or already used authorization state; start a new authorization",
            ));
        };
        let now = Utc::now();
        if flow.is_expired(now) {
            warn!(tool_id = %flow.tool_id, "Callback for expired authorization rejected");
            return Err(AppError::not_found(
                "Authorization state has expired; start a new authorization",
            ));
        }

        let config = self
            .database
            .get_oauth_configuration(flow.config_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("OAuth configuration {} not found", flow.config_id))
            })?;
        let client_secret = self.database.get_oauth_client_secret(&config).await?;

        let request = TokenRequest {
            token_url: &config.token_url,
            client_id: &config.client_id,
            client_secret: client_secret.as_deref(),
            grant: TokenGrant::AuthorizationCode {
                code,
                redirect_uri: &flow.redirect_uri,
                code_verifier: flow.code_verifier.as_deref(),
            },
        };
        let retried = with_retry(self.settings.retry, "oauth.code_exchange", |_| {
            self.token_endpoint.request_token(&request)
        })
        .await;
        let response = retried.result.inspect_err(|e| {
            warn!(
                tool_id = %config.tool_id,
                provider = %config.provider,
                attempts = retried.attempts,
                error_code = %e.code,
                "Authorization code exchange failed"
            );
        })?;
        ensure_access_token(&response)?;

        let issued_at = Utc::now();
        let token = OAuthToken {
            id: Uuid::new_v4(),
            tool_id: config.tool_id.clone(),
            config_id: config.id,
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|rt| !rt.is_empty()),
            token_type: response
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_owned()),
            expires_at: expiry_from(response.expires_in, issued_at),
            scopes: response.scope.or_else(|| {
                (!flow.scopes.is_empty()).then(|| flow.scopes.join(" "))
            }),
            created_at: issued_at,
            last_refreshed: None,
        };
        self.database.upsert_oauth_token(&token).await?;
        log_transition(
            &config,
            AuthState::ManualInterventionPending,
            AuthState::TokenIssued,
        );

        info!(
            tool_id = %config.tool_id,
            provider = %config.provider,
            has_refresh_token = token.refresh_token.is_some(),
            "Authorization completed, token issued"
        );

        Ok(AuthenticationResult {
            success: true,
            tool_id: config.tool_id,
            provider: config.provider,
            state: AuthState::TokenIssued,
            manual_intervention: None,
            expires_at: token.expires_at,
            scopes: token
                .scopes
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            message: "Authorization completed".to_owned(),
        })
    }

    /// Refresh the token of a tool
    ///
    /// Without `force` a token that is valid and outside the refresh
    /// threshold is left alone.
    ///
    /// # Errors
    ///
    /// - `AuthRequired` if no token is stored
    /// - `AuthExpired` if no refresh token is stored or the provider answers
    ///   `invalid_grant` (the dead refresh token is then discarded)
    /// - `NetworkError`/`Timeout` once retries are exhausted
    pub async fn refresh_token(
        &self,
        tool_id: &str,
        provider: Option<&str>,
        force: bool,
    ) -> AppResult<TokenRefreshResult> {
        let config = self.resolve_configuration(tool_id, provider).await?;
        Ok(self.refresh_configuration(&config, force).await?.result)
    }

    async fn refresh_configuration(
        &self,
        config: &OAuthConfiguration,
        force: bool,
    ) -> AppResult<RefreshOutcome> {
        let observed = self
            .database
            .get_oauth_token(config.id)
            .await?
            .map(|token| token.last_refreshed);

        let lock = self.refresh_lock(config.id);
        let _guard = lock.lock().await;

        let Some(token) = self.database.get_oauth_token(config.id).await? else {
            return Err(AppError::auth_required(format!(
                "No OAuth token stored for tool '{}'",
                config.tool_id
            ))
            .with_manual_intervention(login_intervention(config, "No OAuth token is stored")));
        };

        let now = Utc::now();
        let state = AuthState::for_token(&token, to_chrono(self.settings.refresh_threshold)?, now);

        if observed.is_some_and(|seen| seen != token.last_refreshed) {
            debug!(tool_id = %config.tool_id, "Token refreshed by a concurrent caller");
            return Ok(RefreshOutcome {
                result: TokenRefreshResult {
                    tool_id: config.tool_id.clone(),
                    provider: config.provider.clone(),
                    refreshed: false,
                    state,
                    expires_at: token.expires_at,
                    message: "Token was refreshed concurrently".to_owned(),
                },
                token,
            });
        }

        if !force && state == AuthState::TokenValid {
            return Ok(RefreshOutcome {
                result: TokenRefreshResult {
                    tool_id: config.tool_id.clone(),
                    provider: config.provider.clone(),
                    refreshed: false,
                    state,
                    expires_at: token.expires_at,
                    message: "Token is still valid".to_owned(),
                },
                token,
            });
        }

        let Some(refresh_token) = token.refresh_token.as_deref() else {
            warn!(tool_id = %config.tool_id, "Cannot refresh: no refresh token stored");
            return Err(AppError::auth_expired(format!(
                "No refresh token stored for tool '{}'; re-authentication required",
                config.tool_id
            ))
            .with_manual_intervention(login_intervention(
                config,
                "The provider issued no refresh token",
            )));
        };

        let client_secret = self.database.get_oauth_client_secret(config).await?;
        let request = TokenRequest {
            token_url: &config.token_url,
            client_id: &config.client_id,
            client_secret: client_secret.as_deref(),
            grant: TokenGrant::RefreshToken { refresh_token },
        };
        let retried = with_retry(self.settings.retry, "oauth.refresh", |_| {
            self.token_endpoint.request_token(&request)
        })
        .await;

        let response = match retried.result {
            Ok(response) => response,
            Err(e) if e.code == ErrorCode::AuthExpired => {
                self.database.clear_oauth_refresh_token(config.id).await?;
                log_transition(config, state, AuthState::Expired);
                warn!(
                    tool_id = %config.tool_id,
                    provider = %config.provider,
                    "Refresh token rejected by provider and discarded"
                );
                return Err(e.with_manual_intervention(login_intervention(
                    config,
                    "The provider rejected the refresh token",
                )));
            }
            Err(e) => {
                warn!(
                    tool_id = %config.tool_id,
                    attempts = retried.attempts,
                    error_code = %e.code,
                    "Token refresh failed"
                );
                return Err(e);
            }
        };
        ensure_access_token(&response)?;

        let refreshed_at = Utc::now();
        let token_type = response
            .token_type
            .clone()
            .unwrap_or_else(|| token.token_type.clone());
        let expires_at = expiry_from(response.expires_in, refreshed_at);
        let new_refresh_token = response.refresh_token.as_deref().filter(|rt| !rt.is_empty());
        let data = RefreshedTokenData {
            access_token: &response.access_token,
            refresh_token: new_refresh_token,
            token_type: &token_type,
            expires_at,
            scopes: response.scope.as_deref(),
        };
        if !self
            .database
            .refresh_oauth_token(&config.tool_id, config.id, &data, refreshed_at)
            .await?
        {
            return Err(AppError::auth_required(format!(
                "OAuth token for tool '{}' was removed during refresh",
                config.tool_id
            )));
        }
        log_transition(config, state, AuthState::Refreshed);
        info!(tool_id = %config.tool_id, provider = %config.provider, "Token refreshed");

        let updated = OAuthToken {
            access_token: response.access_token.clone(),
            refresh_token: new_refresh_token
                .map(str::to_owned)
                .or_else(|| token.refresh_token.clone()),
            token_type,
            expires_at,
            scopes: response.scope.clone().or_else(|| token.scopes.clone()),
            last_refreshed: Some(refreshed_at),
            ..token
        };

        Ok(RefreshOutcome {
            result: TokenRefreshResult {
                tool_id: config.tool_id.clone(),
                provider: config.provider.clone(),
                refreshed: true,
                state: AuthState::Refreshed,
                expires_at,
                message: "Token refreshed".to_owned(),
            },
            token: updated,
        })
    }

    /// `Authorization` header for a call to `tool_id`
    ///
    /// Tokens inside the refresh threshold are refreshed first; if that fails
    /// transiently the still-valid token is used. `force_refresh` always
    /// refreshes (used after the remote endpoint answered 401).
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when no token exists (with resume steps) or
    /// `AuthExpired` when the token is expired and cannot be refreshed
    pub async fn auth_headers(
        &self,
        tool_id: &str,
        provider: Option<&str>,
        force_refresh: bool,
    ) -> AppResult<AuthHeaders> {
        let config = self.resolve_configuration(tool_id, provider).await?;
        let now = Utc::now();
        let (token, pending, state) = self.current_state(&config, now).await?;

        let Some(mut token) = token else {
            let intervention = pending.map_or_else(
                || login_intervention(&config, "No OAuth token is stored"),
                |flow| pending_intervention(&config, &flow),
            );
            return Err(AppError::auth_required(format!(
                "Tool '{tool_id}' is not authorized"
            ))
            .with_manual_intervention(intervention));
        };

        let mut refreshed = false;
        let expiring_refreshable =
            state == AuthState::TokenExpiring && token.refresh_token.is_some();
        if force_refresh || state == AuthState::Expired || expiring_refreshable {
            match self.refresh_configuration(&config, force_refresh).await {
                Ok(outcome) => {
                    refreshed = outcome.result.refreshed;
                    token = outcome.token;
                }
                Err(e) if !force_refresh && state == AuthState::TokenExpiring && e.is_retryable() => {
                    warn!(
                        tool_id = %tool_id,
                        error_code = %e.code,
                        "Early refresh failed, using the still-valid token"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if token.is_expired(Utc::now()) {
            return Err(AppError::auth_expired(format!(
                "OAuth token for tool '{tool_id}' has expired; re-authentication required"
            ))
            .with_manual_intervention(login_intervention(&config, "The access token has expired")));
        }

        Ok(AuthHeaders::single(
            reqwest::header::AUTHORIZATION.as_str(),
            token.authorization_value(),
            refreshed,
        ))
    }

    /// Authorization status without secret material
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown configuration or a storage error
    pub async fn get_auth_status(
        &self,
        tool_id: &str,
        provider: Option<&str>,
    ) -> AppResult<AuthStatus> {
        let config = self.resolve_configuration(tool_id, provider).await?;
        let (token, pending, state) = self.current_state(&config, Utc::now()).await?;

        Ok(AuthStatus {
            tool_id: config.tool_id,
            provider: config.provider,
            state,
            has_token: token.is_some(),
            has_refresh_token: token.as_ref().is_some_and(|t| t.refresh_token.is_some()),
            expires_at: token.as_ref().and_then(|t| t.expires_at),
            scopes: token.as_ref().and_then(|t| t.scopes.clone()),
            last_refreshed: token.as_ref().and_then(|t| t.last_refreshed),
            pending_flow_expires_at: pending.map(|flow| flow.expires_at),
        })
    }

    /// Check whether a usable token is available, refreshing if needed
    ///
    /// Authorization problems are reported in the result rather than as errors.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown configuration, or network and
    /// storage failures
    pub async fn test_authentication(
        &self,
        tool_id: &str,
        provider: Option<&str>,
    ) -> AppResult<AuthTestResult> {
        let outcome = self.auth_headers(tool_id, provider, false).await;
        let status = self.get_auth_status(tool_id, provider).await?;

        match outcome {
            Ok(headers) => Ok(AuthTestResult {
                tool_id: status.tool_id,
                provider: status.provider,
                authenticated: true,
                state: if headers.refreshed {
                    AuthState::Refreshed
                } else {
                    status.state
                },
                refreshed: headers.refreshed,
                message: "Usable credentials available".to_owned(),
            }),
            Err(e) if matches!(e.code, ErrorCode::AuthRequired | ErrorCode::AuthExpired) => {
                Ok(AuthTestResult {
                    tool_id: status.tool_id,
                    provider: status.provider,
                    authenticated: false,
                    state: status.state,
                    refreshed: false,
                    message: e.message,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the token and pending flows of a configuration
    ///
    /// The configuration itself is kept so the tool can authorize again.
    /// Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown configuration or a storage error
    pub async fn logout(&self, tool_id: &str, provider: Option<&str>) -> AppResult<bool> {
        let config = self.resolve_configuration(tool_id, provider).await?;
        let lock = self.refresh_lock(config.id);
        let _guard = lock.lock().await;

        let (_, _, state) = self.current_state(&config, Utc::now()).await?;
        let token_deleted = self.database.delete_oauth_token(config.id).await?;
        let flows_deleted = self
            .database
            .delete_pending_flows_for_config(config.id)
            .await?;

        if token_deleted {
            log_transition(&config, state, AuthState::Revoked);
            log_transition(&config, AuthState::Revoked, AuthState::NoToken);
        }
        info!(
            tool_id = %config.tool_id,
            provider = %config.provider,
            token_deleted,
            flows_deleted,
            "Logged out"
        );
        Ok(token_deleted || flows_deleted > 0)
    }

    /// Discard pending flows whose window has closed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn purge_expired_flows(&self) -> AppResult<u64> {
        let purged = self
            .database
            .purge_expired_pending_flows(Utc::now())
            .await?;
        if purged > 0 {
            info!(purged, "Discarded expired pending authorizations");
        }
        Ok(purged)
    }

    /// Refresh every token inside the refresh threshold, one at a time
    ///
    /// Individual failures are logged and counted, never propagated.
    ///
    /// # Errors
    ///
    /// Returns an error only if the scan query itself fails
    pub async fn refresh_expiring_tokens(&self) -> AppResult<RefreshSweep> {
        let cutoff = shift(Utc::now(), self.settings.refresh_threshold)?;
        let candidates = self
            .database
            .get_refreshable_oauth_tokens_expiring_before(cutoff)
            .await?;

        let mut sweep = RefreshSweep {
            examined: candidates.len(),
            ..RefreshSweep::default()
        };
        for (config_id, tool_id) in candidates {
            let config = match self.database.get_oauth_configuration(config_id).await {
                Ok(Some(config)) => config,
                Ok(None) => continue,
                Err(e) => {
                    error!(tool_id = %tool_id, "Failed to load OAuth configuration: {}", e);
                    sweep.failed += 1;
                    continue;
                }
            };
            match self.refresh_configuration(&config, false).await {
                Ok(outcome) if outcome.result.refreshed => sweep.refreshed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(
                        tool_id = %config.tool_id,
                        provider = %config.provider,
                        error_code = %e.code,
                        "Background token refresh failed: {}",
                        e
                    );
                    sweep.failed += 1;
                }
            }
        }
        Ok(sweep)
    }

    async fn current_state(
        &self,
        config: &OAuthConfiguration,
        now: DateTime<Utc>,
    ) -> AppResult<(
        Option<OAuthToken>,
        Option<PendingAuthorizationFlow>,
        AuthState,
    )> {
        let token = self.database.get_oauth_token(config.id).await?;
        let pending = self
            .database
            .get_pending_flow_for_config(config.id)
            .await?
            .filter(|flow| !flow.is_expired(now));

        let state = match (&token, &pending) {
            (Some(token), _) => {
                AuthState::for_token(token, to_chrono(self.settings.refresh_threshold)?, now)
            }
            (None, Some(_)) => AuthState::ManualInterventionPending,
            (None, None) => AuthState::NoToken,
        };
        Ok((token, pending, state))
    }

    fn refresh_lock(&self, config_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(self.refresh_locks.entry(config_id).or_default().value())
    }
}

fn collect_violations<T>(violations: &mut Vec<FieldViolation>, result: AppResult<T>) {
    if let Err(e) = result {
        violations.extend(e.violations);
    }
}

fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for scope in scopes.iter().flat_map(|s| s.split_whitespace()) {
        if !normalized.iter().any(|existing| existing == scope) {
            normalized.push(scope.to_owned());
        }
    }
    normalized
}

fn to_chrono(duration: std::time::Duration) -> AppResult<Duration> {
    Duration::from_std(duration)
        .map_err(|e| AppError::config(format!("Duration out of range: {e}")))
}

/// `at + duration`, rejecting a configured duration that leaves the calendar
fn shift(at: DateTime<Utc>, duration: std::time::Duration) -> AppResult<DateTime<Utc>> {
    at.checked_add_signed(to_chrono(duration)?)
        .ok_or_else(|| AppError::config("Configured duration exceeds the supported date range"))
}

fn expiry_from(expires_in: Option<i64>, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| Duration::try_seconds(secs.max(0)))
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
}

fn ensure_access_token(response: &TokenResponse) -> AppResult<()> {
    if response.access_token.trim().is_empty() {
        return Err(AppError::upstream(
            None,
            "Token endpoint returned an empty access token",
        ));
    }
    Ok(())
}

fn log_transition(config: &OAuthConfiguration, from: AuthState, to: AuthState) {
    if from.can_transition_to(to) {
        debug!(tool_id = %config.tool_id, provider = %config.provider, ?from, ?to, "Authorization state transition");
    } else {
        warn!(tool_id = %config.tool_id, provider = %config.provider, ?from, ?to, "Unexpected authorization state transition");
    }
}

fn login_intervention(config: &OAuthConfiguration, reason: &str) -> ManualIntervention {
    ManualIntervention {
        required: true,
        reason: reason.to_owned(),
        authorization_url: None,
        state: None,
        expires_at: None,
        instructions: vec![
            format!(
                "Run `toolpin auth {} --provider {} --login` to start a new authorization",
                config.tool_id, config.provider
            ),
            "Open the printed authorization URL in a browser and approve access".to_owned(),
            format!(
                "Run `toolpin auth {} --callback <code> --state <state>` with the values from the redirect",
                config.tool_id
            ),
        ],
    }
}

fn pending_intervention(
    config: &OAuthConfiguration,
    flow: &PendingAuthorizationFlow,
) -> ManualIntervention {
    ManualIntervention {
        required: true,
        reason: "An authorization is waiting for the browser step".to_owned(),
        authorization_url: None,
        state: None,
        expires_at: Some(flow.expires_at),
        instructions: vec![
            format!(
                "Complete the browser authorization started earlier and run `toolpin auth {} --callback <code> --state <state>`",
                config.tool_id
            ),
            format!(
                "Or run `toolpin auth {} --provider {} --login` to start over",
                config.tool_id, config.provider
            ),
        ],
    }
}
