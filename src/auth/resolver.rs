// ABOUTME: Resolves the stored credential of a tool into request headers
// ABOUTME: Static credentials are decrypted from the store; OAuth goes through the flow engine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{AuthHeaderProvider, AuthHeaders, AuthMethod};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::oauth::OAuthEngine;

/// Credential lookup backed by the store and the OAuth engine
#[derive(Clone)]
pub struct CredentialResolver {
    database: Database,
    oauth: Arc<OAuthEngine>,
}

impl CredentialResolver {
    /// Create a resolver
    #[must_use]
    pub const fn new(database: Database, oauth: Arc<OAuthEngine>) -> Self {
        Self { database, oauth }
    }

    /// Store or replace the credential of a tool
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unusable credential, `ResourceNotFound`
    /// if an `oauth` credential names a provider the tool has no
    /// configuration for, or a storage error
    pub async fn store_credential(&self, tool_id: &str, method: &AuthMethod) -> AppResult<()> {
        method.validate()?;
        if let AuthMethod::OAuth { provider } = method {
            let configured = self
                .database
                .get_oauth_configurations_for_tool(tool_id)
                .await?
                .iter()
                .any(|config| &config.provider == provider);
            if !configured {
                return Err(AppError::not_found(format!(
                    "No OAuth configuration for tool '{tool_id}' and provider '{provider}'"
                )));
            }
        }

        let payload = serde_json::to_string(method)
            .map_err(|e| AppError::internal(format!("Failed to serialize credential: {e}")))?;
        self.database
            .upsert_tool_credential(tool_id, method.kind(), &payload, Utc::now())
            .await?;

        info!(tool_id = %tool_id, kind = method.kind(), "Stored tool credential");
        Ok(())
    }

    /// Credential of a tool, if one is stored
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read, decrypted, or parsed
    pub async fn get_credential(&self, tool_id: &str) -> AppResult<Option<AuthMethod>> {
        let Some(stored) = self.database.get_tool_credential(tool_id).await? else {
            return Ok(None);
        };
        let method: AuthMethod = serde_json::from_str(&stored.payload)
            .map_err(|e| AppError::internal(format!("Stored credential is corrupt: {e}")))?;
        if method.kind() != stored.kind {
            return Err(AppError::internal(format!(
                "Stored credential for tool '{tool_id}' does not match its kind"
            )));
        }
        Ok(Some(method))
    }

    /// Delete the credential of a tool
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn remove_credential(&self, tool_id: &str) -> AppResult<bool> {
        self.database.delete_tool_credential(tool_id).await
    }
}

#[async_trait]
impl AuthHeaderProvider for CredentialResolver {
    async fn auth_headers(&self, tool_id: &str, force_refresh: bool) -> AppResult<AuthHeaders> {
        match self.get_credential(tool_id).await? {
            Some(AuthMethod::OAuth { provider }) => {
                self.oauth
                    .auth_headers(tool_id, Some(&provider), force_refresh)
                    .await
            }
            Some(method) => Ok(method
                .header()
                .map_or_else(AuthHeaders::none, |(name, value)| {
                    AuthHeaders::single(name, value, false)
                })),
            None => {
                // A tool with an OAuth configuration but no explicit credential uses OAuth
                if self
                    .database
                    .get_oauth_configurations_for_tool(tool_id)
                    .await?
                    .is_empty()
                {
                    debug!(tool_id = %tool_id, "No credential configured, calling unauthenticated");
                    Ok(AuthHeaders::none())
                } else {
                    self.oauth.auth_headers(tool_id, None, force_refresh).await
                }
            }
        }
    }
}
