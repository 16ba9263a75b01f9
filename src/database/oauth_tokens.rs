// ABOUTME: Current OAuth token per configuration, encrypted at rest
// ABOUTME: Upsert on code exchange, in-place refresh, refresh-token invalidation, and logout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::{
    format_timestamp, get_opt_string, get_opt_timestamp, get_string, get_timestamp, get_uuid,
    Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::OAuthToken;

const SELECT_COLUMNS: &str = r"
    SELECT id, tool_id, config_id, access_token, refresh_token, token_type, expires_at,
           scopes, created_at, last_refreshed
    FROM oauth_tokens
";

fn token_aad(tool_id: &str, config_id: Uuid) -> String {
    format!("{tool_id}|{config_id}|oauth_tokens")
}

/// Token material returned by a refresh
#[derive(Clone)]
pub struct RefreshedTokenData<'a> {
    /// New access token
    pub access_token: &'a str,
    /// Rotated refresh token; `None` keeps the stored one
    pub refresh_token: Option<&'a str>,
    /// Token type reported by the provider
    pub token_type: &'a str,
    /// New expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Scope reported by the provider; `None` keeps the stored one
    pub scopes: Option<&'a str>,
}

impl Database {
    /// Store the token for a configuration, superseding any previous token
    ///
    /// Both tokens are encrypted with AAD binding to the tool and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the write fails
    pub async fn upsert_oauth_token(&self, token: &OAuthToken) -> AppResult<()> {
        let aad_context = token_aad(&token.tool_id, token.config_id);
        let encrypted_access_token = self.encrypt_data_with_aad(&token.access_token, &aad_context)?;
        let encrypted_refresh_token = token
            .refresh_token
            .as_deref()
            .map(|rt| self.encrypt_data_with_aad(rt, &aad_context))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO oauth_tokens (
                id, tool_id, config_id, access_token, refresh_token, token_type, expires_at,
                scopes, created_at, last_refreshed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (config_id)
            DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                scopes = excluded.scopes,
                created_at = excluded.created_at,
                last_refreshed = excluded.last_refreshed
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.tool_id)
        .bind(token.config_id.to_string())
        .bind(&encrypted_access_token)
        .bind(encrypted_refresh_token.as_deref())
        .bind(&token.token_type)
        .bind(token.expires_at.map(format_timestamp))
        .bind(token.scopes.as_deref())
        .bind(format_timestamp(token.created_at))
        .bind(token.last_refreshed.map(format_timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to upsert OAuth token: {e}")))?;

        Ok(())
    }

    /// Get the current token of a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails
    pub async fn get_oauth_token(&self, config_id: Uuid) -> AppResult<Option<OAuthToken>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE config_id = ?1"))
            .bind(config_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query OAuth token: {e}")))?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(self.row_to_oauth_token(&row)?)))
    }

    /// Configurations whose token expires before `cutoff` and still has a refresh token
    ///
    /// Only identifiers are read, so a row that no longer decrypts is reported
    /// by the per-configuration refresh instead of failing the whole scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_refreshable_oauth_tokens_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<(Uuid, String)>> {
        let rows = sqlx::query(
            r"
            SELECT config_id, tool_id
            FROM oauth_tokens
            WHERE expires_at IS NOT NULL AND expires_at < ?1 AND refresh_token IS NOT NULL
            ORDER BY expires_at
            ",
        )
        .bind(format_timestamp(cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to query expiring OAuth tokens: {e}")))?;

        rows.iter()
            .map(|row| Ok((get_uuid(row, "config_id")?, get_string(row, "tool_id")?)))
            .collect()
    }

    /// Apply a refresh to the current token in place
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the update fails
    pub async fn refresh_oauth_token(
        &self,
        tool_id: &str,
        config_id: Uuid,
        data: &RefreshedTokenData<'_>,
        refreshed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let aad_context = token_aad(tool_id, config_id);
        let encrypted_access_token = self.encrypt_data_with_aad(data.access_token, &aad_context)?;
        let encrypted_refresh_token = data
            .refresh_token
            .map(|rt| self.encrypt_data_with_aad(rt, &aad_context))
            .transpose()?;

        let result = sqlx::query(
            r"
            UPDATE oauth_tokens
            SET access_token = ?2,
                refresh_token = COALESCE(?3, refresh_token),
                token_type = ?4,
                expires_at = ?5,
                scopes = COALESCE(?6, scopes),
                last_refreshed = ?7
            WHERE config_id = ?1
            ",
        )
        .bind(config_id.to_string())
        .bind(&encrypted_access_token)
        .bind(encrypted_refresh_token.as_deref())
        .bind(data.token_type)
        .bind(data.expires_at.map(format_timestamp))
        .bind(data.scopes)
        .bind(format_timestamp(refreshed_at))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to refresh OAuth token: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop a refresh token the provider rejected, keeping the access token
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn clear_oauth_refresh_token(&self, config_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("UPDATE oauth_tokens SET refresh_token = NULL WHERE config_id = ?1")
            .bind(config_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to clear refresh token: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the token of a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_oauth_token(&self, config_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE config_id = ?1")
            .bind(config_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete OAuth token: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_oauth_token(&self, row: &SqliteRow) -> AppResult<OAuthToken> {
        let tool_id = get_string(row, "tool_id")?;
        let config_id = get_uuid(row, "config_id")?;
        let aad_context = token_aad(&tool_id, config_id);

        let access_token =
            self.decrypt_data_with_aad(&get_string(row, "access_token")?, &aad_context)?;
        let refresh_token = get_opt_string(row, "refresh_token")?
            .as_deref()
            .map(|ert| self.decrypt_data_with_aad(ert, &aad_context))
            .transpose()?;

        Ok(OAuthToken {
            id: get_uuid(row, "id")?,
            tool_id,
            config_id,
            access_token,
            refresh_token,
            token_type: get_string(row, "token_type")?,
            expires_at: get_opt_timestamp(row, "expires_at")?,
            scopes: get_opt_string(row, "scopes")?,
            created_at: get_timestamp(row, "created_at")?,
            last_refreshed: get_opt_timestamp(row, "last_refreshed")?,
        })
    }
}
