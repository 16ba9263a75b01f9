// ABOUTME: OAuth configuration persistence, one row per (tool_id, provider)
// ABOUTME: Client secrets are encrypted with AAD bound to the owning tool and configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{
    format_timestamp, get_opt_string, get_string, get_timestamp, get_uuid, join_scopes,
    map_write_error, split_scopes, Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::OAuthConfiguration;

const SELECT_COLUMNS: &str = r"
    SELECT id, tool_id, provider, client_id, client_secret, auth_url, token_url, scopes,
           redirect_uri, pkce_enabled, created_at, updated_at
    FROM oauth_configurations
";

fn client_secret_aad(tool_id: &str, config_id: Uuid) -> String {
    format!("{tool_id}|{config_id}|oauth_configurations.client_secret")
}

impl Database {
    /// Insert a configuration, encrypting the optional client secret
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the tool already has a configuration for the
    /// provider, or an encryption/database error
    pub async fn insert_oauth_configuration(
        &self,
        config: &OAuthConfiguration,
        client_secret: Option<&str>,
    ) -> AppResult<()> {
        let encrypted_secret = client_secret
            .map(|secret| {
                self.encrypt_data_with_aad(secret, &client_secret_aad(&config.tool_id, config.id))
            })
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO oauth_configurations (
                id, tool_id, provider, client_id, client_secret, auth_url, token_url, scopes,
                redirect_uri, pkce_enabled, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(config.id.to_string())
        .bind(&config.tool_id)
        .bind(&config.provider)
        .bind(&config.client_id)
        .bind(encrypted_secret.as_deref())
        .bind(&config.auth_url)
        .bind(&config.token_url)
        .bind(join_scopes(&config.scopes))
        .bind(&config.redirect_uri)
        .bind(config.pkce_enabled)
        .bind(format_timestamp(config.created_at))
        .bind(format_timestamp(config.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(
                &e,
                &format!(
                    "OAuth configuration for tool '{}' and provider '{}'",
                    config.tool_id, config.provider
                ),
            )
        })?;

        Ok(())
    }

    /// Get a configuration by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_oauth_configuration(&self, id: Uuid) -> AppResult<Option<OAuthConfiguration>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query OAuth configuration: {e}")))?;

        row.as_ref().map(row_to_oauth_configuration).transpose()
    }

    /// Get all configurations of a tool, ordered by provider
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_oauth_configurations_for_tool(
        &self,
        tool_id: &str,
    ) -> AppResult<Vec<OAuthConfiguration>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tool_id = ?1 ORDER BY provider"))
            .bind(tool_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::database(format!("Failed to query OAuth configurations: {e}"))
            })?;

        rows.iter().map(row_to_oauth_configuration).collect()
    }

    /// List every configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_oauth_configurations(&self) -> AppResult<Vec<OAuthConfiguration>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY tool_id, provider"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list OAuth configurations: {e}")))?;

        rows.iter().map(row_to_oauth_configuration).collect()
    }

    /// Decrypt the client secret of a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails
    pub async fn get_oauth_client_secret(
        &self,
        config: &OAuthConfiguration,
    ) -> AppResult<Option<String>> {
        let encrypted = sqlx::query_scalar::<_, Option<String>>(
            "SELECT client_secret FROM oauth_configurations WHERE id = ?1",
        )
        .bind(config.id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to query client secret: {e}")))?
        .flatten();

        encrypted
            .map(|secret| {
                self.decrypt_data_with_aad(&secret, &client_secret_aad(&config.tool_id, config.id))
            })
            .transpose()
    }

    /// Correct the endpoints, scopes, or redirect URI of a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_oauth_configuration(
        &self,
        config: &OAuthConfiguration,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE oauth_configurations
            SET auth_url = ?2,
                token_url = ?3,
                scopes = ?4,
                redirect_uri = ?5,
                updated_at = ?6
            WHERE id = ?1
            ",
        )
        .bind(config.id.to_string())
        .bind(&config.auth_url)
        .bind(&config.token_url)
        .bind(join_scopes(&config.scopes))
        .bind(&config.redirect_uri)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update OAuth configuration: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a configuration together with its token and pending flows
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_oauth_configuration(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM oauth_configurations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete OAuth configuration: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_oauth_configuration(row: &SqliteRow) -> AppResult<OAuthConfiguration> {
    Ok(OAuthConfiguration {
        id: get_uuid(row, "id")?,
        tool_id: get_string(row, "tool_id")?,
        provider: get_string(row, "provider")?,
        client_id: get_string(row, "client_id")?,
        has_client_secret: get_opt_string(row, "client_secret")?.is_some(),
        auth_url: get_string(row, "auth_url")?,
        token_url: get_string(row, "token_url")?,
        scopes: split_scopes(&get_string(row, "scopes")?),
        redirect_uri: get_string(row, "redirect_uri")?,
        pkce_enabled: row
            .try_get("pkce_enabled")
            .map_err(|e| AppError::database(format!("Failed to get pkce_enabled: {e}")))?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}
