// ABOUTME: Pending authorization flows keyed by single-use state value
// ABOUTME: Supersede-on-initiate, atomic consume via DELETE RETURNING, and TTL purge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::{
    format_timestamp, get_opt_string, get_string, get_timestamp, get_uuid, join_scopes,
    map_write_error, split_scopes, Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::PendingAuthorizationFlow;

const RETURNING_COLUMNS: &str =
    "state, config_id, tool_id, code_verifier, code_challenge, redirect_uri, scopes, created_at, expires_at";

fn verifier_aad(tool_id: &str, config_id: Uuid) -> String {
    format!("{tool_id}|{config_id}|pending_authorization_flows")
}

impl Database {
    /// Persist a flow, discarding any older pending flow of the same configuration
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the write fails
    pub async fn replace_pending_flow(&self, flow: &PendingAuthorizationFlow) -> AppResult<()> {
        let encrypted_verifier = flow
            .code_verifier
            .as_deref()
            .map(|verifier| {
                self.encrypt_data_with_aad(verifier, &verifier_aad(&flow.tool_id, flow.config_id))
            })
            .transpose()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        sqlx::query("DELETE FROM pending_authorization_flows WHERE config_id = ?1")
            .bind(flow.config_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to discard pending flows: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO pending_authorization_flows (
                state, config_id, tool_id, code_verifier, code_challenge, redirect_uri, scopes,
                created_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&flow.state)
        .bind(flow.config_id.to_string())
        .bind(&flow.tool_id)
        .bind(encrypted_verifier.as_deref())
        .bind(flow.code_challenge.as_deref())
        .bind(&flow.redirect_uri)
        .bind(join_scopes(&flow.scopes))
        .bind(format_timestamp(flow.created_at))
        .bind(format_timestamp(flow.expires_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(&e, "Pending authorization flow"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit pending flow: {e}")))?;

        Ok(())
    }

    /// Remove and return the flow for `state`
    ///
    /// The row is deleted whether or not it has expired, so a state value can
    /// be presented at most once. Callers check expiry on the returned flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete or decryption fails
    pub async fn consume_pending_flow(
        &self,
        state: &str,
    ) -> AppResult<Option<PendingAuthorizationFlow>> {
        let row = sqlx::query(&format!(
            "DELETE FROM pending_authorization_flows WHERE state = ?1 RETURNING {RETURNING_COLUMNS}"
        ))
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to consume pending flow: {e}")))?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(self.row_to_pending_flow(&row)?)))
    }

    /// Pending flow of a configuration, if one is waiting
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails
    pub async fn get_pending_flow_for_config(
        &self,
        config_id: Uuid,
    ) -> AppResult<Option<PendingAuthorizationFlow>> {
        let row = sqlx::query(&format!(
            "SELECT {RETURNING_COLUMNS} FROM pending_authorization_flows \
             WHERE config_id = ?1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(config_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to query pending flow: {e}")))?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(self.row_to_pending_flow(&row)?)))
    }

    /// Discard every pending flow of a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_pending_flows_for_config(&self, config_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM pending_authorization_flows WHERE config_id = ?1")
            .bind(config_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete pending flows: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Discard flows whose window has closed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn purge_expired_pending_flows(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM pending_authorization_flows WHERE expires_at <= ?1")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to purge pending flows: {e}")))?;

        Ok(result.rows_affected())
    }

    fn row_to_pending_flow(&self, row: &SqliteRow) -> AppResult<PendingAuthorizationFlow> {
        let tool_id = get_string(row, "tool_id")?;
        let config_id = get_uuid(row, "config_id")?;
        let code_verifier = get_opt_string(row, "code_verifier")?
            .as_deref()
            .map(|verifier| self.decrypt_data_with_aad(verifier, &verifier_aad(&tool_id, config_id)))
            .transpose()?;

        Ok(PendingAuthorizationFlow {
            state: get_string(row, "state")?,
            config_id,
            tool_id,
            code_verifier,
            code_challenge: get_opt_string(row, "code_challenge")?,
            redirect_uri: get_string(row, "redirect_uri")?,
            scopes: split_scopes(&get_string(row, "scopes")?),
            created_at: get_timestamp(row, "created_at")?,
            expires_at: get_timestamp(row, "expires_at")?,
        })
    }
}
