// ABOUTME: Static tool credentials stored as an encrypted tagged payload
// ABOUTME: One row per tool; the payload is only ever decrypted in memory
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;

use chrono::{DateTime, Utc};

use super::{format_timestamp, get_string, get_timestamp, Database};
use crate::errors::{AppError, AppResult};

fn credential_aad(tool_id: &str, kind: &str) -> String {
    format!("{tool_id}|{kind}|tool_credentials")
}

/// Decrypted credential row
#[derive(Clone)]
pub struct StoredCredential {
    /// Owning tool
    pub tool_id: String,
    /// Variant tag (`api_key`, `bearer`, `basic`, `oauth`)
    pub kind: String,
    /// Variant payload as JSON (plaintext, in memory only)
    pub payload: String,
    /// When first stored
    pub created_at: DateTime<Utc>,
    /// When last replaced
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("tool_id", &self.tool_id)
            .field("kind", &self.kind)
            .field("payload", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Database {
    /// Store or replace the credential of a tool
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the write fails
    pub async fn upsert_tool_credential(
        &self,
        tool_id: &str,
        kind: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let encrypted = self.encrypt_data_with_aad(payload, &credential_aad(tool_id, kind))?;

        sqlx::query(
            r"
            INSERT INTO tool_credentials (tool_id, kind, payload, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (tool_id)
            DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(tool_id)
        .bind(kind)
        .bind(&encrypted)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to store tool credential: {e}")))?;

        Ok(())
    }

    /// Get and decrypt the credential of a tool
    ///
    /// # Errors
    ///
    /// Returns an error if the query or decryption fails
    pub async fn get_tool_credential(&self, tool_id: &str) -> AppResult<Option<StoredCredential>> {
        let row = sqlx::query(
            "SELECT tool_id, kind, payload, created_at, updated_at FROM tool_credentials WHERE tool_id = ?1",
        )
        .bind(tool_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to query tool credential: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let kind = get_string(&row, "kind")?;
        let payload =
            self.decrypt_data_with_aad(&get_string(&row, "payload")?, &credential_aad(tool_id, &kind))?;

        Ok(Some(StoredCredential {
            tool_id: get_string(&row, "tool_id")?,
            kind,
            payload,
            created_at: get_timestamp(&row, "created_at")?,
            updated_at: get_timestamp(&row, "updated_at")?,
        }))
    }

    /// Delete the credential of a tool
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_tool_credential(&self, tool_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM tool_credentials WHERE tool_id = ?1")
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete tool credential: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
