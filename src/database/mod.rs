// ABOUTME: SQLite persistence for interfaces, OAuth state, credentials, and performance samples
// ABOUTME: Owns the connection pool, embedded migrations, and the credential cipher
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Fixed interface records
pub mod fixed_interfaces;
/// OAuth provider configurations
pub mod oauth_configurations;
/// Current OAuth token per configuration
pub mod oauth_tokens;
/// Pending authorization flows keyed by single-use state
pub mod pending_flows;
/// Append-only performance samples
pub mod performance_metrics;
/// Static credentials (api key, bearer, basic) per tool
pub mod tool_credentials;

pub use fixed_interfaces::InterfaceFilter;
pub use oauth_tokens::RefreshedTokenData;
pub use performance_metrics::MetricFilter;
pub use tool_credentials::StoredCredential;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::CredentialCipher;
use crate::errors::{AppError, AppResult};

/// Database connection pool with credential encryption
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    cipher: Arc<CredentialCipher>,
}

/// Rows removed by [`Database::purge_tool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PurgeSummary {
    /// Fixed interfaces deleted
    pub interfaces: u64,
    /// OAuth configurations deleted (tokens and pending flows cascade)
    pub oauth_configurations: u64,
    /// Static credentials deleted
    pub credentials: u64,
}

impl Database {
    /// Connect, create the database file if needed, and run migrations
    ///
    /// In-memory URLs get a single long-lived connection so every query sees
    /// the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database URL is invalid or malformed
    /// - The parent directory or database file cannot be created
    /// - Database connection fails
    /// - Migration process fails
    pub async fn new(database_url: &str, cipher: CredentialCipher) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            ensure_parent_dir(options.get_filename())?;
            SqlitePoolOptions::new()
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await
        }
        .map_err(|e| AppError::database(format!("Failed to connect to database: {e}")))?;

        let db = Self {
            pool,
            cipher: Arc::new(cipher),
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Credential cipher used for every encrypted column
    #[must_use]
    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// Run all embedded migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails
    pub async fn migrate(&self) -> AppResult<()> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Encrypt a credential bound to its row context
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn encrypt_data_with_aad(&self, data: &str, aad_context: &str) -> AppResult<String> {
        self.cipher.encrypt_data_with_aad(data, aad_context)
    }

    /// Decrypt a credential bound to its row context
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails or the context does not match
    pub fn decrypt_data_with_aad(&self, encrypted_data: &str, aad_context: &str) -> AppResult<String> {
        self.cipher.decrypt_data_with_aad(encrypted_data, aad_context)
    }

    /// Remove everything stored for a tool in one transaction
    ///
    /// Performance samples are kept; their interface reference becomes null.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed in that case
    pub async fn purge_tool(&self, tool_id: &str) -> AppResult<PurgeSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        let interfaces = sqlx::query("DELETE FROM fixed_interfaces WHERE tool_id = ?1")
            .bind(tool_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete tool interfaces: {e}")))?
            .rows_affected();

        let oauth_configurations = sqlx::query("DELETE FROM oauth_configurations WHERE tool_id = ?1")
            .bind(tool_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!("Failed to delete tool OAuth configurations: {e}"))
            })?
            .rows_affected();

        let credentials = sqlx::query("DELETE FROM tool_credentials WHERE tool_id = ?1")
            .bind(tool_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete tool credentials: {e}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit tool purge: {e}")))?;

        debug!(tool_id, interfaces, oauth_configurations, credentials, "Purged tool");
        Ok(PurgeSummary {
            interfaces,
            oauth_configurations,
            credentials,
        })
    }
}

fn ensure_parent_dir(path: &Path) -> AppResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| {
                AppError::database(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            }),
        _ => Ok(()),
    }
}

/// Map a write failure, turning unique-constraint violations into `Conflict`
pub(crate) fn map_write_error(error: &sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = error {
        if db_err.is_unique_violation() {
            return AppError::conflict(format!("{what} already exists"));
        }
    }
    AppError::database(format!("Failed to write {what}: {error}"))
}

/// Fixed-width RFC 3339 so text comparison in SQL orders chronologically
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn get_string(row: &SqliteRow, column: &str) -> AppResult<String> {
    row.try_get(column)
        .map_err(|e| AppError::database(format!("Failed to get {column}: {e}")))
}

pub(crate) fn get_opt_string(row: &SqliteRow, column: &str) -> AppResult<Option<String>> {
    row.try_get(column)
        .map_err(|e| AppError::database(format!("Failed to get {column}: {e}")))
}

pub(crate) fn get_uuid(row: &SqliteRow, column: &str) -> AppResult<Uuid> {
    let raw = get_string(row, column)?;
    Uuid::parse_str(&raw)
        .map_err(|e| AppError::database(format!("Invalid UUID in {column}: {e}")))
}

pub(crate) fn get_timestamp(row: &SqliteRow, column: &str) -> AppResult<DateTime<Utc>> {
    parse_timestamp(&get_string(row, column)?, column)
}

pub(crate) fn get_opt_timestamp(row: &SqliteRow, column: &str) -> AppResult<Option<DateTime<Utc>>> {
    get_opt_string(row, column)?
        .map(|raw| parse_timestamp(&raw, column))
        .transpose()
}

fn parse_timestamp(raw: &str, column: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("Invalid timestamp in {column}: {e}")))
}

/// Space-separated scope list as stored in scope columns
pub(crate) fn join_scopes(scopes: &[String]) -> String {
    scopes.join(" ")
}

pub(crate) fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(ToOwned::to_owned).collect()
}
