// ABOUTME: Fixed interface persistence with unique (name, tool_id) enforcement
// ABOUTME: Insert, optimistic replace, lookup, filtered listing, validation and lifecycle updates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::{
    format_timestamp, get_opt_string, get_opt_timestamp, get_string, get_timestamp, get_uuid,
    map_write_error, Database,
};
use crate::errors::{AppError, AppResult};
use crate::models::{FixedInterface, SchemaChange, SemanticVersion, ValidationStatus};

const SELECT_COLUMNS: &str = r"
    SELECT id, tool_id, name, display_name, description, schema_json, parameters_json,
           response_schema_json, version, is_active, validation_status, validation_notes,
           created_at, updated_at, last_validated, performance_score, execution_count,
           success_count, average_response_time
    FROM fixed_interfaces
";

/// Read-path filters for [`Database::list_fixed_interfaces`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    /// Only interfaces of this tool
    pub tool_id: Option<String>,
    /// Only interfaces with this exact name
    pub name: Option<String>,
    /// Only active (`Some(true)`) or retired (`Some(false)`) interfaces
    pub active: Option<bool>,
    /// Only interfaces at this version
    pub version: Option<SemanticVersion>,
}

impl Database {
    /// Insert a new interface
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if an interface with the same name already exists
    /// for the tool, or a database error
    pub async fn insert_fixed_interface(&self, interface: &FixedInterface) -> AppResult<()> {
        let notes = serde_json::to_string(&interface.validation_notes)?;
        sqlx::query(
            r"
            INSERT INTO fixed_interfaces (
                id, tool_id, name, display_name, description, schema_json, parameters_json,
                response_schema_json, version, is_active, validation_status, validation_notes,
                created_at, updated_at, last_validated, performance_score, execution_count,
                success_count, average_response_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ",
        )
        .bind(interface.id.to_string())
        .bind(&interface.tool_id)
        .bind(&interface.name)
        .bind(interface.display_name.as_deref())
        .bind(interface.description.as_deref())
        .bind(interface.operation_schema.to_string())
        .bind(interface.parameters_schema.to_string())
        .bind(interface.response_schema.to_string())
        .bind(interface.version.to_string())
        .bind(interface.is_active)
        .bind(interface.validation_status.as_str())
        .bind(notes)
        .bind(format_timestamp(interface.created_at))
        .bind(format_timestamp(interface.updated_at))
        .bind(interface.last_validated.map(format_timestamp))
        .bind(interface.performance_score)
        .bind(interface.execution_count)
        .bind(interface.success_count)
        .bind(interface.average_response_time)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(
                &e,
                &format!(
                    "Interface '{}' for tool '{}'",
                    interface.name, interface.tool_id
                ),
            )
        })?;

        Ok(())
    }

    /// Replace the definition of an existing interface
    ///
    /// Only succeeds if the stored row still has `expected_updated_at`, so two
    /// concurrent forced registrations cannot silently overwrite each other.
    /// Counters, id, and creation time are never touched.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the row changed since it was read, or a database error
    pub async fn replace_fixed_interface(
        &self,
        interface: &FixedInterface,
        expected_updated_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let notes = serde_json::to_string(&interface.validation_notes)?;
        let result = sqlx::query(
            r"
            UPDATE fixed_interfaces
            SET display_name = ?3,
                description = ?4,
                schema_json = ?5,
                parameters_json = ?6,
                response_schema_json = ?7,
                version = ?8,
                is_active = ?9,
                validation_status = ?10,
                validation_notes = ?11,
                last_validated = ?12,
                updated_at = ?13
            WHERE id = ?1 AND updated_at = ?2
            ",
        )
        .bind(interface.id.to_string())
        .bind(format_timestamp(expected_updated_at))
        .bind(interface.display_name.as_deref())
        .bind(interface.description.as_deref())
        .bind(interface.operation_schema.to_string())
        .bind(interface.parameters_schema.to_string())
        .bind(interface.response_schema.to_string())
        .bind(interface.version.to_string())
        .bind(interface.is_active)
        .bind(interface.validation_status.as_str())
        .bind(notes)
        .bind(interface.last_validated.map(format_timestamp))
        .bind(format_timestamp(interface.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(&e, &format!("Interface '{}'", interface.name)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Interface '{}' for tool '{}' was modified concurrently",
                interface.name, interface.tool_id
            )));
        }
        Ok(())
    }

    /// Get an interface by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is malformed
    pub async fn get_fixed_interface(&self, id: Uuid) -> AppResult<Option<FixedInterface>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query fixed interface: {e}")))?;

        row.as_ref().map(row_to_fixed_interface).transpose()
    }

    /// Get an interface by tool and name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is malformed
    pub async fn get_fixed_interface_by_name(
        &self,
        tool_id: &str,
        name: &str,
    ) -> AppResult<Option<FixedInterface>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tool_id = ?1 AND name = ?2"))
            .bind(tool_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to query fixed interface: {e}")))?;

        row.as_ref().map(row_to_fixed_interface).transpose()
    }

    /// List interfaces matching every set filter, ordered by tool then name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored column is malformed
    pub async fn list_fixed_interfaces(
        &self,
        filter: &InterfaceFilter,
    ) -> AppResult<Vec<FixedInterface>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");
        if let Some(tool_id) = &filter.tool_id {
            builder.push(" AND tool_id = ").push_bind(tool_id.clone());
        }
        if let Some(name) = &filter.name {
            builder.push(" AND name = ").push_bind(name.clone());
        }
        if let Some(active) = filter.active {
            builder.push(" AND is_active = ").push_bind(active);
        }
        if let Some(version) = filter.version {
            builder.push(" AND version = ").push_bind(version.to_string());
        }
        builder.push(" ORDER BY tool_id, name");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list fixed interfaces: {e}")))?;

        rows.iter().map(row_to_fixed_interface).collect()
    }

    /// Activate or retire an interface
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn set_fixed_interface_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE fixed_interfaces SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(active)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update interface status: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the outcome of a validation
    ///
    /// `last_validated` is only advanced when `validated_at` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn record_fixed_interface_validation(
        &self,
        id: Uuid,
        status: ValidationStatus,
        notes: &[SchemaChange],
        validated_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let notes = serde_json::to_string(notes)?;
        let result = sqlx::query(
            r"
            UPDATE fixed_interfaces
            SET validation_status = ?2,
                validation_notes = ?3,
                last_validated = COALESCE(?4, last_validated),
                updated_at = ?5
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(notes)
        .bind(validated_at.map(format_timestamp))
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to record interface validation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard-delete an interface; its performance samples keep a null reference
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_fixed_interface(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM fixed_interfaces WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete fixed interface: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn row_to_fixed_interface(row: &SqliteRow) -> AppResult<FixedInterface> {
    let parse_json = |column: &str| -> AppResult<serde_json::Value> {
        serde_json::from_str(&get_string(row, column)?)
            .map_err(|e| AppError::database(format!("Invalid JSON in {column}: {e}")))
    };
    let validation_notes = get_opt_string(row, "validation_notes")?
        .map(|raw| {
            serde_json::from_str::<Vec<SchemaChange>>(&raw)
                .map_err(|e| AppError::database(format!("Invalid validation_notes: {e}")))
        })
        .transpose()?
        .unwrap_or_default();

    Ok(FixedInterface {
        id: get_uuid(row, "id")?,
        tool_id: get_string(row, "tool_id")?,
        name: get_string(row, "name")?,
        display_name: get_opt_string(row, "display_name")?,
        description: get_opt_string(row, "description")?,
        operation_schema: parse_json("schema_json")?,
        parameters_schema: parse_json("parameters_json")?,
        response_schema: parse_json("response_schema_json")?,
        version: get_string(row, "version")?
            .parse()
            .map_err(|e: AppError| AppError::database(format!("Invalid version: {e}")))?,
        is_active: row
            .try_get("is_active")
            .map_err(|e| AppError::database(format!("Failed to get is_active: {e}")))?,
        validation_status: get_string(row, "validation_status")?.parse()?,
        validation_notes,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
        last_validated: get_opt_timestamp(row, "last_validated")?,
        performance_score: row
            .try_get("performance_score")
            .map_err(|e| AppError::database(format!("Failed to get performance_score: {e}")))?,
        execution_count: row
            .try_get("execution_count")
            .map_err(|e| AppError::database(format!("Failed to get execution_count: {e}")))?,
        success_count: row
            .try_get("success_count")
            .map_err(|e| AppError::database(format!("Failed to get success_count: {e}")))?,
        average_response_time: row
            .try_get("average_response_time")
            .map_err(|e| {
                AppError::database(format!("Failed to get average_response_time: {e}"))
            })?,
    })
}
