// ABOUTME: Append-only performance samples and the per-interface execution counters
// ABOUTME: Sample insert and counter update commit together in one transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::fixed_interfaces::row_to_fixed_interface;
use super::{format_timestamp, get_opt_string, get_string, get_timestamp, get_uuid, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{AccessType, FixedInterface, PerformanceMetric};
use crate::telemetry::performance_score;

/// Read-path filters for performance samples
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter {
    /// Only samples of this tool
    pub tool_id: Option<String>,
    /// Only samples served by this interface
    pub interface_id: Option<Uuid>,
    /// Only samples of this operation
    pub operation_name: Option<String>,
    /// Only samples of this access type
    pub access_type: Option<AccessType>,
    /// Only samples recorded at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl Database {
    /// Append a sample that does not belong to a fixed interface execution
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn insert_performance_metric(&self, metric: &PerformanceMetric) -> AppResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        insert_metric(&mut conn, metric).await
    }

    /// Append a sample and fold it into the interface counters atomically
    ///
    /// Returns the updated interface, or `None` when the sample has no
    /// interface or the interface no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; nothing is written in that case
    pub async fn record_interface_execution(
        &self,
        metric: &PerformanceMetric,
    ) -> AppResult<Option<FixedInterface>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        insert_metric(&mut tx, metric).await?;

        let updated = match metric.interface_id {
            Some(interface_id) => update_counters(&mut tx, interface_id, metric).await?,
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit execution metric: {e}")))?;

        Ok(updated)
    }

    /// Samples matching every set filter, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_performance_metrics(
        &self,
        filter: &MetricFilter,
    ) -> AppResult<Vec<PerformanceMetric>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r"
            SELECT id, interface_id, tool_id, access_type, operation_name, response_time_ms,
                   success, error_category, error_details, metadata, timestamp
            FROM performance_metrics
            WHERE 1 = 1",
        );
        if let Some(tool_id) = &filter.tool_id {
            builder.push(" AND tool_id = ").push_bind(tool_id.clone());
        }
        if let Some(interface_id) = filter.interface_id {
            builder
                .push(" AND interface_id = ")
                .push_bind(interface_id.to_string());
        }
        if let Some(operation_name) = &filter.operation_name {
            builder
                .push(" AND operation_name = ")
                .push_bind(operation_name.clone());
        }
        if let Some(access_type) = filter.access_type {
            builder
                .push(" AND access_type = ")
                .push_bind(access_type.as_str());
        }
        if let Some(since) = filter.since {
            builder
                .push(" AND timestamp >= ")
                .push_bind(format_timestamp(since));
        }
        builder.push(" ORDER BY timestamp, id");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list performance metrics: {e}")))?;

        rows.iter().map(row_to_metric).collect()
    }
}

async fn insert_metric(conn: &mut SqliteConnection, metric: &PerformanceMetric) -> AppResult<()> {
    let metadata = metric
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r"
        INSERT INTO performance_metrics (
            id, interface_id, tool_id, access_type, operation_name, response_time_ms, success,
            error_category, error_details, metadata, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ",
    )
    .bind(metric.id.to_string())
    .bind(metric.interface_id.map(|id| id.to_string()))
    .bind(&metric.tool_id)
    .bind(metric.access_type.as_str())
    .bind(&metric.operation_name)
    .bind(metric.response_time_ms)
    .bind(metric.success)
    .bind(metric.error_category.as_deref())
    .bind(metric.error_message.as_deref())
    .bind(metadata)
    .bind(format_timestamp(metric.timestamp))
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to insert performance metric: {e}")))?;

    Ok(())
}

async fn update_counters(
    conn: &mut SqliteConnection,
    interface_id: Uuid,
    metric: &PerformanceMetric,
) -> AppResult<Option<FixedInterface>> {
    let counters = sqlx::query(
        r"
        UPDATE fixed_interfaces
        SET execution_count = execution_count + 1,
            success_count = success_count + ?2,
            average_response_time =
                (average_response_time * execution_count + ?3) / (execution_count + 1)
        WHERE id = ?1
        RETURNING execution_count, success_count, average_response_time
        ",
    )
    .bind(interface_id.to_string())
    .bind(i64::from(metric.success))
    .bind(metric.response_time_ms as f64)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to update interface counters: {e}")))?;

    let Some(counters) = counters else {
        return Ok(None);
    };
    let execution_count: i64 = counters
        .try_get("execution_count")
        .map_err(|e| AppError::database(format!("Failed to get execution_count: {e}")))?;
    let success_count: i64 = counters
        .try_get("success_count")
        .map_err(|e| AppError::database(format!("Failed to get success_count: {e}")))?;
    let average: f64 = counters
        .try_get("average_response_time")
        .map_err(|e| AppError::database(format!("Failed to get average_response_time: {e}")))?;

    let row = sqlx::query(
        r"
        UPDATE fixed_interfaces
        SET performance_score = ?2
        WHERE id = ?1
        RETURNING id, tool_id, name, display_name, description, schema_json, parameters_json,
                  response_schema_json, version, is_active, validation_status, validation_notes,
                  created_at, updated_at, last_validated, performance_score, execution_count,
                  success_count, average_response_time
        ",
    )
    .bind(interface_id.to_string())
    .bind(performance_score(success_count, execution_count, average))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::database(format!("Failed to update performance score: {e}")))?;

    row_to_fixed_interface(&row).map(Some)
}

fn row_to_metric(row: &SqliteRow) -> AppResult<PerformanceMetric> {
    let interface_id = get_opt_string(row, "interface_id")?
        .map(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|e| AppError::database(format!("Invalid UUID in interface_id: {e}")))
        })
        .transpose()?;
    let metadata = get_opt_string(row, "metadata")?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| AppError::database(format!("Invalid JSON in metadata: {e}")))
        })
        .transpose()?;

    Ok(PerformanceMetric {
        id: get_uuid(row, "id")?,
        interface_id,
        tool_id: get_string(row, "tool_id")?,
        access_type: get_string(row, "access_type")?.parse()?,
        operation_name: get_string(row, "operation_name")?,
        response_time_ms: row
            .try_get("response_time_ms")
            .map_err(|e| AppError::database(format!("Failed to get response_time_ms: {e}")))?,
        success: row
            .try_get("success")
            .map_err(|e| AppError::database(format!("Failed to get success: {e}")))?,
        error_category: get_opt_string(row, "error_category")?,
        error_message: get_opt_string(row, "error_details")?,
        metadata,
        timestamp: get_timestamp(row, "timestamp")?,
    })
}
