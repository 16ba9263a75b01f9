// ABOUTME: Lifecycle and execution of fixed interfaces
// ABOUTME: Validates parameters before any remote call and records a sample for every execution
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Fixed Interface Registry
//!
//! Execution path:
//!
//! 1. load the interface (cache, then store)
//! 2. reject retired interfaces unless forced
//! 3. validate parameters, then the `tools/call` envelope; every violation is reported
//! 4. obtain auth headers (OAuth tokens near expiry are refreshed first)
//! 5. call the remote endpoint with retries for network failures; a 401
//!    triggers one forced token refresh and one more call
//! 6. optionally validate the response
//! 7. record one performance sample and fold it into the interface counters
//!
//! The cache is written only after the store commits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::InterfaceCache;
use super::types::{
    DynamicCallResult, ExecuteOptions, InterfaceStats, InterfaceSummary, RegisterInterfaceRequest,
    RegisterOptions, RevalidationFailure, RevalidationReport, UpdateInterfaceRequest,
};
use crate::auth::{AuthHeaderProvider, AuthHeaders};
use crate::config::RegistrySettings;
use crate::constants::protocol::{CALL_METHOD, LIST_METHOD};
use crate::database::{Database, InterfaceFilter, PurgeSummary};
use crate::errors::{AppError, AppResult, ErrorPayload, FieldViolation};
use crate::external::{parse_tool_list, ProtocolClient, ProtocolResponse, RemoteOperation, ToolRegistry};
use crate::models::{
    AccessType, ChangeKind, Compatibility, ExecutionResult, FixedInterface, SchemaChange,
    SemanticVersion, ValidationResult, ValidationStatus,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::schema::{diff_schemas, ensure_well_formed, operation_envelope_schema, SchemaValidator, SynthesizedSchemas};
use crate::telemetry::{build_metric, PerformanceTracker};

/// Outcome of one authenticated remote call
struct RemoteCall {
    data: Value,
    attempts: u32,
    auth_refreshed: bool,
}

/// Live shape of an operation
struct Discovery {
    operation: Option<RemoteOperation>,
    elapsed: Duration,
}

/// Fixed interface registry
pub struct FixedInterfaceRegistry {
    database: Database,
    tool_registry: Arc<dyn ToolRegistry>,
    protocol: Arc<dyn ProtocolClient>,
    auth: Arc<dyn AuthHeaderProvider>,
    tracker: PerformanceTracker,
    cache: InterfaceCache,
    settings: RegistrySettings,
}

impl FixedInterfaceRegistry {
    /// Create a registry over its collaborators
    #[must_use]
    pub fn new(
        database: Database,
        tool_registry: Arc<dyn ToolRegistry>,
        protocol: Arc<dyn ProtocolClient>,
        auth: Arc<dyn AuthHeaderProvider>,
        settings: RegistrySettings,
    ) -> Self {
        let tracker = PerformanceTracker::new(database.clone());
        Self {
            database,
            tool_registry,
            protocol,
            auth,
            tracker,
            cache: InterfaceCache::new(),
            settings,
        }
    }

    /// Performance tracker sharing the registry's store
    #[must_use]
    pub const fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    /// Read cache
    #[must_use]
    pub const fn cache(&self) -> &InterfaceCache {
        &self.cache
    }

    /// Register an interface, or re-register it with `force`
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` listing every malformed schema or missing field, or
    ///   an explicit version lower than the existing one
    /// - `Conflict` if the name exists for the tool and `force` is unset, or a
    ///   concurrent registration won the race
    /// - `ResourceNotFound` if discovery is requested and the tool or
    ///   operation is unknown
    pub async fn register(
        &self,
        request: RegisterInterfaceRequest,
        options: RegisterOptions,
    ) -> AppResult<FixedInterface> {
        let tool_id = request.tool_id.trim().to_owned();
        let name = request.name.trim().to_owned();
        let mut violations = Vec::new();
        if tool_id.is_empty() {
            violations.push(FieldViolation::new("tool_id", "is required"));
        }
        if name.is_empty() {
            violations.push(FieldViolation::new("name", "is required"));
        }
        if !violations.is_empty() {
            return Err(AppError::validation("Invalid interface registration", violations));
        }

        let mut synthesized = None;
        let mut discovered_at = None;
        if options.auto_discover || options.validate_tool {
            let discovery = self.discover(&tool_id, &name, None).await?;
            let operation = discovery.operation.ok_or_else(|| {
                AppError::not_found(format!("Tool '{tool_id}' does not advertise operation '{name}'"))
            })?;
            if options.auto_discover {
                synthesized = Some(SynthesizedSchemas::from_operation(&operation));
                discovered_at = Some(Utc::now());
            }
        }

        let operation_schema = request
            .operation_schema
            .or_else(|| synthesized.as_ref().map(|s| s.operation_schema.clone()))
            .unwrap_or_else(|| operation_envelope_schema(&name));
        let parameters_schema = request
            .parameters_schema
            .or_else(|| synthesized.as_ref().map(|s| s.parameters_schema.clone()))
            .unwrap_or_else(|| json!({ "type": "object" }));
        let response_schema = request
            .response_schema
            .or_else(|| synthesized.as_ref().map(|s| s.response_schema.clone()))
            .unwrap_or_else(|| json!({}));
        let description = request
            .description
            .or_else(|| synthesized.as_ref().and_then(|s| s.description.clone()));

        check_schemas(&[
            ("operation_schema", &operation_schema),
            ("parameters_schema", &parameters_schema),
            ("response_schema", &response_schema),
        ])?;

        let existing = self.database.get_fixed_interface_by_name(&tool_id, &name).await?;
        if existing.is_some() && !options.force {
            return Err(AppError::conflict(format!(
                "Interface '{name}' already exists for tool '{tool_id}'; use force to overwrite"
            )));
        }

        let now = Utc::now();
        let version = next_version(existing.as_ref().map(|e| e.version), request.version)?;
        let (validation_status, last_validated) = discovered_at.map_or(
            (ValidationStatus::Unknown, None),
            |at| (ValidationStatus::Valid, Some(at)),
        );

        let interface = match &existing {
            Some(existing) => FixedInterface {
                display_name: request.display_name,
                description,
                operation_schema,
                parameters_schema,
                response_schema,
                version,
                is_active: true,
                validation_status,
                validation_notes: Vec::new(),
                updated_at: now,
                last_validated,
                ..existing.clone()
            },
            None => FixedInterface {
                id: Uuid::new_v4(),
                tool_id: tool_id.clone(),
                name: name.clone(),
                display_name: request.display_name,
                description,
                operation_schema,
                parameters_schema,
                response_schema,
                version,
                is_active: true,
                validation_status,
                validation_notes: Vec::new(),
                created_at: now,
                updated_at: now,
                last_validated,
                performance_score: 0.0,
                execution_count: 0,
                success_count: 0,
                average_response_time: 0.0,
            },
        };

        if options.dry_run {
            debug!(tool_id = %tool_id, name = %name, "Dry run, interface not persisted");
            return Ok(interface);
        }

        match &existing {
            Some(existing) => {
                self.database
                    .replace_fixed_interface(&interface, existing.updated_at)
                    .await?;
            }
            None => self.database.insert_fixed_interface(&interface).await?,
        }
        let stored = self.refresh_cache(interface.id).await?;

        info!(
            interface_id = %stored.id,
            tool_id = %stored.tool_id,
            name = %stored.name,
            version = %stored.version,
            overwritten = existing.is_some(),
            "Registered fixed interface"
        );
        Ok(stored)
    }

    /// Interface by id, from the cache or the store
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the id is unknown
    pub async fn get(&self, id: Uuid) -> AppResult<FixedInterface> {
        if let Some(interface) = self.cache.get(id) {
            return Ok(interface);
        }
        let interface = self
            .database
            .get_fixed_interface(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Interface {id} not found")))?;
        self.cache.insert(interface.clone());
        Ok(interface)
    }

    /// Interface by name, optionally restricted to one tool
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if nothing matches, or `InvalidInput` if the
    /// name exists for several tools and none was given
    pub async fn get_by_name(&self, name: &str, tool_id: Option<&str>) -> AppResult<FixedInterface> {
        if let Some(tool_id) = tool_id {
            return self
                .database
                .get_fixed_interface_by_name(tool_id, name)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("Interface '{name}' not found for tool '{tool_id}'"))
                });
        }

        let mut matches = self
            .database
            .list_fixed_interfaces(&InterfaceFilter {
                name: Some(name.to_owned()),
                ..InterfaceFilter::default()
            })
            .await?;
        match matches.len() {
            0 => Err(AppError::not_found(format!("Interface '{name}' not found"))),
            1 => Ok(matches.remove(0)),
            _ => {
                let tools: Vec<&str> = matches.iter().map(|i| i.tool_id.as_str()).collect();
                Err(AppError::invalid_input(format!(
                    "Interface name '{name}' exists for several tools ({}); specify the tool",
                    tools.join(", ")
                )))
            }
        }
    }

    /// Execute an interface with new parameters
    ///
    /// A performance sample is recorded for every outcome once the interface
    /// has been found.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` for an unknown id or tool
    /// - `InvalidInput` for a retired interface without `force`
    /// - `ValidationFailed` naming every violated parameter (no remote call is made)
    /// - `AuthRequired`/`AuthExpired` when no usable credential exists
    /// - `NetworkError`/`Timeout` once retries are exhausted
    /// - `UpstreamError` when the endpoint reports a failure
    pub async fn execute(
        &self,
        id: Uuid,
        params: Value,
        options: ExecuteOptions,
    ) -> AppResult<ExecutionResult> {
        let interface = self.get(id).await?;
        let started = Instant::now();
        let outcome = self.run_execution(&interface, params, options).await;
        let elapsed = started.elapsed();

        let (error, metadata) = match &outcome {
            Ok(call) => (
                None,
                json!({ "attempts": call.attempts, "auth_refreshed": call.auth_refreshed }),
            ),
            Err(e) => (Some(e), json!({ "error_code": e.code.as_str() })),
        };
        let metric = build_metric(
            Some(interface.id),
            &interface.tool_id,
            AccessType::Fixed,
            &interface.name,
            elapsed,
            error,
            Some(metadata),
        );

        let recorded = self.database.record_interface_execution(&metric).await;
        match (&recorded, &outcome) {
            (Ok(Some(updated)), _) => self.cache.insert(updated.clone()),
            (Ok(None), _) => self.cache.remove(interface.id),
            (Err(record_error), Err(_)) => warn!(
                interface_id = %interface.id,
                "Failed to record execution sample: {}",
                record_error
            ),
            (Err(_), Ok(_)) => {}
        }

        let call = match outcome {
            Ok(call) => call,
            Err(e) => {
                warn!(
                    interface_id = %interface.id,
                    tool_id = %interface.tool_id,
                    name = %interface.name,
                    error_code = %e.code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Fixed interface execution failed"
                );
                return Err(e);
            }
        };
        recorded?;

        info!(
            interface_id = %interface.id,
            tool_id = %interface.tool_id,
            name = %interface.name,
            attempts = call.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fixed interface executed"
        );

        Ok(ExecutionResult {
            interface_id: interface.id,
            tool_id: interface.tool_id.clone(),
            operation: interface.name.clone(),
            success: true,
            data: call.data,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            attempts: call.attempts,
            stale: self.is_stale(&interface),
            auth_refreshed: call.auth_refreshed,
            metric_id: metric.id,
        })
    }

    /// Execute an interface found by name
    ///
    /// # Errors
    ///
    /// See [`get_by_name`](Self::get_by_name) and [`execute`](Self::execute)
    pub async fn execute_by_name(
        &self,
        name: &str,
        tool_id: Option<&str>,
        params: Value,
        options: ExecuteOptions,
    ) -> AppResult<ExecutionResult> {
        let interface = self.get_by_name(name, tool_id).await?;
        self.execute(interface.id, params, options).await
    }

    async fn run_execution(
        &self,
        interface: &FixedInterface,
        params: Value,
        options: ExecuteOptions,
    ) -> AppResult<RemoteCall> {
        if !interface.is_active && !options.force {
            return Err(AppError::invalid_input(format!(
                "Interface '{}' is retired; reactivate it or execute with force",
                interface.name
            )));
        }

        SchemaValidator::compile(&interface.parameters_schema, "parameters")?.validate(&params)?;
        let envelope = json!({ "name": interface.name, "arguments": params });
        SchemaValidator::compile(&interface.operation_schema, "operation")?.validate(&envelope)?;

        let timeout = options.timeout.unwrap_or(self.settings.request_timeout);
        let policy = options
            .retry_attempts
            .map_or(self.settings.retry, |retries| {
                self.settings.retry.with_max_retries(retries)
            });
        let call = self
            .call_remote(&interface.tool_id, CALL_METHOD, &envelope, timeout, policy)
            .await?;

        if options.validate_response {
            SchemaValidator::compile(&interface.response_schema, "response")?.validate(&call.data)?;
        }
        Ok(call)
    }

    /// Call an operation without a fixed interface, discovering it first
    ///
    /// This is the slow path fixed interfaces avoid; it is recorded with
    /// access type `dynamic` for comparison.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), validated against the live schema
    pub async fn call_dynamic(
        &self,
        tool_id: &str,
        operation: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> AppResult<DynamicCallResult> {
        let started = Instant::now();
        let mut discovery_time = Duration::ZERO;
        let outcome = async {
            let discovery = self.discover(tool_id, operation, None).await?;
            discovery_time = discovery.elapsed;
            let remote = discovery.operation.ok_or_else(|| {
                AppError::not_found(format!(
                    "Tool '{tool_id}' does not advertise operation '{operation}'"
                ))
            })?;
            SchemaValidator::compile(&remote.input_schema, "parameters")?.validate(&params)?;
            let envelope = json!({ "name": operation, "arguments": params });
            self.call_remote(
                tool_id,
                CALL_METHOD,
                &envelope,
                timeout.unwrap_or(self.settings.request_timeout),
                self.settings.retry,
            )
            .await
        }
        .await;
        let elapsed = started.elapsed();

        let metric = self
            .tracker
            .record_dynamic_call(tool_id, operation, elapsed, outcome.as_ref().err())
            .await;
        let call = outcome?;
        let metric = metric?;

        Ok(DynamicCallResult {
            tool_id: tool_id.to_owned(),
            operation: operation.to_owned(),
            data: call.data,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            discovery_time_ms: u64::try_from(discovery_time.as_millis()).unwrap_or(u64::MAX),
            metric_id: metric.id,
        })
    }

    /// Compare the stored schemas with the live operation shape
    ///
    /// Breaking differences mark the interface invalid without retiring it.
    /// A compatible result updates `last_validated`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id or tool, or network and
    /// storage failures; the interface is unchanged in that case
    pub async fn validate(&self, id: Uuid) -> AppResult<ValidationResult> {
        let interface = self.get(id).await?;
        let discovery = self
            .discover(&interface.tool_id, &interface.name, Some(interface.id))
            .await?;

        let changes = discovery.operation.as_ref().map_or_else(
            || {
                vec![SchemaChange {
                    schema: "operation".to_owned(),
                    path: interface.name.clone(),
                    kind: ChangeKind::PropertyRemoved,
                    compatibility: Compatibility::Breaking,
                    detail: "operation is no longer advertised by the tool".to_owned(),
                }]
            },
            |operation| {
                let mut changes = diff_schemas(
                    "parameters",
                    &interface.parameters_schema,
                    &operation.input_schema,
                );
                if let Some(output_schema) = &operation.output_schema {
                    changes.extend(diff_schemas(
                        "response",
                        &interface.response_schema,
                        output_schema,
                    ));
                }
                changes
            },
        );
        let (breaking, compatible): (Vec<SchemaChange>, Vec<SchemaChange>) = changes
            .into_iter()
            .partition(|change| change.compatibility == Compatibility::Breaking);

        let now = Utc::now();
        let valid = breaking.is_empty();
        let status = if valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        };
        if !self
            .database
            .record_fixed_interface_validation(id, status, &breaking, valid.then_some(now), now)
            .await?
        {
            self.cache.remove(id);
            return Err(AppError::not_found(format!("Interface {id} not found")));
        }
        self.refresh_cache(id).await?;

        if valid {
            info!(
                interface_id = %id,
                compatible_changes = compatible.len(),
                "Interface validated against live endpoint"
            );
        } else {
            warn!(
                interface_id = %id,
                name = %interface.name,
                breaking_changes = breaking.len(),
                "Interface no longer matches live endpoint; re-registration needed"
            );
        }

        Ok(ValidationResult {
            interface_id: id,
            valid,
            status,
            breaking_changes: breaking,
            compatible_changes: compatible,
            validated_at: now,
            discovery_time_ms: u64::try_from(discovery.elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Validate every active interface that is due for re-validation
    ///
    /// # Errors
    ///
    /// Returns an error only if the interfaces cannot be listed
    pub async fn revalidate_stale(&self) -> AppResult<RevalidationReport> {
        let interfaces = self
            .database
            .list_fixed_interfaces(&InterfaceFilter {
                active: Some(true),
                ..InterfaceFilter::default()
            })
            .await?;

        let mut report = RevalidationReport::default();
        for interface in interfaces.into_iter().filter(|i| self.is_stale(i)) {
            match self.validate(interface.id).await {
                Ok(result) => report.validated.push(result),
                Err(e) => {
                    warn!(interface_id = %interface.id, "Re-validation failed: {}", e);
                    report.failed.push(RevalidationFailure {
                        interface_id: interface.id,
                        tool_id: interface.tool_id,
                        name: interface.name,
                        error: ErrorPayload::from(&e),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Interfaces matching the filter, with staleness and success rate
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list(&self, filter: &InterfaceFilter) -> AppResult<Vec<InterfaceSummary>> {
        let interfaces = self.database.list_fixed_interfaces(filter).await?;
        Ok(interfaces
            .into_iter()
            .map(|interface| self.summarize(interface))
            .collect())
    }

    /// Execution statistics of one interface over an optional window
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id or a query error
    pub async fn get_stats(&self, id: Uuid, window: Option<Duration>) -> AppResult<InterfaceStats> {
        let interface = self.get(id).await?;
        let mut stats = self.tracker.get_interface_stats(id, window).await?;
        stats.tool_id = Some(interface.tool_id.clone());
        stats.operation_name = Some(interface.name.clone());
        Ok(InterfaceStats {
            interface: self.summarize(interface),
            stats,
        })
    }

    /// Change descriptive fields, schemas, or version
    ///
    /// Changing a schema without an explicit version bumps the patch number
    /// and resets the validation status.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` for an unknown id
    /// - `ValidationFailed` for malformed schemas or a lower version
    /// - `Conflict` if the record changed concurrently
    pub async fn update(&self, id: Uuid, request: UpdateInterfaceRequest) -> AppResult<FixedInterface> {
        let current = self
            .database
            .get_fixed_interface(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Interface {id} not found")))?;

        let mut schemas = Vec::new();
        if let Some(schema) = &request.operation_schema {
            schemas.push(("operation_schema", schema));
        }
        if let Some(schema) = &request.parameters_schema {
            schemas.push(("parameters_schema", schema));
        }
        if let Some(schema) = &request.response_schema {
            schemas.push(("response_schema", schema));
        }
        check_schemas(&schemas)?;
        let schemas_changed = [
            (&request.operation_schema, &current.operation_schema),
            (&request.parameters_schema, &current.parameters_schema),
            (&request.response_schema, &current.response_schema),
        ]
        .iter()
        .any(|(new, old)| new.as_ref().is_some_and(|new| new != *old));

        let version = match request.version {
            Some(version) => next_version(Some(current.version), Some(version))?,
            None if schemas_changed => current.version.bump_patch(),
            None => current.version,
        };

        let mut updated = current.clone();
        if let Some(display_name) = request.display_name {
            updated.display_name = Some(display_name);
        }
        if let Some(description) = request.description {
            updated.description = Some(description);
        }
        if let Some(schema) = request.operation_schema {
            updated.operation_schema = schema;
        }
        if let Some(schema) = request.parameters_schema {
            updated.parameters_schema = schema;
        }
        if let Some(schema) = request.response_schema {
            updated.response_schema = schema;
        }
        if schemas_changed {
            updated.validation_status = ValidationStatus::Unknown;
            updated.validation_notes = Vec::new();
        }
        updated.version = version;
        updated.updated_at = Utc::now();

        self.database
            .replace_fixed_interface(&updated, current.updated_at)
            .await?;
        let stored = self.refresh_cache(id).await?;
        info!(interface_id = %id, version = %stored.version, "Updated fixed interface");
        Ok(stored)
    }

    /// Soft-retire an interface; it is kept with its history
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id
    pub async fn retire(&self, id: Uuid) -> AppResult<FixedInterface> {
        self.set_active(id, false).await
    }

    /// Make a retired interface executable again
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id
    pub async fn reactivate(&self, id: Uuid) -> AppResult<FixedInterface> {
        self.set_active(id, true).await
    }

    /// Delete an interface; its performance samples are kept without the link
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let deleted = self.database.delete_fixed_interface(id).await?;
        self.cache.remove(id);
        if !deleted {
            return Err(AppError::not_found(format!("Interface {id} not found")));
        }
        info!(interface_id = %id, "Deleted fixed interface");
        Ok(())
    }

    /// Remove every interface, OAuth configuration, and credential of a tool
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is removed then
    pub async fn purge_tool(&self, tool_id: &str) -> AppResult<PurgeSummary> {
        let summary = self.database.purge_tool(tool_id).await?;
        self.cache.remove_tool(tool_id);
        Ok(summary)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<FixedInterface> {
        if !self
            .database
            .set_fixed_interface_active(id, active, Utc::now())
            .await?
        {
            self.cache.remove(id);
            return Err(AppError::not_found(format!("Interface {id} not found")));
        }
        let stored = self.refresh_cache(id).await?;
        info!(interface_id = %id, active, "Changed interface activation");
        Ok(stored)
    }

    /// Query the live endpoint for `operation` and record the discovery sample
    async fn discover(
        &self,
        tool_id: &str,
        operation: &str,
        interface_id: Option<Uuid>,
    ) -> AppResult<Discovery> {
        let started = Instant::now();
        let outcome = async {
            let call = self
                .call_remote(
                    tool_id,
                    LIST_METHOD,
                    &json!({}),
                    self.settings.request_timeout,
                    self.settings.retry,
                )
                .await?;
            let operations = parse_tool_list(&call.data)?;
            Ok::<_, AppError>(operations.into_iter().find(|op| op.name == operation))
        }
        .await;
        let elapsed = started.elapsed();

        if let Err(e) = self
            .tracker
            .record_discovery(interface_id, tool_id, operation, elapsed, outcome.as_ref().err())
            .await
        {
            warn!(tool_id = %tool_id, "Failed to record discovery sample: {}", e);
        }

        Ok(Discovery {
            operation: outcome?,
            elapsed,
        })
    }

    /// Authenticated call with retries and one forced refresh on 401
    async fn call_remote(
        &self,
        tool_id: &str,
        method: &str,
        params: &Value,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> AppResult<RemoteCall> {
        let endpoint = self.tool_registry.resolve(tool_id).await?;
        let headers = self.auth.auth_headers(tool_id, false).await?;
        let mut auth_refreshed = headers.refreshed;

        let (mut response, mut attempts) = self
            .send(&endpoint.endpoint, method, params, &headers, timeout, policy)
            .await?;

        if response.status == 401 {
            let fresh = self.auth.auth_headers(tool_id, true).await?;
            if !fresh.refreshed && fresh.headers == headers.headers {
                return Err(AppError::auth_required(format!(
                    "Tool '{tool_id}' rejected the stored credentials (HTTP 401)"
                )));
            }
            debug!(tool_id = %tool_id, "Retrying after 401 with refreshed credentials");
            auth_refreshed = true;
            let (retry_response, retry_attempts) = self
                .send(&endpoint.endpoint, method, params, &fresh, timeout, policy)
                .await?;
            response = retry_response;
            attempts += retry_attempts;
            if response.status == 401 {
                return Err(AppError::auth_required(format!(
                    "Tool '{tool_id}' rejected refreshed credentials (HTTP 401)"
                )));
            }
        }

        Ok(RemoteCall {
            data: interpret_response(response)?,
            attempts,
            auth_refreshed,
        })
    }

    async fn send(
        &self,
        endpoint: &str,
        method: &str,
        params: &Value,
        headers: &AuthHeaders,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> AppResult<(ProtocolResponse, u32)> {
        let retried = with_retry(policy, method, move |_| async move {
            tokio::time::timeout(
                timeout,
                self.protocol
                    .call(endpoint, method, params.clone(), &headers.headers, timeout),
            )
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "Remote call '{method}' exceeded {} ms",
                    timeout.as_millis()
                ))
            })?
        })
        .await;
        retried.result.map(|response| (response, retried.attempts))
    }

    async fn refresh_cache(&self, id: Uuid) -> AppResult<FixedInterface> {
        let stored = self
            .database
            .get_fixed_interface(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Interface {id} not found")))?;
        self.cache.insert(stored.clone());
        Ok(stored)
    }

    fn is_stale(&self, interface: &FixedInterface) -> bool {
        chrono::Duration::from_std(self.settings.validation_interval)
            .is_ok_and(|interval| interface.is_stale(interval, Utc::now()))
    }

    fn summarize(&self, interface: FixedInterface) -> InterfaceSummary {
        InterfaceSummary {
            stale: self.is_stale(&interface),
            success_rate: interface.success_rate(),
            interface,
        }
    }
}

/// Version of a new or re-registered interface
fn next_version(
    existing: Option<SemanticVersion>,
    requested: Option<SemanticVersion>,
) -> AppResult<SemanticVersion> {
    match (existing, requested) {
        (None, requested) => Ok(requested.unwrap_or(SemanticVersion::INITIAL)),
        (Some(existing), None) => Ok(existing.bump_patch()),
        (Some(existing), Some(requested)) if requested < existing => Err(AppError::validation(
            format!("Version {requested} is lower than the current version {existing}"),
            vec![FieldViolation::new(
                "version",
                format!("must be at least {existing}"),
            )],
        )),
        (Some(_), Some(requested)) => Ok(requested),
    }
}

/// Check every schema, reporting all malformed ones together
fn check_schemas(schemas: &[(&str, &Value)]) -> AppResult<()> {
    let mut violations = Vec::new();
    for (label, schema) in schemas {
        if let Err(e) = ensure_well_formed(schema, label) {
            violations.extend(e.violations);
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation("Malformed interface schema", violations))
    }
}

/// Result payload of a protocol response, or the failure it reports
fn interpret_response(response: ProtocolResponse) -> AppResult<Value> {
    let status = response.status;
    if status >= 400 {
        let detail = response
            .body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("no detail")
            .to_owned();
        return Err(
            AppError::upstream(Some(status), format!("Remote endpoint returned HTTP {status}"))
                .with_cause(detail),
        );
    }

    let mut body = response.body;
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("remote error");
        return Err(AppError::upstream(
            None,
            format!("Remote endpoint reported an error: {message}"),
        ));
    }

    let data = match body.get_mut("result") {
        Some(result) => result.take(),
        None => body,
    };
    if data.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(AppError::upstream(
            None,
            "Remote operation reported a failure",
        ));
    }
    Ok(data)
}
