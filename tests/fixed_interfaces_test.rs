// ABOUTME: Integration tests for fixed interface registration, execution, and drift detection
// ABOUTME: Uses a scripted protocol client to count remote calls and simulate failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::time::Duration;

use serde_json::json;

use common::{
    forecast_operation, forecast_parameters, ok_response, registry_settings, status_response,
    Harness, TOOL_ENDPOINT, TOOL_ID,
};
use toolpin::auth::AuthMethod;
use toolpin::database::InterfaceFilter;
use toolpin::errors::{AppError, ErrorCode};
use toolpin::external::ToolEndpoint;
use toolpin::interfaces::{
    ExecuteOptions, RegisterInterfaceRequest, RegisterOptions, UpdateInterfaceRequest,
};
use toolpin::models::{
    AccessType, ChangeKind, Compatibility, FixedInterface, SemanticVersion, ValidationStatus,
};
use toolpin::telemetry::StatsQuery;

fn forecast_request() -> RegisterInterfaceRequest {
    RegisterInterfaceRequest {
        tool_id: TOOL_ID.to_owned(),
        name: "forecast".to_owned(),
        parameters_schema: Some(forecast_parameters()),
        ..RegisterInterfaceRequest::default()
    }
}

async fn register_forecast(harness: &Harness) -> FixedInterface {
    harness
        .registry
        .register(forecast_request(), RegisterOptions::default())
        .await
        .unwrap()
}

fn force() -> RegisterOptions {
    RegisterOptions {
        force: true,
        ..RegisterOptions::default()
    }
}

#[tokio::test]
async fn test_execute_goes_straight_to_the_remote_call() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;

    let result = harness
        .registry
        .execute(
            interface.id,
            json!({ "city": "Lyon", "days": 3 }),
            ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data["echo"]["city"], "Lyon");
    assert_eq!(result.attempts, 1);
    assert!(!result.stale);
    assert_eq!(harness.protocol.call_count("tools/list"), 0);
    assert_eq!(harness.protocol.call_count("tools/call"), 1);

    let call = &harness.protocol.calls()[0];
    assert_eq!(
        call.params,
        json!({ "name": "forecast", "arguments": { "city": "Lyon", "days": 3 } })
    );

    let stored = harness.registry.get(interface.id).await.unwrap();
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.success_count, 1);
    assert!(stored.performance_score > 0.0);
}

#[tokio::test]
async fn test_invalid_parameters_name_every_field_and_make_no_call() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;

    let error = harness
        .registry
        .execute(interface.id, json!({ "days": 30 }), ExecuteOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ValidationFailed);
    let fields = error.violated_fields();
    assert!(fields.contains(&"city"), "violations: {fields:?}");
    assert!(fields.contains(&"days"), "violations: {fields:?}");
    assert!(harness.protocol.calls().is_empty());

    let stored = harness.registry.get(interface.id).await.unwrap();
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.success_count, 0);

    let stats = harness
        .registry
        .get_stats(interface.id, None)
        .await
        .unwrap();
    assert_eq!(stats.stats.total_calls, 1);
    assert_eq!(stats.stats.error_breakdown.get("validation_failed"), Some(&1));
}

#[tokio::test]
async fn test_auto_discover_synthesizes_schemas_and_records_discovery() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());

    let interface = harness
        .registry
        .register(
            RegisterInterfaceRequest {
                tool_id: TOOL_ID.to_owned(),
                name: "forecast".to_owned(),
                ..RegisterInterfaceRequest::default()
            },
            RegisterOptions {
                auto_discover: true,
                ..RegisterOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(interface.parameters_schema, forecast_parameters());
    assert_eq!(
        interface.description.as_deref(),
        Some("Weather forecast for a city")
    );
    assert_eq!(interface.validation_status, ValidationStatus::Valid);
    assert!(interface.last_validated.is_some());
    assert_eq!(interface.version, SemanticVersion::INITIAL);

    let discovery = harness
        .registry
        .tracker()
        .get_stats(&StatsQuery {
            tool_id: Some(TOOL_ID.to_owned()),
            access_type: Some(AccessType::Discovery),
            ..StatsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(discovery.total_calls, 1);
}

#[tokio::test]
async fn test_validate_tool_rejects_unadvertised_operation() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());

    let error = harness
        .registry
        .register(
            RegisterInterfaceRequest {
                tool_id: TOOL_ID.to_owned(),
                name: "history".to_owned(),
                ..RegisterInterfaceRequest::default()
            },
            RegisterOptions {
                validate_tool: true,
                ..RegisterOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ResourceNotFound);
    assert!(harness
        .registry
        .list(&InterfaceFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_concurrent_registrations_leave_one_winner() {
    let harness = Harness::new().await;

    let (first, second) = tokio::join!(
        harness
            .registry
            .register(forecast_request(), RegisterOptions::default()),
        harness
            .registry
            .register(forecast_request(), RegisterOptions::default()),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.code, ErrorCode::Conflict);

    let listed = harness
        .registry
        .list(&InterfaceFilter {
            tool_id: Some(TOOL_ID.to_owned()),
            ..InterfaceFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_duplicate_name_conflicts_and_force_keeps_identity() {
    let harness = Harness::new().await;
    let original = register_forecast(&harness).await;
    harness
        .registry
        .execute(original.id, json!({ "city": "Nice" }), ExecuteOptions::default())
        .await
        .unwrap();

    let error = harness
        .registry
        .register(forecast_request(), RegisterOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::Conflict);

    let mut request = forecast_request();
    request.description = Some("Forecast v2".to_owned());
    let replaced = harness.registry.register(request, force()).await.unwrap();

    assert_eq!(replaced.id, original.id);
    assert_eq!(replaced.created_at, original.created_at);
    assert_eq!(replaced.version, SemanticVersion::new(1, 0, 1));
    assert_eq!(replaced.execution_count, 1);
    assert_eq!(replaced.description.as_deref(), Some("Forecast v2"));

    let listed = harness
        .registry
        .list(&InterfaceFilter {
            tool_id: Some(TOOL_ID.to_owned()),
            ..InterfaceFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_lower_explicit_version_is_rejected() {
    let harness = Harness::new().await;
    let mut request = forecast_request();
    request.version = Some(SemanticVersion::new(2, 0, 0));
    harness
        .registry
        .register(request, RegisterOptions::default())
        .await
        .unwrap();

    let mut downgrade = forecast_request();
    downgrade.version = Some(SemanticVersion::new(1, 5, 0));
    let error = harness
        .registry
        .register(downgrade, force())
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ValidationFailed);
    assert_eq!(error.violated_fields(), vec!["version"]);
}

#[tokio::test]
async fn test_malformed_schema_is_rejected() {
    let harness = Harness::new().await;
    let mut request = forecast_request();
    request.parameters_schema = Some(json!("not a schema"));
    request.response_schema = Some(json!(42));

    let error = harness
        .registry
        .register(request, RegisterOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::ValidationFailed);
    let fields = error.violated_fields();
    assert!(fields.contains(&"parameters_schema"));
    assert!(fields.contains(&"response_schema"));
}

#[tokio::test]
async fn test_dry_run_does_not_persist() {
    let harness = Harness::new().await;
    let preview = harness
        .registry
        .register(
            forecast_request(),
            RegisterOptions {
                dry_run: true,
                ..RegisterOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(preview.name, "forecast");
    let error = harness.registry.get(preview.id).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn test_default_operation_schema_validates_the_call_envelope() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;

    assert_eq!(interface.operation_schema["properties"]["name"]["const"], "forecast");
    assert_eq!(
        interface.operation_schema["required"],
        json!(["name", "arguments"])
    );
}

#[tokio::test]
async fn test_retired_interface_needs_force() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    let retired = harness.registry.retire(interface.id).await.unwrap();
    assert!(!retired.is_active);

    let error = harness
        .registry
        .execute(interface.id, json!({ "city": "Lille" }), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);
    assert!(harness.protocol.calls().is_empty());

    harness
        .registry
        .execute(
            interface.id,
            json!({ "city": "Lille" }),
            ExecuteOptions {
                force: true,
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap();

    let reactivated = harness.registry.reactivate(interface.id).await.unwrap();
    assert!(reactivated.is_active);
}

#[tokio::test]
async fn test_name_lookup_requires_tool_when_ambiguous() {
    let harness = Harness::new().await;
    harness
        .tools
        .insert(ToolEndpoint {
            id: "news".to_owned(),
            endpoint: TOOL_ENDPOINT.to_owned(),
            capabilities: Vec::new(),
        })
        .unwrap();
    for tool in [TOOL_ID, "news"] {
        harness
            .registry
            .register(
                RegisterInterfaceRequest {
                    tool_id: tool.to_owned(),
                    name: "search".to_owned(),
                    ..RegisterInterfaceRequest::default()
                },
                RegisterOptions::default(),
            )
            .await
            .unwrap();
    }

    let error = harness
        .registry
        .get_by_name("search", None)
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidInput);

    let result = harness
        .registry
        .execute_by_name("search", Some("news"), json!({ "q": "rust" }), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.tool_id, "news");
    assert_eq!(result.data["echo"]["q"], "rust");
}

#[tokio::test]
async fn test_validate_flags_new_required_parameter_as_breaking() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;

    let mut changed = forecast_operation();
    changed["inputSchema"]["required"] = json!(["city", "days"]);
    harness.protocol.advertise(changed);

    let result = harness.registry.validate(interface.id).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.status, ValidationStatus::Invalid);
    assert_eq!(result.breaking_changes.len(), 1);
    assert_eq!(result.breaking_changes[0].path, "days");
    assert_eq!(result.breaking_changes[0].kind, ChangeKind::BecameRequired);

    let stored = harness.registry.get(interface.id).await.unwrap();
    assert_eq!(stored.validation_status, ValidationStatus::Invalid);
    assert!(stored.is_active);
    assert!(stored.last_validated.is_none());
}

#[tokio::test]
async fn test_validate_accepts_new_optional_parameter() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;

    let mut changed = forecast_operation();
    changed["inputSchema"]["properties"]["units"] = json!({ "type": "string" });
    harness.protocol.advertise(changed);

    let result = harness.registry.validate(interface.id).await.unwrap();
    assert!(result.valid);
    assert!(result.breaking_changes.is_empty());
    assert_eq!(result.compatible_changes.len(), 1);
    assert_eq!(result.compatible_changes[0].compatibility, Compatibility::Compatible);

    let stored = harness.registry.get(interface.id).await.unwrap();
    assert_eq!(stored.validation_status, ValidationStatus::Valid);
    assert!(stored.last_validated.is_some());
}

#[tokio::test]
async fn test_validate_reports_withdrawn_operation() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;
    harness.protocol.withdraw("forecast");

    let result = harness.registry.validate(interface.id).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.breaking_changes[0].schema, "operation");
}

#[tokio::test]
async fn test_revalidate_stale_covers_never_validated_interfaces() {
    let mut settings = registry_settings();
    settings.validation_interval = Duration::ZERO;
    let harness = Harness::with_settings(settings, common::oauth_settings()).await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let listed = harness
        .registry
        .list(&InterfaceFilter::default())
        .await
        .unwrap();
    assert!(listed[0].stale);

    let report = harness.registry.revalidate_stale().await.unwrap();
    assert_eq!(report.validated.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(report.validated[0].interface_id, interface.id);
}

#[tokio::test]
async fn test_network_failures_are_retried() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    harness.protocol.script(Err(AppError::network("connection reset")));
    harness.protocol.script(Err(AppError::network("connection reset")));

    let result = harness
        .registry
        .execute(interface.id, json!({ "city": "Metz" }), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(harness.protocol.call_count("tools/call"), 3);
}

#[tokio::test]
async fn test_exhausted_retries_surface_network_error_and_record_failure() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    for _ in 0..2 {
        harness.protocol.script(Err(AppError::network("unreachable")));
    }

    let error = harness
        .registry
        .execute(
            interface.id,
            json!({ "city": "Metz" }),
            ExecuteOptions {
                retry_attempts: Some(1),
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::NetworkError);
    assert_eq!(harness.protocol.call_count("tools/call"), 2);
    let stats = harness.registry.get_stats(interface.id, None).await.unwrap();
    assert_eq!(stats.stats.error_breakdown.get("network_error"), Some(&1));
}

#[tokio::test]
async fn test_upstream_failures_are_not_retried() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    harness.protocol.script(status_response(502));

    let error = harness
        .registry
        .execute(interface.id, json!({ "city": "Pau" }), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::UpstreamError);
    assert_eq!(error.upstream_status, Some(502));
    assert_eq!(harness.protocol.call_count("tools/call"), 1);

    harness.protocol.script(ok_response(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "isError": true, "content": [] }
    })));
    let error = harness
        .registry
        .execute(interface.id, json!({ "city": "Pau" }), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::UpstreamError);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    harness.protocol.set_delay(Duration::from_millis(300));

    let error = harness
        .registry
        .execute(
            interface.id,
            json!({ "city": "Caen" }),
            ExecuteOptions {
                timeout: Some(Duration::from_millis(20)),
                retry_attempts: Some(0),
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::Timeout);
}

#[tokio::test]
async fn test_response_validation_is_optional() {
    let harness = Harness::new().await;
    let mut request = forecast_request();
    request.response_schema = Some(json!({
        "type": "object",
        "required": ["temperature"]
    }));
    let interface = harness
        .registry
        .register(request, RegisterOptions::default())
        .await
        .unwrap();

    harness
        .registry
        .execute(interface.id, json!({ "city": "Brest" }), ExecuteOptions::default())
        .await
        .unwrap();

    let error = harness
        .registry
        .execute(
            interface.id,
            json!({ "city": "Brest" }),
            ExecuteOptions {
                validate_response: true,
                ..ExecuteOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);
    assert_eq!(error.violated_fields(), vec!["temperature"]);
}

#[tokio::test]
async fn test_unauthorized_call_refreshes_token_once() {
    let harness = Harness::new().await;
    let config = harness.configure_oauth("weather-oauth").await;
    harness
        .store_token(&config, "stale-access", Some("refresh-0"), chrono::Duration::hours(1))
        .await;
    let interface = register_forecast(&harness).await;
    harness.protocol.script(status_response(401));

    let result = harness
        .registry
        .execute(interface.id, json!({ "city": "Dijon" }), ExecuteOptions::default())
        .await
        .unwrap();

    assert!(result.auth_refreshed);
    assert_eq!(harness.tokens.grant_count("refresh_token"), 1);
    let calls = harness.protocol.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].headers,
        vec![("authorization".to_owned(), "Bearer stale-access".to_owned())]
    );
    assert_eq!(
        calls[1].headers,
        vec![("authorization".to_owned(), "Bearer access-1".to_owned())]
    );
}

#[tokio::test]
async fn test_unauthorized_static_credential_requires_auth() {
    let harness = Harness::new().await;
    harness
        .credentials
        .store_credential(
            TOOL_ID,
            &AuthMethod::Bearer {
                token: "revoked".to_owned(),
            },
        )
        .await
        .unwrap();
    let interface = register_forecast(&harness).await;
    harness.protocol.script(status_response(401));

    let error = harness
        .registry
        .execute(interface.id, json!({ "city": "Tours" }), ExecuteOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::AuthRequired);
    assert_eq!(harness.protocol.call_count("tools/call"), 1);
}

#[tokio::test]
async fn test_missing_oauth_token_requests_manual_intervention() {
    let harness = Harness::new().await;
    harness.configure_oauth("weather-oauth").await;
    let interface = register_forecast(&harness).await;

    let error = harness
        .registry
        .execute(interface.id, json!({ "city": "Reims" }), ExecuteOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.code, ErrorCode::AuthRequired);
    let intervention = error.manual_intervention.expect("login instructions");
    assert!(intervention.required);
    assert!(!intervention.instructions.is_empty());
    assert!(harness.protocol.calls().is_empty());
}

#[tokio::test]
async fn test_update_bumps_patch_and_resets_validation() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    let interface = register_forecast(&harness).await;
    harness.registry.validate(interface.id).await.unwrap();

    let mut parameters = forecast_parameters();
    parameters["properties"]["units"] = json!({ "type": "string" });
    let updated = harness
        .registry
        .update(
            interface.id,
            UpdateInterfaceRequest {
                parameters_schema: Some(parameters.clone()),
                ..UpdateInterfaceRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.version, SemanticVersion::new(1, 0, 1));
    assert_eq!(updated.parameters_schema, parameters);
    assert_eq!(updated.validation_status, ValidationStatus::Unknown);

    let error = harness
        .registry
        .update(
            interface.id,
            UpdateInterfaceRequest {
                version: Some(SemanticVersion::new(0, 9, 0)),
                ..UpdateInterfaceRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_metrics_survive_interface_deletion() {
    let harness = Harness::new().await;
    let interface = register_forecast(&harness).await;
    harness
        .registry
        .execute(interface.id, json!({ "city": "Albi" }), ExecuteOptions::default())
        .await
        .unwrap();

    harness.registry.delete(interface.id).await.unwrap();
    assert_eq!(
        harness.registry.get(interface.id).await.unwrap_err().code,
        ErrorCode::ResourceNotFound
    );
    assert_eq!(
        harness.registry.delete(interface.id).await.unwrap_err().code,
        ErrorCode::ResourceNotFound
    );

    let stats = harness
        .registry
        .tracker()
        .get_stats(&StatsQuery {
            tool_id: Some(TOOL_ID.to_owned()),
            access_type: Some(AccessType::Fixed),
            ..StatsQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(stats.total_calls, 1);
}

#[tokio::test]
async fn test_purge_tool_removes_everything_of_the_tool() {
    let harness = Harness::new().await;
    harness.configure_oauth("weather-oauth").await;
    let interface = register_forecast(&harness).await;

    let summary = harness.registry.purge_tool(TOOL_ID).await.unwrap();
    assert_eq!(summary.interfaces, 1);
    assert_eq!(summary.oauth_configurations, 1);
    assert_eq!(
        harness.registry.get(interface.id).await.unwrap_err().code,
        ErrorCode::ResourceNotFound
    );
}

#[tokio::test]
async fn test_dynamic_calls_are_tracked_for_comparison() {
    let harness = Harness::new().await;
    harness.protocol.advertise(forecast_operation());
    harness.protocol.set_delay(Duration::from_millis(15));
    let interface = register_forecast(&harness).await;

    harness
        .registry
        .execute(interface.id, json!({ "city": "Agen" }), ExecuteOptions::default())
        .await
        .unwrap();
    let dynamic = harness
        .registry
        .call_dynamic(TOOL_ID, "forecast", json!({ "city": "Agen" }), None)
        .await
        .unwrap();
    assert_eq!(dynamic.data["echo"]["city"], "Agen");
    assert!(dynamic.discovery_time_ms >= 15);

    let error = harness
        .registry
        .call_dynamic(TOOL_ID, "forecast", json!({}), None)
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ValidationFailed);

    let comparison = harness
        .registry
        .tracker()
        .compare_access_types(TOOL_ID, None)
        .await
        .unwrap();
    assert_eq!(comparison.fixed.total_calls, 1);
    assert_eq!(comparison.dynamic.total_calls, 2);
    assert_eq!(comparison.discovery.total_calls, 2);
    assert!(comparison.speedup.is_some());
}
