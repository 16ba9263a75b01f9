// ABOUTME: Tests for error codes, payloads, and the structured operation response
// ABOUTME: Verifies retryability, serialization, and manual intervention propagation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use serde_json::json;

use toolpin::errors::{AppError, AppResult, ErrorCode, FieldViolation, OperationResponse};
use toolpin::models::ManualIntervention;

fn intervention() -> ManualIntervention {
    ManualIntervention {
        required: true,
        reason: "No OAuth token is stored".to_owned(),
        authorization_url: None,
        state: None,
        expires_at: None,
        instructions: vec!["Run `toolpin auth weather --login`".to_owned()],
    }
}

#[test]
fn test_only_transport_failures_are_retryable() {
    assert!(AppError::network("reset").is_retryable());
    assert!(AppError::timeout("slow").is_retryable());
    for error in [
        AppError::upstream(Some(500), "boom"),
        AppError::auth_expired("dead"),
        AppError::validation("bad", Vec::new()),
        AppError::database("locked"),
    ] {
        assert!(!error.is_retryable(), "{} must not be retried", error.code);
    }
}

#[test]
fn test_error_codes_serialize_as_snake_case() {
    assert_eq!(
        serde_json::to_value(ErrorCode::ResourceNotFound).unwrap(),
        json!("not_found")
    );
    assert_eq!(
        serde_json::to_value(ErrorCode::ValidationFailed).unwrap(),
        json!(ErrorCode::ValidationFailed.as_str())
    );
    assert_eq!(ErrorCode::AuthRequired.to_string(), "auth_required");
}

#[test]
fn test_cause_is_kept_out_of_the_message() {
    let error = AppError::network("Tool endpoint unreachable").with_cause("dns failure for 10.0.0.3");
    assert_eq!(error.to_string(), "Tool endpoint unreachable");
    assert_eq!(error.internal_cause(), Some("dns failure for 10.0.0.3"));

    let payload = serde_json::to_value(OperationResponse::<()>::failure(&error)).unwrap();
    assert!(!payload.to_string().contains("10.0.0.3"));
}

#[test]
fn test_failure_response_lists_every_violation() {
    let error = AppError::validation(
        "parameters failed validation",
        vec![
            FieldViolation::new("city", "is required"),
            FieldViolation::new("days", "30 is greater than the maximum of 14"),
        ],
    );
    assert_eq!(error.violated_fields(), vec!["city", "days"]);

    let response: OperationResponse<()> = Err(error).into();
    assert!(!response.success);
    assert!(response.data.is_none());
    let payload = response.error.unwrap();
    assert_eq!(payload.code, ErrorCode::ValidationFailed);
    assert_eq!(payload.violations.len(), 2);
    assert!(!payload.retryable);
}

#[test]
fn test_success_response_omits_error_fields() {
    let result: AppResult<u32> = Ok(7);
    let response = OperationResponse::from(result);
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value, json!({ "success": true, "data": 7 }));
}

#[test]
fn test_manual_intervention_travels_with_either_outcome() {
    let error = AppError::auth_required("Tool 'weather' is not authorized")
        .with_manual_intervention(intervention());
    let response = OperationResponse::<()>::failure(&error);
    assert!(response.manual_intervention.is_some());
    assert_eq!(response.error.unwrap().code, ErrorCode::AuthRequired);

    let response = OperationResponse::ok("pending").with_manual_intervention(Some(intervention()));
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["manual_intervention"]["required"], true);
}
