// ABOUTME: Tests for static credentials and the header resolution that feeds remote calls
// ABOUTME: Covers credential validation, encrypted storage, and the OAuth fallback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{Harness, TOOL_ID};
use toolpin::auth::{AuthHeaderProvider, AuthMethod};
use toolpin::errors::ErrorCode;

#[test]
fn test_headers_per_credential_kind() {
    let api_key = AuthMethod::ApiKey {
        header: "X-API-Key".to_owned(),
        key: "k-123".to_owned(),
    };
    assert_eq!(
        api_key.header(),
        Some(("X-API-Key".to_owned(), "k-123".to_owned()))
    );

    let bearer = AuthMethod::Bearer {
        token: "t-456".to_owned(),
    };
    assert_eq!(
        bearer.header(),
        Some(("authorization".to_owned(), "Bearer t-456".to_owned()))
    );

    let basic = AuthMethod::Basic {
        username: "alice".to_owned(),
        password: "wonderland".to_owned(),
    };
    assert_eq!(
        basic.header(),
        Some((
            "authorization".to_owned(),
            "Basic YWxpY2U6d29uZGVybGFuZA==".to_owned()
        ))
    );

    let oauth = AuthMethod::OAuth {
        provider: "github".to_owned(),
    };
    assert!(oauth.header().is_none());
    assert_eq!(oauth.kind(), "oauth");
}

#[test]
fn test_credentials_are_validated() {
    let cases = [
        AuthMethod::ApiKey {
            header: "X-API-Key".to_owned(),
            key: "  ".to_owned(),
        },
        AuthMethod::ApiKey {
            header: "not a header".to_owned(),
            key: "k".to_owned(),
        },
        AuthMethod::Bearer {
            token: String::new(),
        },
        AuthMethod::Basic {
            username: "alice".to_owned(),
            password: String::new(),
        },
        AuthMethod::OAuth {
            provider: String::new(),
        },
    ];
    for method in cases {
        assert_eq!(
            method.validate().unwrap_err().code,
            ErrorCode::InvalidInput,
            "{method:?}"
        );
    }
}

#[test]
fn test_debug_output_redacts_secrets() {
    let rendered = format!(
        "{:?} {:?}",
        AuthMethod::Bearer {
            token: "t-secret".to_owned()
        },
        AuthMethod::Basic {
            username: "alice".to_owned(),
            password: "p-secret".to_owned()
        }
    );
    assert!(!rendered.contains("t-secret"));
    assert!(!rendered.contains("p-secret"));
    assert!(rendered.contains("alice"));
}

#[test]
fn test_credentials_serialize_with_a_kind_tag() {
    let value = serde_json::to_value(AuthMethod::ApiKey {
        header: "X-Key".to_owned(),
        key: "k".to_owned(),
    })
    .unwrap();
    assert_eq!(value["kind"], "api_key");

    let parsed: AuthMethod =
        serde_json::from_str(r#"{"kind":"oauth","provider":"github"}"#).unwrap();
    assert_eq!(
        parsed,
        AuthMethod::OAuth {
            provider: "github".to_owned()
        }
    );
}

#[tokio::test]
async fn test_stored_credential_is_encrypted_and_replaceable() {
    let harness = Harness::new().await;
    let first = AuthMethod::Bearer {
        token: "first-token".to_owned(),
    };
    harness
        .credentials
        .store_credential(TOOL_ID, &first)
        .await
        .unwrap();

    let stored = harness
        .database
        .get_tool_credential(TOOL_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.kind, "bearer");
    assert_eq!(
        harness.credentials.get_credential(TOOL_ID).await.unwrap(),
        Some(first)
    );

    let second = AuthMethod::ApiKey {
        header: "X-API-Key".to_owned(),
        key: "second-key".to_owned(),
    };
    harness
        .credentials
        .store_credential(TOOL_ID, &second)
        .await
        .unwrap();
    let headers = harness.credentials.auth_headers(TOOL_ID, false).await.unwrap();
    assert_eq!(
        headers.headers,
        vec![("X-API-Key".to_owned(), "second-key".to_owned())]
    );
    assert!(!headers.refreshed);

    assert!(harness.credentials.remove_credential(TOOL_ID).await.unwrap());
    assert!(!harness.credentials.remove_credential(TOOL_ID).await.unwrap());
    assert!(harness
        .credentials
        .auth_headers(TOOL_ID, false)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_oauth_credential_needs_a_configuration() {
    let harness = Harness::new().await;
    let method = AuthMethod::OAuth {
        provider: "weather-oauth".to_owned(),
    };

    let error = harness
        .credentials
        .store_credential(TOOL_ID, &method)
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::ResourceNotFound);

    let config = harness.configure_oauth("weather-oauth").await;
    harness
        .credentials
        .store_credential(TOOL_ID, &method)
        .await
        .unwrap();
    harness
        .store_token(&config, "oauth-access", None, chrono::Duration::hours(1))
        .await;

    let headers = harness.credentials.auth_headers(TOOL_ID, false).await.unwrap();
    assert_eq!(headers.headers[0].1, "Bearer oauth-access");
}

#[tokio::test]
async fn test_tool_without_credentials_calls_unauthenticated() {
    let harness = Harness::new().await;
    let headers = harness.credentials.auth_headers("public", false).await.unwrap();
    assert!(headers.is_empty());
}
