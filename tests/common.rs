// ABOUTME: Shared test utilities for toolpin integration tests
// ABOUTME: In-memory database, cheap cipher, and scripted protocol and token endpoint stubs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `toolpin`

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use toolpin::auth::CredentialResolver;
use toolpin::config::{OAuthSettings, RegistrySettings};
use toolpin::crypto::{CredentialCipher, KdfParams, MasterKey};
use toolpin::database::Database;
use toolpin::errors::AppResult;
use toolpin::external::{ProtocolClient, ProtocolResponse, StaticToolRegistry, ToolEndpoint};
use toolpin::interfaces::FixedInterfaceRegistry;
use toolpin::models::{OAuthConfiguration, OAuthToken};
use toolpin::oauth::{
    CreateOAuthConfigRequest, OAuthEngine, TokenEndpoint, TokenGrant, TokenRequest, TokenResponse,
};
use toolpin::retry::RetryPolicy;

static INIT_LOGGER: Once = Once::new();

pub const TOOL_ID: &str = "weather";
pub const TOOL_ENDPOINT: &str = "https://tools.example.com/rpc";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .with_test_writer()
            .try_init();
    });
}

/// Argon2 cost low enough for fast tests
pub const fn test_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new(MasterKey::generate().unwrap(), test_kdf()).unwrap()
}

pub async fn test_database() -> Database {
    init_test_logging();
    Database::new("sqlite::memory:", test_cipher())
        .await
        .expect("Failed to create test database")
}

pub const fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
}

pub const fn registry_settings() -> RegistrySettings {
    RegistrySettings {
        request_timeout: Duration::from_secs(2),
        retry: fast_retry(2),
        validation_interval: Duration::from_secs(24 * 3600),
    }
}

pub const fn oauth_settings() -> OAuthSettings {
    OAuthSettings {
        refresh_threshold: Duration::from_secs(300),
        manual_auth_timeout: Duration::from_secs(600),
        retry: fast_retry(1),
    }
}

/// One recorded remote call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub headers: Vec<(String, String)>,
}

/// Scripted protocol client
///
/// `tools/list` answers with the advertised operations; `tools/call` pops the
/// next scripted response or echoes the arguments.
#[derive(Default)]
pub struct MockProtocol {
    operations: Mutex<Vec<Value>>,
    scripted: Mutex<VecDeque<AppResult<ProtocolResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
}

impl MockProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertise(&self, operation: Value) {
        let mut operations = self.operations.lock().unwrap();
        let name = operation["name"].clone();
        operations.retain(|op| op["name"] != name);
        operations.push(operation);
    }

    pub fn withdraw(&self, name: &str) {
        self.operations
            .lock()
            .unwrap()
            .retain(|op| op["name"] != name);
    }

    pub fn script(&self, response: AppResult<ProtocolResponse>) {
        self.scripted.lock().unwrap().push_back(response);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }
}

pub fn ok_response(body: Value) -> AppResult<ProtocolResponse> {
    Ok(ProtocolResponse { status: 200, body })
}

pub fn status_response(status: u16) -> AppResult<ProtocolResponse> {
    Ok(ProtocolResponse {
        status,
        body: json!({ "error": { "message": format!("HTTP {status}") } }),
    })
}

#[async_trait]
impl ProtocolClient for MockProtocol {
    async fn call(
        &self,
        _endpoint: &str,
        method: &str,
        params: Value,
        headers: &[(String, String)],
        _timeout: Duration,
    ) -> AppResult<ProtocolResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_owned(),
            params: params.clone(),
            headers: headers.to_vec(),
        });
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if method == "tools/list" {
            let tools = self.operations.lock().unwrap().clone();
            return ok_response(json!({ "jsonrpc": "2.0", "id": 1, "result": { "tools": tools } }));
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            ok_response(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "echo": params["arguments"].clone() }
            }))
        })
    }
}

/// Recorded token request
#[derive(Debug, Clone)]
pub struct RecordedGrant {
    pub grant_type: String,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_secret: Option<String>,
}

/// Scripted token endpoint issuing numbered tokens
#[derive(Default)]
pub struct StubTokenEndpoint {
    scripted: Mutex<VecDeque<AppResult<TokenResponse>>>,
    grants: Mutex<Vec<RecordedGrant>>,
    issued: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl StubTokenEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, response: AppResult<TokenResponse>) {
        self.scripted.lock().unwrap().push_back(response);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn grants(&self) -> Vec<RecordedGrant> {
        self.grants.lock().unwrap().clone()
    }

    pub fn grant_count(&self, grant_type: &str) -> usize {
        self.grants
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.grant_type == grant_type)
            .count()
    }
}

pub fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_owned(),
        token_type: Some("Bearer".to_owned()),
        expires_in: Some(expires_in),
        refresh_token: refresh.map(str::to_owned),
        scope: None,
    }
}

#[async_trait]
impl TokenEndpoint for StubTokenEndpoint {
    async fn request_token(&self, request: &TokenRequest<'_>) -> AppResult<TokenResponse> {
        let recorded = match request.grant {
            TokenGrant::AuthorizationCode {
                code,
                code_verifier,
                ..
            } => RecordedGrant {
                grant_type: "authorization_code".to_owned(),
                code: Some(code.to_owned()),
                code_verifier: code_verifier.map(str::to_owned),
                refresh_token: None,
                client_secret: request.client_secret.map(str::to_owned),
            },
            TokenGrant::RefreshToken { refresh_token } => RecordedGrant {
                grant_type: "refresh_token".to_owned(),
                code: None,
                code_verifier: None,
                refresh_token: Some(refresh_token.to_owned()),
                client_secret: request.client_secret.map(str::to_owned),
            },
        };
        self.grants.lock().unwrap().push(recorded);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(token_response(
                &format!("access-{n}"),
                Some(&format!("refresh-{n}")),
                3600,
            ))
        })
    }
}

/// Fully wired components over an in-memory store
pub struct Harness {
    pub database: Database,
    pub protocol: Arc<MockProtocol>,
    pub tokens: Arc<StubTokenEndpoint>,
    pub tools: Arc<StaticToolRegistry>,
    pub oauth: Arc<OAuthEngine>,
    pub credentials: CredentialResolver,
    pub registry: FixedInterfaceRegistry,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(registry_settings(), oauth_settings()).await
    }

    pub async fn with_settings(registry: RegistrySettings, oauth: OAuthSettings) -> Self {
        let database = test_database().await;
        let protocol = Arc::new(MockProtocol::new());
        let tokens = Arc::new(StubTokenEndpoint::new());
        let tools = Arc::new(StaticToolRegistry::new());
        tools
            .insert(ToolEndpoint {
                id: TOOL_ID.to_owned(),
                endpoint: TOOL_ENDPOINT.to_owned(),
                capabilities: vec!["tools".to_owned()],
            })
            .unwrap();

        let engine = Arc::new(OAuthEngine::new(database.clone(), tokens.clone(), oauth));
        let credentials = CredentialResolver::new(database.clone(), Arc::clone(&engine));
        let registry = FixedInterfaceRegistry::new(
            database.clone(),
            tools.clone(),
            protocol.clone(),
            Arc::new(credentials.clone()),
            registry,
        );

        Self {
            database,
            protocol,
            tokens,
            tools,
            oauth: engine,
            credentials,
            registry,
        }
    }

    pub async fn configure_oauth(&self, provider: &str) -> OAuthConfiguration {
        self.oauth
            .create_configuration(oauth_request(TOOL_ID, provider))
            .await
            .unwrap()
    }

    /// Store a token directly, bypassing the browser flow
    pub async fn store_token(
        &self,
        config: &OAuthConfiguration,
        access: &str,
        refresh: Option<&str>,
        expires_in: chrono::Duration,
    ) {
        let now = Utc::now();
        self.database
            .upsert_oauth_token(&OAuthToken {
                id: Uuid::new_v4(),
                tool_id: config.tool_id.clone(),
                config_id: config.id,
                access_token: access.to_owned(),
                refresh_token: refresh.map(str::to_owned),
                token_type: "Bearer".to_owned(),
                expires_at: Some(now + expires_in),
                scopes: Some("read".to_owned()),
                created_at: now,
                last_refreshed: None,
            })
            .await
            .unwrap();
    }
}

pub fn oauth_request(tool_id: &str, provider: &str) -> CreateOAuthConfigRequest {
    CreateOAuthConfigRequest {
        tool_id: tool_id.to_owned(),
        provider: provider.to_owned(),
        client_id: "client-123".to_owned(),
        client_secret: Some("s3cret".to_owned()),
        auth_url: "https://auth.example.com/authorize".to_owned(),
        token_url: "https://auth.example.com/token".to_owned(),
        scopes: vec!["read".to_owned(), "write".to_owned()],
        redirect_uri: "http://localhost:8765/callback".to_owned(),
        pkce_enabled: true,
    }
}

/// `forecast` operation as advertised by the live endpoint
pub fn forecast_operation() -> Value {
    json!({
        "name": "forecast",
        "description": "Weather forecast for a city",
        "inputSchema": {
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "days": { "type": "integer", "minimum": 1, "maximum": 14 }
            },
            "required": ["city"]
        }
    })
}

pub fn forecast_parameters() -> Value {
    forecast_operation()["inputSchema"].clone()
}

/// Query parameter of an authorization URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
