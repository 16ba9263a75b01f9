// ABOUTME: JSON-RPC 2.0 over HTTP client for remote tool endpoints
// ABOUTME: Posts tools/call and tools/list requests and parses advertised operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{ProtocolClient, ProtocolResponse};
use crate::constants::protocol::JSONRPC_VERSION;
use crate::errors::{AppError, AppResult};

/// One operation advertised by a `tools/list` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOperation {
    /// Operation name
    pub name: String,
    /// Description, if advertised
    #[serde(default)]
    pub description: Option<String>,
    /// Parameters schema
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
    /// Response schema, if advertised
    #[serde(rename = "outputSchema", default)]
    pub output_schema: Option<Value>,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object" })
}

/// Extract the advertised operations from a `tools/list` body
///
/// Accepts both a full JSON-RPC envelope (`{"result": {"tools": [...]}}`) and
/// a bare result (`{"tools": [...]}`).
///
/// # Errors
///
/// Returns `UpstreamError` if the body has no `tools` array or an entry is malformed
pub fn parse_tool_list(body: &Value) -> AppResult<Vec<RemoteOperation>> {
    let result = body.get("result").unwrap_or(body);
    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::upstream(None, "Capability listing has no tools array"))?;

    tools
        .iter()
        .map(|tool| {
            serde_json::from_value(tool.clone()).map_err(|e| {
                AppError::upstream(None, format!("Malformed operation in capability listing: {e}"))
            })
        })
        .collect()
}

/// Protocol client posting JSON-RPC 2.0 requests with `reqwest`
#[derive(Debug, Clone, Default)]
pub struct HttpProtocolClient {
    http_client: Client,
}

impl HttpProtocolClient {
    /// Create a client with a fresh connection pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    /// Create a client around an existing `reqwest` client
    #[must_use]
    pub const fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ProtocolClient for HttpProtocolClient {
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> AppResult<ProtocolResponse> {
        let request_id = Uuid::new_v4().to_string();
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": request_id,
            "method": method,
            "params": params,
        });

        let mut request = self
            .http_client
            .post(endpoint)
            .timeout(timeout)
            .json(&payload);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(method, request_id = %request_id, "Sending protocol request");
        let response = request.send().await.map_err(|e| transport_error(method, e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(method, e))?;

        // Error pages are frequently not JSON; keep them as a string body
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ProtocolResponse { status, body })
    }
}

fn transport_error(method: &str, error: reqwest::Error) -> AppError {
    let timed_out = error.is_timeout();
    let error = error.without_url();
    if timed_out {
        AppError::timeout(format!("Remote call '{method}' timed out")).with_cause(error)
    } else {
        AppError::network(format!("Remote call '{method}' failed")).with_cause(error)
    }
}
