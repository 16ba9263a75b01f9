// ABOUTME: Collaborator seams for resolving tools and calling remote endpoints
// ABOUTME: ToolRegistry and ProtocolClient traits with file-backed and HTTP implementations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// JSON-RPC over HTTP protocol client and response interpretation
pub mod protocol_client;
/// Tool registry backed by a JSON file
pub mod tool_registry;

pub use protocol_client::{parse_tool_list, HttpProtocolClient, RemoteOperation};
pub use tool_registry::StaticToolRegistry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppResult;

/// Where a tool lives and what it can do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEndpoint {
    /// Tool identifier
    pub id: String,
    /// Endpoint URL the protocol client posts to
    pub endpoint: String,
    /// Advertised capabilities (informational)
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Raw answer of a remote endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed body, `Value::Null` when empty or not JSON
    pub body: Value,
}

/// Resolves tool ids to endpoints
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Endpoint and capabilities of `tool_id`
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if the tool is unknown
    async fn resolve(&self, tool_id: &str) -> AppResult<ToolEndpoint>;
}

/// Performs remote calls
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Invoke `method` with `params` on `endpoint` within `timeout`
    ///
    /// Any HTTP status is returned as a response; only transport failures
    /// are errors.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` or `Timeout` when no response is received
    async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> AppResult<ProtocolResponse>;
}
