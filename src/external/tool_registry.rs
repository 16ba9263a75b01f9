// ABOUTME: In-memory tool registry loaded from a JSON tools file
// ABOUTME: Maps tool ids to endpoint URLs; unknown ids resolve to ResourceNotFound
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use url::Url;

use super::{ToolEndpoint, ToolRegistry};
use crate::errors::{AppError, AppResult};

/// Tool registry held in memory
///
/// The tools file is a JSON array of `{"id", "endpoint", "capabilities"}`.
#[derive(Debug, Default)]
pub struct StaticToolRegistry {
    tools: DashMap<String, ToolEndpoint>,
}

impl StaticToolRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a tools file; a missing file yields an empty registry
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or an
    /// entry has an invalid endpoint
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let registry = Self::new();
        if !path.exists() {
            debug!(path = %path.display(), "No tools file, starting with an empty registry");
            return Ok(registry);
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read tools file {}: {e}", path.display()))
        })?;
        let tools: Vec<ToolEndpoint> = serde_json::from_str(&raw).map_err(|e| {
            AppError::config(format!("Invalid tools file {}: {e}", path.display()))
        })?;
        for tool in tools {
            registry.insert(tool)?;
        }
        Ok(registry)
    }

    /// Add or replace a tool
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the id is empty or the endpoint is not an
    /// absolute http(s) URL
    pub fn insert(&self, tool: ToolEndpoint) -> AppResult<()> {
        if tool.id.trim().is_empty() {
            return Err(AppError::invalid_input("Tool id cannot be empty"));
        }
        let url = Url::parse(&tool.endpoint).map_err(|e| {
            AppError::invalid_input(format!("Invalid endpoint for tool '{}': {e}", tool.id))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::invalid_input(format!(
                "Endpoint for tool '{}' must be http or https",
                tool.id
            )));
        }
        self.tools.insert(tool.id.clone(), tool);
        Ok(())
    }

    /// Snapshot of every registered tool, keyed by id
    #[must_use]
    pub fn tools(&self) -> HashMap<String, ToolEndpoint> {
        self.tools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn resolve(&self, tool_id: &str) -> AppResult<ToolEndpoint> {
        self.tools
            .get(tool_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Unknown tool '{tool_id}'")))
    }
}
