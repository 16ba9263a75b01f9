// ABOUTME: Builds interface schemas from an operation advertised by the live endpoint
// ABOUTME: The operation schema validates the tools/call envelope for exactly one operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use serde_json::{json, Value};

use crate::external::RemoteOperation;

/// Schema of the `{"name", "arguments"}` envelope sent to select `name`
#[must_use]
pub fn operation_envelope_schema(name: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "const": name },
            "arguments": { "type": "object" }
        },
        "required": ["name", "arguments"],
        "additionalProperties": false
    })
}

/// Schemas derived from a live capability query
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedSchemas {
    /// Envelope schema for the operation
    pub operation_schema: Value,
    /// Parameters schema as advertised
    pub parameters_schema: Value,
    /// Response schema as advertised, `{}` (accept anything) when absent
    pub response_schema: Value,
    /// Advertised description
    pub description: Option<String>,
}

impl SynthesizedSchemas {
    /// Derive the three interface schemas from `operation`
    #[must_use]
    pub fn from_operation(operation: &RemoteOperation) -> Self {
        Self {
            operation_schema: operation_envelope_schema(&operation.name),
            parameters_schema: operation.input_schema.clone(),
            response_schema: operation
                .output_schema
                .clone()
                .unwrap_or_else(|| json!({})),
            description: operation.description.clone(),
        }
    }
}
