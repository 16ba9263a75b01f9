// ABOUTME: JSON Schema handling for fixed interfaces
// ABOUTME: Validation with full violation lists, stored-versus-live diffing, and schema synthesis
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Classify differences between a stored and a live schema
pub mod diff;
/// Build interface schemas from a live operation description
pub mod synthesize;
/// Compile schemas and validate values against them
pub mod validator;

pub use diff::diff_schemas;
pub use synthesize::{operation_envelope_schema, SynthesizedSchemas};
pub use validator::{ensure_well_formed, SchemaValidator};
