// ABOUTME: JSON Schema compilation and validation collecting every violation
// ABOUTME: Violations are reported per field so callers can name each failing parameter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde_json::Value;

use crate::errors::{AppError, AppResult, FieldViolation};

/// Check that `schema` is a usable JSON Schema document
///
/// # Errors
///
/// Returns `ValidationFailed` naming `label` if the document is not an object
/// or boolean schema, or does not compile
pub fn ensure_well_formed(schema: &Value, label: &str) -> AppResult<()> {
    SchemaValidator::compile(schema, label).map(|_| ())
}

/// A compiled schema
pub struct SchemaValidator {
    label: String,
    validator: Validator,
}

impl SchemaValidator {
    /// Compile `schema`; `label` names the document in error messages
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the schema is malformed
    pub fn compile(schema: &Value, label: &str) -> AppResult<Self> {
        if !(schema.is_object() || schema.is_boolean()) {
            return Err(AppError::validation(
                format!("Invalid {label} schema"),
                vec![FieldViolation::new(
                    label,
                    "schema must be a JSON object or boolean",
                )],
            ));
        }
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            AppError::validation(
                format!("Invalid {label} schema"),
                vec![FieldViolation::new(label, e.to_string())],
            )
        })?;
        Ok(Self {
            label: label.to_owned(),
            validator,
        })
    }

    /// Whether `instance` satisfies the schema
    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Every violated constraint, in schema evaluation order
    #[must_use]
    pub fn violations(&self, instance: &Value) -> Vec<FieldViolation> {
        self.validator
            .iter_errors(instance)
            .flat_map(|error| violations_from(&error))
            .collect()
    }

    /// Validate `instance`, failing with the complete violation list
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` listing every violation
    pub fn validate(&self, instance: &Value) -> AppResult<()> {
        let violations = self.violations(instance);
        if violations.is_empty() {
            return Ok(());
        }
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        Err(AppError::validation(
            format!(
                "{} failed validation on {} constraint(s): {}",
                self.label,
                violations.len(),
                fields.join(", ")
            ),
            violations,
        ))
    }
}

fn violations_from(error: &ValidationError<'_>) -> Vec<FieldViolation> {
    let path = error.instance_path.to_string();
    let base = path.trim_start_matches('/');
    let join = |name: &str| {
        if base.is_empty() {
            name.to_owned()
        } else {
            format!("{base}/{name}")
        }
    };

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map_or_else(|| property.to_string(), ToOwned::to_owned);
            vec![FieldViolation::new(join(&name), "is required")]
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|name| FieldViolation::new(join(name), "is not an allowed property"))
            .collect(),
        _ => vec![FieldViolation::new(base, error.to_string())],
    }
}
