// ABOUTME: Compares a stored schema with the live one and classifies every difference
// ABOUTME: Removed or retyped required fields and new requirements are breaking; additions are compatible
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Schema Diff
//!
//! Walks `properties` recursively (and `items` of array properties) in both
//! documents. Classification:
//!
//! | Change                                   | Compatibility |
//! |------------------------------------------|---------------|
//! | top-level `type` changed                 | breaking      |
//! | property `type` changed                  | breaking      |
//! | required property removed                | breaking      |
//! | property newly required                  | breaking      |
//! | optional property removed                | compatible    |
//! | optional property added                  | compatible    |
//! | required property became optional        | compatible    |
//!
//! Descriptions, formats, and other annotations are ignored.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::models::{ChangeKind, Compatibility, SchemaChange};

/// Differences between `stored` and `live`; `schema` names the document
#[must_use]
pub fn diff_schemas(schema: &str, stored: &Value, live: &Value) -> Vec<SchemaChange> {
    let mut changes = Vec::new();
    let recorder = Recorder { schema };

    if let (Some(stored_type), Some(live_type)) = (declared_type(stored), declared_type(live)) {
        if stored_type != live_type {
            changes.push(recorder.change(
                "",
                ChangeKind::TypeChanged,
                Compatibility::Breaking,
                format!(
                    "top-level type changed from {} to {}",
                    stored_type.join("|"),
                    live_type.join("|")
                ),
            ));
            return changes;
        }
    }

    recorder.walk("", stored, live, &mut changes);
    changes
}

struct Recorder<'a> {
    schema: &'a str,
}

impl Recorder<'_> {
    fn change(
        &self,
        path: &str,
        kind: ChangeKind,
        compatibility: Compatibility,
        detail: String,
    ) -> SchemaChange {
        SchemaChange {
            schema: self.schema.to_owned(),
            path: path.to_owned(),
            kind,
            compatibility,
            detail,
        }
    }

    fn walk(&self, prefix: &str, stored: &Value, live: &Value, changes: &mut Vec<SchemaChange>) {
        let empty = Map::new();
        let stored_props = properties(stored).unwrap_or(&empty);
        let live_props = properties(live).unwrap_or(&empty);
        let stored_required = required(stored);
        let live_required = required(live);

        for (name, stored_prop) in stored_props {
            let path = join(prefix, name);
            let was_required = stored_required.contains(name.as_str());
            let is_required = live_required.contains(name.as_str());

            let Some(live_prop) = live_props.get(name) else {
                let compatibility = if was_required {
                    Compatibility::Breaking
                } else {
                    Compatibility::Compatible
                };
                let detail = if was_required {
                    "required property removed"
                } else {
                    "optional property removed"
                };
                changes.push(self.change(
                    &path,
                    ChangeKind::PropertyRemoved,
                    compatibility,
                    detail.to_owned(),
                ));
                continue;
            };

            let stored_type = declared_type(stored_prop);
            let live_type = declared_type(live_prop);
            if let (Some(from), Some(to)) = (&stored_type, &live_type) {
                if from != to {
                    changes.push(self.change(
                        &path,
                        ChangeKind::TypeChanged,
                        Compatibility::Breaking,
                        format!("type changed from {} to {}", from.join("|"), to.join("|")),
                    ));
                    continue;
                }
            }

            match (was_required, is_required) {
                (true, false) => changes.push(self.change(
                    &path,
                    ChangeKind::BecameOptional,
                    Compatibility::Compatible,
                    "required property became optional".to_owned(),
                )),
                (false, true) => changes.push(self.change(
                    &path,
                    ChangeKind::BecameRequired,
                    Compatibility::Breaking,
                    "optional property became required".to_owned(),
                )),
                _ => {}
            }

            self.walk(&path, stored_prop, live_prop, changes);
            if let (Some(stored_items), Some(live_items)) =
                (stored_prop.get("items"), live_prop.get("items"))
            {
                self.walk(&format!("{path}[]"), stored_items, live_items, changes);
            }
        }

        for (name, _) in live_props.iter().filter(|(name, _)| !stored_props.contains_key(*name)) {
            let path = join(prefix, name);
            if live_required.contains(name.as_str()) {
                changes.push(self.change(
                    &path,
                    ChangeKind::PropertyAdded,
                    Compatibility::Breaking,
                    "new required property".to_owned(),
                ));
            } else {
                changes.push(self.change(
                    &path,
                    ChangeKind::PropertyAdded,
                    Compatibility::Compatible,
                    "new optional property".to_owned(),
                ));
            }
        }

        // Names required live without a property declaration on either side
        for name in live_required.iter().filter(|name| {
            !stored_required.contains(**name)
                && !stored_props.contains_key(**name)
                && !live_props.contains_key(**name)
        }) {
            changes.push(self.change(
                &join(prefix, name),
                ChangeKind::BecameRequired,
                Compatibility::Breaking,
                "undeclared property became required".to_owned(),
            ));
        }
    }
}

fn properties(schema: &Value) -> Option<&Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

fn required(schema: &Value) -> BTreeSet<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// `type` as a sorted list so `["null","string"]` equals `["string","null"]`
fn declared_type(schema: &Value) -> Option<Vec<String>> {
    match schema.get("type")? {
        Value::String(single) => Some(vec![single.clone()]),
        Value::Array(many) => {
            let mut types: Vec<String> = many
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect();
            types.sort();
            types.dedup();
            Some(types)
        }
        _ => None,
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}
