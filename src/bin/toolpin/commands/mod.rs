// ABOUTME: Subcommand implementations for the toolpin CLI
// ABOUTME: Shared argument parsers used by several subcommands
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

pub mod auth;
pub mod daemon;
pub mod interfaces;
pub mod stats;

use std::fs;

use serde_json::Value;

/// Parse a JSON argument given inline or as `@path`
pub fn parse_json(raw: &str) -> Result<Value, String> {
    let text = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?,
        None => raw.to_owned(),
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))
}
