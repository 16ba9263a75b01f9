// ABOUTME: Core library for toolpin shared types
// ABOUTME: Canonical DTOs for interfaces, OAuth state, metrics, and the error taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

#![deny(unsafe_code)]

//! # toolpin-core
//!
//! Data transfer objects and the unified error type shared between the
//! `toolpin` library, its command surface, and tests. Nothing in this crate
//! performs I/O.

/// Unified error handling with typed error codes
pub mod errors;

/// Canonical data models
pub mod models;
