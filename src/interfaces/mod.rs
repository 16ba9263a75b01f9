// ABOUTME: Fixed interface registry: register, execute, validate, and retire captured operations
// ABOUTME: Store-backed records with a synchronous in-memory read cache
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// In-memory read cache of interface records
pub mod cache;
/// Registry operations
pub mod registry;
/// Request, option, and report types
pub mod types;

pub use cache::InterfaceCache;
pub use registry::FixedInterfaceRegistry;
pub use types::{
    DynamicCallResult, ExecuteOptions, InterfaceStats, InterfaceSummary, RegisterInterfaceRequest,
    RegisterOptions, RevalidationFailure, RevalidationReport, UpdateInterfaceRequest,
};
