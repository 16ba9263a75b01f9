// ABOUTME: Concurrent map of interface records keyed by id
// ABOUTME: Written only after the corresponding store write has committed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::FixedInterface;

/// Read cache for fixed interfaces
#[derive(Debug, Default)]
pub struct InterfaceCache {
    entries: DashMap<Uuid, FixedInterface>,
}

impl InterfaceCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record, if present
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<FixedInterface> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Replace the entry for the record's id
    pub fn insert(&self, interface: FixedInterface) {
        self.entries.insert(interface.id, interface);
    }

    /// Drop one entry
    pub fn remove(&self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Drop every entry of a tool
    pub fn remove_tool(&self, tool_id: &str) {
        self.entries.retain(|_, interface| interface.tool_id != tool_id);
    }

    /// Number of cached records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
