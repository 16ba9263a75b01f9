// ABOUTME: Semantic version numbers for fixed interfaces
// ABOUTME: MAJOR.MINOR.PATCH parsing, ordering, and patch bumping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// `MAJOR.MINOR.PATCH` version, ordered numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    /// Incompatible changes
    pub major: u32,
    /// Backwards-compatible additions
    pub minor: u32,
    /// Fixes
    pub patch: u32,
}

impl SemanticVersion {
    /// Version assigned to newly registered interfaces
    pub const INITIAL: Self = Self::new(1, 0, 0);

    /// Create a version from its components
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next patch release
    #[must_use]
    pub const fn bump_patch(self) -> Self {
        Self::new(self.major, self.minor, self.patch.saturating_add(1))
    }
}

impl Default for SemanticVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() != 3 {
            return Err(AppError::invalid_input(format!(
                "Invalid version '{s}': expected MAJOR.MINOR.PATCH"
            )));
        }
        let parse = |part: &str| {
            part.parse::<u32>().map_err(|_| {
                AppError::invalid_input(format!(
                    "Invalid version '{s}': '{part}' is not a non-negative integer"
                ))
            })
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SemanticVersion> for String {
    fn from(version: SemanticVersion) -> Self {
        version.to_string()
    }
}
