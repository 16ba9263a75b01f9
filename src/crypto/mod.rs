// ABOUTME: Credential encryption primitives
// ABOUTME: Argon2id-derived AES-256-GCM cipher and the machine-wrapped master key store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Authenticated encryption of credential payloads
pub mod cipher;
/// Master key generation, wrapping, and storage
pub mod master_key;

pub use cipher::{CredentialCipher, KdfParams};
pub use master_key::{MasterKey, MasterKeyStore};
