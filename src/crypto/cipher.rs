// ABOUTME: Credential cipher encrypting payloads under a key derived from the master key
// ABOUTME: base64(version | salt | nonce | AES-256-GCM ciphertext+tag) with optional AAD binding
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # Credential Cipher
//!
//! Every call draws a fresh salt and nonce. The per-call key is derived from
//! the master key with Argon2id over that salt, so encrypting the same
//! plaintext twice never produces the same ciphertext and a leaked database
//! alone is useless without the master key.
//!
//! Callers that store a ciphertext in a specific row pass an AAD context
//! (for example `tool_id|config_id|oauth_tokens.access_token`); decryption
//! with any other context fails authentication, so ciphertexts cannot be
//! swapped between rows.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use super::MasterKey;
use crate::constants::crypto::{
    CIPHER_VERSION, KDF_ITERATIONS, KDF_MEMORY_KIB, KDF_PARALLELISM, KEY_LEN, NONCE_LEN, SALT_LEN,
    TAG_LEN,
};
use crate::errors::{AppError, AppResult};

const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: KDF_MEMORY_KIB,
            iterations: KDF_ITERATIONS,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Check the parameters are accepted by Argon2
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when Argon2 rejects the cost settings
    pub fn validate(&self) -> AppResult<()> {
        self.to_params().map(|_| ())
    }

    fn to_params(self) -> AppResult<Params> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| AppError::config(format!("Invalid Argon2 parameters: {e}")))
    }
}

/// Encrypts and decrypts credential payloads under the master key
pub struct CredentialCipher {
    master_key: MasterKey,
    kdf: Argon2<'static>,
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Create a cipher for `master_key`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the KDF parameters are invalid
    pub fn new(master_key: MasterKey, params: KdfParams) -> AppResult<Self> {
        let kdf = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_params()?);
        Ok(Self {
            master_key,
            kdf,
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a string without context binding
    ///
    /// # Errors
    ///
    /// Returns an error if random generation, key derivation, or sealing fails
    pub fn encrypt_data(&self, data: &str) -> AppResult<String> {
        self.seal(data.as_bytes(), b"")
    }

    /// Decrypt a string produced by [`Self::encrypt_data`]
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed, was produced under a
    /// different key, or has been tampered with
    pub fn decrypt_data(&self, encrypted_data: &str) -> AppResult<String> {
        self.open_to_string(encrypted_data, b"")
    }

    /// Encrypt a string bound to `aad_context`
    ///
    /// # Errors
    ///
    /// Returns an error if random generation, key derivation, or sealing fails
    pub fn encrypt_data_with_aad(&self, data: &str, aad_context: &str) -> AppResult<String> {
        self.seal(data.as_bytes(), aad_context.as_bytes())
    }

    /// Decrypt a string produced by [`Self::encrypt_data_with_aad`] with the same context
    ///
    /// # Errors
    ///
    /// Returns an error if the ciphertext is malformed, the key differs, or the
    /// AAD context does not match
    pub fn decrypt_data_with_aad(&self, encrypted_data: &str, aad_context: &str) -> AppResult<String> {
        self.open_to_string(encrypted_data, aad_context.as_bytes())
    }

    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> AppResult<String> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|e| AppError::internal(format!("Failed to generate salt: {e}")))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|e| AppError::internal(format!("Failed to generate nonce: {e}")))?;

        let key = self.derive_key(&salt)?;
        let mut buffer = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::from(aad),
            &mut buffer,
        )
        .map_err(|e| AppError::internal(format!("Failed to encrypt data: {e}")))?;

        let mut combined = Vec::with_capacity(HEADER_LEN + buffer.len());
        combined.push(CIPHER_VERSION);
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&buffer);
        Ok(STANDARD.encode(combined))
    }

    fn open_to_string(&self, encrypted_data: &str, aad: &[u8]) -> AppResult<String> {
        let plaintext = self.open(encrypted_data, aad)?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| AppError::internal("Decrypted credential is not valid UTF-8"))
    }

    fn open(&self, encrypted_data: &str, aad: &[u8]) -> AppResult<Zeroizing<Vec<u8>>> {
        let combined = STANDARD
            .decode(encrypted_data)
            .map_err(|e| AppError::internal("Failed to decode encrypted credential").with_cause(e))?;

        if combined.len() < HEADER_LEN + TAG_LEN {
            return Err(AppError::internal("Invalid encrypted data: too short"));
        }
        let (header, ciphertext) = combined.split_at(HEADER_LEN);
        let (version, rest) = header.split_at(1);
        if version.first() != Some(&CIPHER_VERSION) {
            return Err(AppError::internal(format!(
                "Unsupported credential cipher version {version:?}"
            )));
        }
        let (salt, nonce_slice) = rest.split_at(SALT_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_slice)
            .map_err(|e| AppError::internal(format!("Invalid nonce: {e}")))?;

        let key = self.derive_key(salt)?;
        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        let plaintext_len = key
            .open_in_place(nonce, Aad::from(aad), buffer.as_mut_slice())
            .map_err(|_| {
                AppError::internal(
                    "Failed to decrypt credential: wrong master key, context, or tampered data",
                )
            })?
            .len();
        buffer.truncate(plaintext_len);
        Ok(buffer)
    }

    fn derive_key(&self, salt: &[u8]) -> AppResult<LessSafeKey> {
        let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
        self.kdf
            .hash_password_into(self.master_key.as_bytes(), salt, &mut key_bytes[..])
            .map_err(|e| AppError::internal(format!("Key derivation failed: {e}")))?;
        let unbound_key = UnboundKey::new(&AES_256_GCM, &key_bytes[..])
            .map_err(|e| AppError::internal(format!("Failed to create encryption key: {e}")))?;
        Ok(LessSafeKey::new(unbound_key))
    }
}
