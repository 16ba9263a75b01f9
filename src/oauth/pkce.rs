// ABOUTME: PKCE verifier/challenge pairs and CSRF state values
// ABOUTME: S256 challenges over base64url verifiers drawn from the system RNG
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::constants::oauth::{PKCE_VERIFIER_BYTES, STATE_BYTES};
use crate::errors::{AppError, AppResult};

/// A PKCE verifier and its S256 challenge
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// High-entropy secret kept locally until the code exchange
    pub verifier: String,
    /// `base64url(SHA-256(verifier))`, sent with the authorization request
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails
    pub fn generate() -> AppResult<Self> {
        let verifier = random_urlsafe(PKCE_VERIFIER_BYTES)?;
        let challenge = s256_challenge(&verifier);
        Ok(Self {
            verifier,
            challenge,
        })
    }
}

impl fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// S256 challenge of `verifier`
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Fresh single-use state value
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_state() -> AppResult<String> {
    random_urlsafe(STATE_BYTES)
}

fn random_urlsafe(len: usize) -> AppResult<String> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|e| AppError::internal(format!("Failed to generate random bytes: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
