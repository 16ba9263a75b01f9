// ABOUTME: Master key generation and file storage wrapped by a machine-local secret
// ABOUTME: Owner-only permissions on the key file and its directory, env override support
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::constants::crypto::{KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::errors::{AppError, AppResult};

const WRAP_VERSION: u8 = 1;
const WRAP_AAD: &[u8] = b"toolpin:master-key:v1";

/// The 32-byte secret every credential key is derived from
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Generate a fresh random key
    ///
    /// # Errors
    ///
    /// Returns an error if the system random source fails
    pub fn generate() -> AppResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        SystemRandom::new()
            .fill(&mut bytes[..])
            .map_err(|e| AppError::internal(format!("Failed to generate master key: {e}")))?;
        Ok(Self(bytes))
    }

    /// Wrap existing key material
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` unless exactly 32 bytes are given
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(AppError::invalid_input(format!(
                "Master key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Decode a base64 key, as given in `TOOLPIN_MASTER_KEY`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the value is not base64 of 32 bytes
    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| AppError::config("TOOLPIN_MASTER_KEY is not valid base64"))?,
        );
        Self::from_bytes(&decoded)
            .map_err(|_| AppError::config(format!("TOOLPIN_MASTER_KEY must decode to {KEY_LEN} bytes")))
    }

    /// Base64 form of the key
    #[must_use]
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.0[..]))
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// File-backed master key storage
///
/// The key file holds `base64(version | nonce | AES-256-GCM(master key))`
/// where the wrapping key is a SHA-256 digest of host, user, and platform
/// identifiers. The wrapping secret never leaves the machine; copying the key
/// file to another host or account makes it unreadable.
pub struct MasterKeyStore {
    path: PathBuf,
    machine_secret: Zeroizing<[u8; KEY_LEN]>,
}

impl MasterKeyStore {
    /// Store at `path` wrapped with this machine's secret
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            machine_secret: machine_secret(),
        }
    }

    /// Store at `path` wrapped with an explicit secret
    #[must_use]
    pub fn with_machine_secret(path: impl Into<PathBuf>, secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        let mut machine_secret = Zeroizing::new([0u8; KEY_LEN]);
        machine_secret.copy_from_slice(&digest);
        Self {
            path: path.into(),
            machine_secret,
        }
    }

    /// Location of the key file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Use `override_b64` when given, otherwise load or create the key file
    ///
    /// # Errors
    ///
    /// Returns an error if the override is malformed or the key file cannot
    /// be read, unwrapped, or written
    pub fn resolve(&self, override_b64: Option<&str>) -> AppResult<MasterKey> {
        if let Some(encoded) = override_b64 {
            debug!("Using master key from TOOLPIN_MASTER_KEY");
            return MasterKey::from_base64(encoded);
        }
        self.load_or_create()
    }

    /// Load the key file, generating and writing a new key on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be read, unwrapped, or written
    pub fn load_or_create(&self) -> AppResult<MasterKey> {
        if self.path.exists() {
            return self.load();
        }

        let key = MasterKey::generate()?;
        match self.write_new(&key) {
            Ok(()) => {
                info!(path = %self.path.display(), "Generated new master key");
                Ok(key)
            }
            // Another process created the file first; use its key.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.load(),
            Err(e) => Err(AppError::config(format!(
                "Failed to write master key file {}",
                self.path.display()
            ))
            .with_cause(e)),
        }
    }

    /// Load and unwrap an existing key file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, malformed, or was wrapped
    /// on a different machine
    pub fn load(&self) -> AppResult<MasterKey> {
        let encoded = fs::read_to_string(&self.path).map_err(|e| {
            AppError::config(format!(
                "Failed to read master key file {}",
                self.path.display()
            ))
            .with_cause(e)
        })?;
        self.unwrap_key(encoded.trim())
    }

    fn unwrap_key(&self, encoded: &str) -> AppResult<MasterKey> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|_| AppError::config("Master key file is not valid base64"))?;
        if combined.len() != 1 + NONCE_LEN + KEY_LEN + TAG_LEN
            || combined.first() != Some(&WRAP_VERSION)
        {
            return Err(AppError::config("Master key file has an unrecognized format"));
        }
        let (nonce_slice, ciphertext) = combined[1..].split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_slice)
            .map_err(|e| AppError::config(format!("Invalid master key nonce: {e}")))?;

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        let plaintext = self
            .wrapping_key()?
            .open_in_place(nonce, Aad::from(WRAP_AAD), buffer.as_mut_slice())
            .map_err(|_| {
                AppError::config(
                    "Master key file cannot be unwrapped on this machine or has been modified",
                )
            })?;
        MasterKey::from_bytes(plaintext)
    }

    fn write_new(&self, key: &MasterKey) -> std::io::Result<()> {
        let wrapped = self
            .wrap_key(key)
            .map_err(|e| std::io::Error::other(e.message))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(wrapped.as_bytes())?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn wrap_key(&self, key: &MasterKey) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|e| AppError::internal(format!("Failed to generate nonce: {e}")))?;

        let mut buffer = key.as_bytes().to_vec();
        self.wrapping_key()?
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(WRAP_AAD),
                &mut buffer,
            )
            .map_err(|e| AppError::internal(format!("Failed to wrap master key: {e}")))?;

        let mut combined = Vec::with_capacity(1 + NONCE_LEN + buffer.len());
        combined.push(WRAP_VERSION);
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&buffer);
        Ok(STANDARD.encode(combined))
    }

    fn wrapping_key(&self) -> AppResult<LessSafeKey> {
        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.machine_secret[..])
            .map_err(|e| AppError::internal(format!("Failed to create wrapping key: {e}")))?;
        Ok(LessSafeKey::new(unbound_key))
    }
}

/// SHA-256 over identifiers of this host and account
fn machine_secret() -> Zeroizing<[u8; KEY_LEN]> {
    let hostname = fs::read_to_string("/etc/hostname")
        .ok()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_default();
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let home = dirs::home_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(b"toolpin:machine-secret:v1\0");
    for part in [
        hostname.trim(),
        user.as_str(),
        home.as_str(),
        std::env::consts::OS,
        std::env::consts::ARCH,
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }

    let mut secret = Zeroizing::new([0u8; KEY_LEN]);
    secret.copy_from_slice(&hasher.finalize());
    secret
}
