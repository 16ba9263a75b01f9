// ABOUTME: Environment-only configuration loaded from TOOLPIN_* variables
// ABOUTME: Typed parsing with defaults and ConfigError reporting for malformed values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{crypto, paths, retry, timeouts};
use crate::crypto::KdfParams;
use crate::errors::{AppError, AppResult};
use crate::logging::LogFormat;
use crate::retry::RetryPolicy;

/// Settings consumed by the OAuth flow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthSettings {
    /// Tokens expiring within this window are refreshed before use
    pub refresh_threshold: Duration,
    /// Lifetime of a pending authorization flow
    pub manual_auth_timeout: Duration,
    /// Retry policy for token endpoint calls
    pub retry: RetryPolicy,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(timeouts::REFRESH_THRESHOLD_SECS),
            manual_auth_timeout: Duration::from_secs(timeouts::MANUAL_AUTH_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Settings consumed by the fixed interface registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Deadline applied when an execution does not specify one
    pub request_timeout: Duration,
    /// Retry policy applied when an execution does not specify one
    pub retry: RetryPolicy,
    /// Interfaces not validated within this window are stale
    pub validation_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(timeouts::REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            validation_interval: Duration::from_secs(timeouts::VALIDATION_INTERVAL_HOURS * 3600),
        }
    }
}

/// Complete process configuration
#[derive(Clone)]
pub struct ToolpinConfig {
    /// sqlx connection URL
    pub database_url: String,
    /// Directory holding the database, key file, and tools file
    pub data_dir: PathBuf,
    /// Wrapped master key location
    pub master_key_path: PathBuf,
    /// Base64 master key overriding the key file
    pub master_key_override: Option<String>,
    /// Tool registry JSON file
    pub tools_file: PathBuf,
    /// Deadline for one remote call
    pub request_timeout: Duration,
    /// Retry policy for retryable failures
    pub retry: RetryPolicy,
    /// Refresh threshold for OAuth tokens
    pub refresh_threshold: Duration,
    /// Lifetime of pending authorization flows
    pub manual_auth_timeout: Duration,
    /// Staleness window for fixed interfaces
    pub validation_interval: Duration,
    /// Period of the background refresh scan
    pub refresh_interval: Duration,
    /// Argon2id cost for the credential cipher
    pub kdf: KdfParams,
    /// Log output format
    pub log_format: LogFormat,
}

impl fmt::Debug for ToolpinConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolpinConfig")
            .field("database_url", &self.database_url)
            .field("data_dir", &self.data_dir)
            .field("master_key_path", &self.master_key_path)
            .field(
                "master_key_override",
                &self.master_key_override.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tools_file", &self.tools_file)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("refresh_threshold", &self.refresh_threshold)
            .field("manual_auth_timeout", &self.manual_auth_timeout)
            .field("validation_interval", &self.validation_interval)
            .field("refresh_interval", &self.refresh_interval)
            .field("kdf", &self.kdf)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ToolpinConfig {
    /// Load configuration from `TOOLPIN_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the variable when a value cannot be parsed,
    /// or when no data directory can be determined.
    pub fn from_env() -> AppResult<Self> {
        let data_dir = match env_string("TOOLPIN_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let database_url = env_string("TOOLPIN_DATABASE_URL").unwrap_or_else(|| {
            format!(
                "sqlite:{}",
                data_dir.join(paths::DATABASE_FILE).display()
            )
        });

        let master_key_path = env_string("TOOLPIN_MASTER_KEY_PATH")
            .map_or_else(|| data_dir.join(paths::MASTER_KEY_FILE), PathBuf::from);
        let tools_file = env_string("TOOLPIN_TOOLS_FILE")
            .map_or_else(|| data_dir.join(paths::TOOLS_FILE), PathBuf::from);

        let retry = RetryPolicy::new(
            env_parse("TOOLPIN_MAX_RETRIES", retry::MAX_RETRIES)?,
            Duration::from_millis(env_parse("TOOLPIN_RETRY_BASE_DELAY_MS", retry::BASE_DELAY_MS)?),
            Duration::from_millis(retry::MAX_DELAY_MS),
        );

        let kdf = KdfParams {
            memory_kib: env_parse("TOOLPIN_KDF_MEMORY_KIB", crypto::KDF_MEMORY_KIB)?,
            iterations: env_parse("TOOLPIN_KDF_ITERATIONS", crypto::KDF_ITERATIONS)?,
            parallelism: crypto::KDF_PARALLELISM,
        };
        kdf.validate()?;

        let validation_hours: u64 = env_parse(
            "TOOLPIN_VALIDATION_INTERVAL_HOURS",
            timeouts::VALIDATION_INTERVAL_HOURS,
        )?;

        Ok(Self {
            database_url,
            data_dir,
            master_key_path,
            master_key_override: env_string("TOOLPIN_MASTER_KEY"),
            tools_file,
            request_timeout: Duration::from_secs(env_parse(
                "TOOLPIN_REQUEST_TIMEOUT_SECS",
                timeouts::REQUEST_TIMEOUT_SECS,
            )?),
            retry,
            refresh_threshold: Duration::from_secs(env_parse(
                "TOOLPIN_REFRESH_THRESHOLD_SECS",
                timeouts::REFRESH_THRESHOLD_SECS,
            )?),
            manual_auth_timeout: Duration::from_secs(env_parse(
                "TOOLPIN_MANUAL_AUTH_TIMEOUT_SECS",
                timeouts::MANUAL_AUTH_TIMEOUT_SECS,
            )?),
            validation_interval: Duration::from_secs(validation_hours.saturating_mul(3600)),
            refresh_interval: Duration::from_secs(env_parse(
                "TOOLPIN_REFRESH_INTERVAL_SECS",
                timeouts::REFRESH_INTERVAL_SECS,
            )?),
            kdf,
            log_format: env_parse("TOOLPIN_LOG_FORMAT", LogFormat::Pretty)?,
        })
    }

    /// Settings for the OAuth flow engine
    #[must_use]
    pub const fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            refresh_threshold: self.refresh_threshold,
            manual_auth_timeout: self.manual_auth_timeout,
            retry: self.retry,
        }
    }

    /// Settings for the fixed interface registry
    #[must_use]
    pub const fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            request_timeout: self.request_timeout,
            retry: self.retry,
            validation_interval: self.validation_interval,
        }
    }
}

fn default_data_dir() -> AppResult<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join(paths::APP_DIR))
        .ok_or_else(|| {
            AppError::config("Cannot determine a data directory; set TOOLPIN_DATA_DIR")
        })
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_string(name).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|e| AppError::config(format!("Invalid value for {name}: {e}")))
    })
}
