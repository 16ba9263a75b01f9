// ABOUTME: Default values shared by configuration, the OAuth engine, and the registry
// ABOUTME: Timeouts, thresholds, retry bounds, key derivation cost, and file names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Timing defaults
pub mod timeouts {
    /// Deadline for one remote protocol call
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Window in which a human must complete a browser authorization
    pub const MANUAL_AUTH_TIMEOUT_SECS: u64 = 600;
    /// Tokens expiring within this many seconds are refreshed before use
    pub const REFRESH_THRESHOLD_SECS: u64 = 300;
    /// Period of the background token refresh scan
    pub const REFRESH_INTERVAL_SECS: u64 = 300;
    /// Interfaces not validated within this many hours are reported stale
    pub const VALIDATION_INTERVAL_HOURS: u64 = 24;
}

/// Retry defaults for retryable failures
pub mod retry {
    /// Attempts after the first one
    pub const MAX_RETRIES: u32 = 3;
    /// Delay before the first retry; doubled on each subsequent retry
    pub const BASE_DELAY_MS: u64 = 200;
    /// Upper bound on any single backoff delay
    pub const MAX_DELAY_MS: u64 = 10_000;
}

/// Credential cipher parameters
pub mod crypto {
    /// Version byte prefixed to every ciphertext
    pub const CIPHER_VERSION: u8 = 1;
    /// Argon2id salt length
    pub const SALT_LEN: usize = 16;
    /// AES-256-GCM nonce length
    pub const NONCE_LEN: usize = 12;
    /// AES-256-GCM tag length
    pub const TAG_LEN: usize = 16;
    /// Length of the master key and derived keys
    pub const KEY_LEN: usize = 32;
    /// Argon2id memory cost
    pub const KDF_MEMORY_KIB: u32 = 19_456;
    /// Argon2id iteration count
    pub const KDF_ITERATIONS: u32 = 2;
    /// Argon2id lanes
    pub const KDF_PARALLELISM: u32 = 1;
}

/// OAuth protocol values
pub mod oauth {
    /// Random bytes in a state value
    pub const STATE_BYTES: usize = 32;
    /// Random bytes in a PKCE verifier (43 base64url characters)
    pub const PKCE_VERIFIER_BYTES: usize = 32;
    /// PKCE challenge method
    pub const PKCE_METHOD: &str = "S256";
    /// Token type assumed when the provider omits it
    pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";
}

/// Protocol client values
pub mod protocol {
    /// JSON-RPC version string
    pub const JSONRPC_VERSION: &str = "2.0";
    /// Method used to execute an operation
    pub const CALL_METHOD: &str = "tools/call";
    /// Method used to list operations and their schemas
    pub const LIST_METHOD: &str = "tools/list";
}

/// Names of files under the data directory
pub mod paths {
    /// Application directory name under the platform data dir
    pub const APP_DIR: &str = "toolpin";
    /// SQLite database file
    pub const DATABASE_FILE: &str = "toolpin.db";
    /// Wrapped master key file
    pub const MASTER_KEY_FILE: &str = "master.key";
    /// Tool registry file
    pub const TOOLS_FILE: &str = "tools.json";
}

/// Performance score weighting
pub mod scoring {
    /// Latency at which the latency half of the score reaches zero
    pub const LATENCY_CEILING_MS: f64 = 5_000.0;
}
