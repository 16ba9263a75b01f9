// ABOUTME: OAuth authorization for tools behind OAuth2-protected endpoints
// ABOUTME: Flow engine, PKCE, endpoint checks, token endpoint client, and background refresh
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

/// Authorization state machine and token lifecycle
pub mod engine;
/// PKCE pairs and state values
pub mod pkce;
/// Periodic refresh of tokens nearing expiry
pub mod refresh_scheduler;
/// Provider token endpoint client
pub mod token_client;
/// Endpoint URL checks and authorization URL construction
pub mod urls;

pub use engine::{
    AuthFlowOptions, CreateOAuthConfigRequest, OAuthEngine, RefreshSweep, UpdateOAuthConfigRequest,
};
pub use pkce::{generate_state, s256_challenge, PkcePair};
pub use refresh_scheduler::TokenRefreshScheduler;
pub use token_client::{HttpTokenEndpoint, TokenEndpoint, TokenGrant, TokenRequest, TokenResponse};
