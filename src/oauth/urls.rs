// ABOUTME: Endpoint URL checks and authorization URL construction
// ABOUTME: Provider endpoints must be HTTPS; redirects may also use an http loopback host
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use url::{Host, Url};

use crate::constants::oauth::PKCE_METHOD;
use crate::errors::{AppError, AppResult, FieldViolation};

/// Parse `value` and require the `https` scheme
///
/// # Errors
///
/// Returns `ValidationFailed` naming `field` if the URL is malformed or not HTTPS
pub fn require_https(field: &str, value: &str) -> AppResult<Url> {
    let url = parse(field, value)?;
    if url.scheme() != "https" {
        return Err(insecure(field));
    }
    Ok(url)
}

/// Parse a redirect URI: HTTPS, or plain HTTP on a loopback host
///
/// # Errors
///
/// Returns `ValidationFailed` naming `field` otherwise
pub fn require_redirect_uri(field: &str, value: &str) -> AppResult<Url> {
    let url = parse(field, value)?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        _ => Err(AppError::validation(
            format!("{field} must use HTTPS or an http loopback address"),
            vec![FieldViolation::new(
                field,
                "must be https:// or http://localhost, http://127.0.0.1, http://[::1]",
            )],
        )),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn parse(field: &str, value: &str) -> AppResult<Url> {
    Url::parse(value).map_err(|e| {
        AppError::validation(
            format!("{field} is not a valid URL"),
            vec![FieldViolation::new(field, e.to_string())],
        )
    })
}

fn insecure(field: &str) -> AppError {
    AppError::validation(
        format!("{field} must use HTTPS"),
        vec![FieldViolation::new(field, "must be an https:// URL")],
    )
}

/// Parameters of an authorization request
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    /// Provider authorization endpoint
    pub auth_url: &'a str,
    /// OAuth client identifier
    pub client_id: &'a str,
    /// Where the provider sends the human back
    pub redirect_uri: &'a str,
    /// Requested scopes
    pub scopes: &'a [String],
    /// CSRF state value
    pub state: &'a str,
    /// S256 challenge when PKCE is enabled
    pub code_challenge: Option<&'a str>,
}

/// Provider URL the human opens to grant access
///
/// Existing query parameters of the authorization endpoint are preserved.
///
/// # Errors
///
/// Returns `ValidationFailed` if the authorization endpoint is not an HTTPS URL
pub fn build_authorization_url(request: &AuthorizationRequest<'_>) -> AppResult<String> {
    let mut url = require_https("auth_url", request.auth_url)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", request.client_id)
            .append_pair("redirect_uri", request.redirect_uri)
            .append_pair("state", request.state);
        if !request.scopes.is_empty() {
            query.append_pair("scope", &request.scopes.join(" "));
        }
        if let Some(challenge) = request.code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", PKCE_METHOD);
        }
    }
    Ok(url.into())
}
