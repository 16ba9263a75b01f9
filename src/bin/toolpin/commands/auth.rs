// ABOUTME: Authorization commands: OAuth configuration, login, callback, refresh, logout, credentials
// ABOUTME: A login prints the manual intervention payload the operator has to follow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use clap::{ArgGroup, Args};
use serde_json::{json, Value};

use toolpin::auth::AuthMethod;
use toolpin::errors::{AppError, AppResult, OperationResponse};
use toolpin::models::AuthenticationResult;
use toolpin::oauth::{AuthFlowOptions, CreateOAuthConfigRequest, UpdateOAuthConfigRequest};

use super::parse_json;
use crate::{respond, Context};

#[derive(Args)]
#[command(group(
    ArgGroup::new("action").args([
        "login",
        "callback",
        "refresh",
        "test",
        "logout",
        "configure",
        "update",
        "credential",
        "remove_credential",
    ])
))]
pub struct AuthArgs {
    /// Tool identifier
    tool: String,
    /// Provider, required when the tool has several OAuth configurations
    #[arg(long)]
    provider: Option<String>,

    /// Start an authorization and print the URL to open
    #[arg(long)]
    login: bool,
    /// Complete an authorization with the code from the redirect
    #[arg(long, requires = "state")]
    callback: Option<String>,
    /// State value from the redirect
    #[arg(long)]
    state: Option<String>,
    /// Refresh the access token
    #[arg(long)]
    refresh: bool,
    /// Refresh even if the token is still valid
    #[arg(long, requires = "refresh")]
    force: bool,
    /// Check whether a usable token is available
    #[arg(long)]
    test: bool,
    /// Discard the stored token and pending authorizations
    #[arg(long)]
    logout: bool,

    /// Create an OAuth configuration for the tool
    #[arg(long, requires_all = ["client_id", "auth_url", "token_url", "redirect_uri"])]
    configure: bool,
    /// Correct endpoints, scopes, or redirect URI of the configuration
    #[arg(long)]
    update: bool,
    #[arg(long)]
    client_id: Option<String>,
    /// Confidential client secret, stored encrypted
    #[arg(long)]
    client_secret: Option<String>,
    #[arg(long)]
    auth_url: Option<String>,
    #[arg(long)]
    token_url: Option<String>,
    #[arg(long)]
    redirect_uri: Option<String>,
    /// Scope, repeatable
    #[arg(long = "scope")]
    scopes: Vec<String>,
    /// Disable PKCE for providers that reject it
    #[arg(long, requires = "configure")]
    no_pkce: bool,

    /// Store a static credential, JSON or @file, e.g. {"kind":"bearer","token":"..."}
    #[arg(long, value_parser = parse_json)]
    credential: Option<Value>,
    /// Delete the stored static credential
    #[arg(long)]
    remove_credential: bool,
}

pub async fn run(context: &Context, args: AuthArgs) -> OperationResponse<Value> {
    let oauth = &context.oauth;
    let tool = args.tool.as_str();
    let provider = args.provider.as_deref();
    let scopes = (!args.scopes.is_empty()).then(|| args.scopes.clone());

    if args.login {
        let options = AuthFlowOptions {
            provider: args.provider.clone(),
            redirect_uri: args.redirect_uri.clone(),
            scopes,
        };
        return respond_authentication(oauth.initiate_auth_flow(tool, options).await);
    }
    if let (Some(code), Some(state)) = (&args.callback, &args.state) {
        return respond_authentication(oauth.handle_callback(code, state).await);
    }
    if args.refresh {
        return respond(oauth.refresh_token(tool, provider, args.force).await);
    }
    if args.test {
        return respond(oauth.test_authentication(tool, provider).await);
    }
    if args.logout {
        return respond(
            oauth
                .logout(tool, provider)
                .await
                .map(|removed| json!({ "tool_id": tool, "logged_out": removed })),
        );
    }
    if args.configure {
        let request = CreateOAuthConfigRequest {
            tool_id: args.tool.clone(),
            provider: args.provider.clone().unwrap_or_else(|| args.tool.clone()),
            client_id: args.client_id.unwrap_or_default(),
            client_secret: args.client_secret,
            auth_url: args.auth_url.unwrap_or_default(),
            token_url: args.token_url.unwrap_or_default(),
            scopes: args.scopes,
            redirect_uri: args.redirect_uri.unwrap_or_default(),
            pkce_enabled: !args.no_pkce,
        };
        return respond(oauth.create_configuration(request).await);
    }
    if args.update {
        let request = UpdateOAuthConfigRequest {
            auth_url: args.auth_url,
            token_url: args.token_url,
            scopes,
            redirect_uri: args.redirect_uri,
        };
        return respond(oauth.update_configuration(tool, provider, request).await);
    }
    if let Some(raw) = args.credential {
        return respond(store_credential(context, tool, raw).await);
    }
    if args.remove_credential {
        return respond(
            context
                .credentials
                .remove_credential(tool)
                .await
                .map(|removed| json!({ "tool_id": tool, "removed": removed })),
        );
    }

    respond(oauth.get_auth_status(tool, provider).await)
}

async fn store_credential(context: &Context, tool: &str, raw: Value) -> AppResult<Value> {
    let method: AuthMethod = serde_json::from_value(raw)
        .map_err(|e| AppError::invalid_input(format!("Unrecognized credential: {e}")))?;
    context.credentials.store_credential(tool, &method).await?;
    Ok(json!({ "tool_id": tool, "kind": method.kind() }))
}

/// Pending flows succeed with the intervention payload on the envelope
fn respond_authentication(result: AppResult<AuthenticationResult>) -> OperationResponse<Value> {
    let intervention = result
        .as_ref()
        .ok()
        .and_then(|r| r.manual_intervention.clone());
    if intervention.is_some() {
        respond(result).with_manual_intervention(intervention)
    } else {
        respond(result)
    }
}
