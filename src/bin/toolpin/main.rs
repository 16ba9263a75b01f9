// ABOUTME: Command-line entry point for registering, executing, and authorizing fixed interfaces
// ABOUTME: Every command prints one JSON OperationResponse on stdout; logs go to stderr
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

//! # toolpin CLI
//!
//! ```bash
//! # Pin an operation, synthesizing its schemas from the live endpoint
//! toolpin register --tool weather --name forecast --auto-discover
//!
//! # Execute it with new parameters
//! toolpin use forecast --tool weather --params '{"city":"Lyon"}'
//!
//! # Authorize a tool that needs OAuth
//! toolpin auth weather --login
//! toolpin auth weather --callback <code> --state <state>
//!
//! # Keep tokens fresh in the background
//! toolpin refresh-daemon
//! ```
//!
//! Configuration comes from `TOOLPIN_*` environment variables.

mod commands;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use toolpin::auth::CredentialResolver;
use toolpin::config::ToolpinConfig;
use toolpin::crypto::{CredentialCipher, MasterKeyStore};
use toolpin::database::Database;
use toolpin::errors::{AppError, AppResult, OperationResponse};
use toolpin::external::{HttpProtocolClient, StaticToolRegistry};
use toolpin::interfaces::FixedInterfaceRegistry;
use toolpin::logging::init_logging;
use toolpin::oauth::{HttpTokenEndpoint, OAuthEngine};

use commands::{auth, daemon, interfaces, stats};

#[derive(Parser)]
#[command(
    name = "toolpin",
    version,
    about = "Fixed, schema-validated interfaces for remote tools",
    long_about = "Register an operation of a remote tool once, then execute it directly with new parameters"
)]
struct Cli {
    /// Print compact single-line JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register or re-register a fixed interface
    Register(interfaces::RegisterArgs),
    /// Execute a fixed interface, or call an operation dynamically
    Use(interfaces::UseArgs),
    /// Manage OAuth configurations, tokens, and static credentials of a tool
    Auth(auth::AuthArgs),
    /// Performance statistics
    Stats(stats::StatsArgs),
    /// List fixed interfaces
    List(interfaces::ListArgs),
    /// Compare fixed interfaces with their live endpoints
    Validate(interfaces::ValidateArgs),
    /// Retire or reactivate a fixed interface
    Retire(interfaces::RetireArgs),
    /// Delete a fixed interface, or everything stored for a tool
    Remove(interfaces::RemoveArgs),
    /// Refresh expiring tokens and purge stale authorizations periodically
    RefreshDaemon(daemon::DaemonArgs),
}

/// Components shared by every command
pub struct Context {
    /// Loaded configuration
    pub config: ToolpinConfig,
    /// OAuth flow engine
    pub oauth: Arc<OAuthEngine>,
    /// Static credential store
    pub credentials: CredentialResolver,
    /// Fixed interface registry
    pub registry: FixedInterfaceRegistry,
}

impl Context {
    async fn build(config: ToolpinConfig) -> anyhow::Result<Self> {
        let master_key = MasterKeyStore::new(&config.master_key_path)
            .resolve(config.master_key_override.as_deref())
            .context("Failed to load the master key")?;
        let cipher = CredentialCipher::new(master_key, config.kdf)
            .context("Failed to initialize the credential cipher")?;
        let database = Database::new(&config.database_url, cipher)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?;
        let tools = Arc::new(
            StaticToolRegistry::from_file(&config.tools_file)
                .context("Failed to load the tools file")?,
        );
        debug!(tools = tools.tools().len(), "Loaded tool registry");

        let oauth = Arc::new(OAuthEngine::new(
            database.clone(),
            Arc::new(HttpTokenEndpoint::new(config.request_timeout)),
            config.oauth_settings(),
        ));
        let credentials = CredentialResolver::new(database.clone(), Arc::clone(&oauth));
        let registry = FixedInterfaceRegistry::new(
            database,
            tools,
            Arc::new(HttpProtocolClient::new()),
            Arc::new(credentials.clone()),
            config.registry_settings(),
        );

        Ok(Self {
            config,
            oauth,
            credentials,
            registry,
        })
    }
}

/// Convert a command outcome into the printed envelope
pub fn respond<T: Serialize>(result: AppResult<T>) -> OperationResponse<Value> {
    OperationResponse::from(result.and_then(|data| serde_json::to_value(data).map_err(AppError::from)))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = ToolpinConfig::from_env().context("Invalid configuration")?;
    init_logging(config.log_format, "warn,toolpin=info");

    let context = Context::build(config).await?;
    let response = match cli.command {
        Command::Register(args) => interfaces::register(&context, args).await,
        Command::Use(args) => interfaces::execute(&context, args).await,
        Command::Auth(args) => auth::run(&context, args).await,
        Command::Stats(args) => stats::run(&context, args).await,
        Command::List(args) => interfaces::list(&context, args).await,
        Command::Validate(args) => interfaces::validate(&context, args).await,
        Command::Retire(args) => interfaces::retire(&context, args).await,
        Command::Remove(args) => interfaces::remove(&context, args).await,
        Command::RefreshDaemon(args) => daemon::run(&context, args).await,
    };

    let rendered = if cli.compact {
        serde_json::to_string(&response)
    } else {
        serde_json::to_string_pretty(&response)
    }
    .context("Failed to render response")?;
    println!("{rendered}");

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
