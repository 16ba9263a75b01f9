// ABOUTME: Fixed interface commands: register, use, list, validate, retire, remove
// ABOUTME: Thin argument mapping onto FixedInterfaceRegistry operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::time::Duration;

use clap::{ArgGroup, Args};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use toolpin::database::InterfaceFilter;
use toolpin::errors::{AppError, OperationResponse};
use toolpin::interfaces::{ExecuteOptions, RegisterInterfaceRequest, RegisterOptions};
use toolpin::models::SemanticVersion;

use super::parse_json;
use crate::{respond, Context};

#[derive(Args)]
pub struct RegisterArgs {
    /// Tool identifier
    #[arg(long)]
    tool: String,
    /// Operation name
    #[arg(long)]
    name: String,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Operation selector schema, JSON or @file
    #[arg(long, value_parser = parse_json)]
    operation_schema: Option<Value>,
    /// Parameters schema, JSON or @file
    #[arg(long, value_parser = parse_json)]
    parameters_schema: Option<Value>,
    /// Response schema, JSON or @file
    #[arg(long, value_parser = parse_json)]
    response_schema: Option<Value>,
    /// Explicit semantic version
    #[arg(long)]
    version: Option<SemanticVersion>,
    /// Overwrite an existing interface with the same name
    #[arg(long)]
    force: bool,
    /// Require the tool to advertise the operation
    #[arg(long)]
    validate_tool: bool,
    /// Fill missing schemas from the live endpoint
    #[arg(long)]
    auto_discover: bool,
    /// Show the record without storing it
    #[arg(long)]
    dry_run: bool,
}

pub async fn register(context: &Context, args: RegisterArgs) -> OperationResponse<Value> {
    let request = RegisterInterfaceRequest {
        tool_id: args.tool,
        name: args.name,
        display_name: args.display_name,
        description: args.description,
        operation_schema: args.operation_schema,
        parameters_schema: args.parameters_schema,
        response_schema: args.response_schema,
        version: args.version,
    };
    let options = RegisterOptions {
        force: args.force,
        validate_tool: args.validate_tool,
        auto_discover: args.auto_discover,
        dry_run: args.dry_run,
    };
    respond(context.registry.register(request, options).await)
}

#[derive(Args)]
pub struct UseArgs {
    /// Interface name or id
    target: String,
    /// Tool, required when the name exists for several tools
    #[arg(long)]
    tool: Option<String>,
    /// Parameters, JSON or @file
    #[arg(long, value_parser = parse_json)]
    params: Option<Value>,
    /// Per-call deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Check the result against the response schema
    #[arg(long)]
    validate_response: bool,
    /// Retries for network failures
    #[arg(long)]
    retries: Option<u32>,
    /// Execute even if the interface is retired
    #[arg(long)]
    force: bool,
    /// Discover and call the operation without a fixed interface
    #[arg(long, requires = "tool")]
    dynamic: bool,
}

pub async fn execute(context: &Context, args: UseArgs) -> OperationResponse<Value> {
    let params = args.params.unwrap_or_else(|| json!({}));
    let timeout = args.timeout_secs.map(Duration::from_secs);

    if args.dynamic {
        let tool = args.tool.unwrap_or_default();
        return respond(
            context
                .registry
                .call_dynamic(&tool, &args.target, params, timeout)
                .await,
        );
    }

    let options = ExecuteOptions {
        timeout,
        validate_response: args.validate_response,
        retry_attempts: args.retries,
        force: args.force,
    };
    let result = match Uuid::parse_str(&args.target) {
        Ok(id) => context.registry.execute(id, params, options).await,
        Err(_) => {
            context
                .registry
                .execute_by_name(&args.target, args.tool.as_deref(), params, options)
                .await
        }
    };
    respond(result)
}

#[derive(Args)]
#[command(group(ArgGroup::new("activity").args(["active", "inactive"])))]
pub struct ListArgs {
    #[arg(long)]
    tool: Option<String>,
    #[arg(long)]
    name: Option<String>,
    /// Only active interfaces
    #[arg(long)]
    active: bool,
    /// Only retired interfaces
    #[arg(long)]
    inactive: bool,
    #[arg(long)]
    version: Option<SemanticVersion>,
}

pub async fn list(context: &Context, args: ListArgs) -> OperationResponse<Value> {
    let active = match (args.active, args.inactive) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let filter = InterfaceFilter {
        tool_id: args.tool,
        name: args.name,
        active,
        version: args.version,
    };
    respond(context.registry.list(&filter).await)
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["id", "stale"])))]
pub struct ValidateArgs {
    /// Interface id
    id: Option<Uuid>,
    /// Validate every interface due for re-validation
    #[arg(long)]
    stale: bool,
}

pub async fn validate(context: &Context, args: ValidateArgs) -> OperationResponse<Value> {
    match args.id {
        Some(id) => respond(context.registry.validate(id).await),
        None => respond(context.registry.revalidate_stale().await),
    }
}

#[derive(Args)]
pub struct RetireArgs {
    /// Interface id
    id: Uuid,
    /// Make the interface executable again
    #[arg(long)]
    reactivate: bool,
}

pub async fn retire(context: &Context, args: RetireArgs) -> OperationResponse<Value> {
    if args.reactivate {
        respond(context.registry.reactivate(args.id).await)
    } else {
        respond(context.registry.retire(args.id).await)
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["id", "tool"])))]
pub struct RemoveArgs {
    /// Interface id
    id: Option<Uuid>,
    /// Remove every interface, OAuth configuration, and credential of the tool
    #[arg(long)]
    tool: Option<String>,
}

pub async fn remove(context: &Context, args: RemoveArgs) -> OperationResponse<Value> {
    match (args.id, args.tool) {
        (Some(id), _) => respond(
            context
                .registry
                .delete(id)
                .await
                .map(|()| json!({ "deleted": id })),
        ),
        (None, Some(tool)) => {
            let result = context.registry.purge_tool(&tool).await;
            if let Ok(summary) = &result {
                info!(
                    tool_id = %tool,
                    interfaces = summary.interfaces,
                    oauth_configurations = summary.oauth_configurations,
                    credentials = summary.credentials,
                    "Purged tool"
                );
            }
            respond(result)
        }
        (None, None) => OperationResponse::failure(&AppError::invalid_input(
            "Specify an interface id or --tool",
        )),
    }
}
