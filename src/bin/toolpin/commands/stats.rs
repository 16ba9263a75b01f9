// ABOUTME: Performance statistics command
// ABOUTME: Per-interface, filtered, or fixed-versus-dynamic comparison views
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::time::Duration;

use clap::Args;
use serde_json::Value;
use uuid::Uuid;

use toolpin::errors::OperationResponse;
use toolpin::models::AccessType;
use toolpin::telemetry::StatsQuery;

use crate::{respond, Context};

#[derive(Args)]
pub struct StatsArgs {
    /// Statistics of one interface
    #[arg(long, conflicts_with_all = ["operation", "access_type", "compare"])]
    interface: Option<Uuid>,
    #[arg(long)]
    tool: Option<String>,
    #[arg(long)]
    operation: Option<String>,
    /// fixed, dynamic, or discovery
    #[arg(long)]
    access_type: Option<AccessType>,
    /// Only samples from the last N seconds
    #[arg(long)]
    window_secs: Option<u64>,
    /// Compare fixed, dynamic, and discovery latency of a tool
    #[arg(long, requires = "tool")]
    compare: bool,
}

pub async fn run(context: &Context, args: StatsArgs) -> OperationResponse<Value> {
    let window = args.window_secs.map(Duration::from_secs);

    if let Some(id) = args.interface {
        return respond(context.registry.get_stats(id, window).await);
    }

    let tracker = context.registry.tracker();
    match args.tool {
        Some(tool) if args.compare => respond(tracker.compare_access_types(&tool, window).await),
        tool_id => {
            let query = StatsQuery {
                tool_id,
                operation_name: args.operation,
                access_type: args.access_type,
                window,
            };
            respond(tracker.get_stats(&query).await)
        }
    }
}
