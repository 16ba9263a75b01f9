// ABOUTME: Background maintenance loop for long-running deployments
// ABOUTME: Runs the token refresh scheduler until interrupted, or a single pass with --once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::{json, Value};
use tracing::{info, warn};

use toolpin::errors::{AppError, AppResult, OperationResponse};
use toolpin::oauth::TokenRefreshScheduler;

use crate::{respond, Context};

#[derive(Args)]
pub struct DaemonArgs {
    /// Scan period in seconds, overriding TOOLPIN_REFRESH_INTERVAL_SECS
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Run one pass and exit
    #[arg(long)]
    once: bool,
    /// Also re-validate stale interfaces on each pass
    #[arg(long)]
    revalidate: bool,
}

pub async fn run(context: &Context, args: DaemonArgs) -> OperationResponse<Value> {
    respond(run_daemon(context, args).await)
}

async fn run_daemon(context: &Context, args: DaemonArgs) -> AppResult<Value> {
    let period = args
        .interval_secs
        .map_or(context.config.refresh_interval, Duration::from_secs);
    let scheduler = Arc::new(TokenRefreshScheduler::new(Arc::clone(&context.oauth), period));

    if args.once {
        scheduler.run_once().await;
        let revalidation = if args.revalidate {
            Some(context.registry.revalidate_stale().await?)
        } else {
            None
        };
        return Ok(json!({ "passes": 1, "revalidation": revalidation }));
    }

    let handle = Arc::clone(&scheduler).start_scheduler()?;
    let revalidation_period = context.config.validation_interval.max(Duration::from_secs(60));
    if args.revalidate {
        info!(
            "Re-validating stale interfaces every {} seconds",
            revalidation_period.as_secs()
        );
    }
    let mut ticker = tokio::time::interval(revalidation_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                handle.abort();
                signal.map_err(|e| AppError::internal("Failed to listen for interrupt").with_cause(e))?;
                info!("Interrupted, stopping refresh daemon");
                return Ok(json!({ "stopped": true }));
            }
            _ = ticker.tick(), if args.revalidate => {
                match context.registry.revalidate_stale().await {
                    Ok(report) => info!(
                        validated = report.validated.len(),
                        failed = report.failed.len(),
                        "Stale interface re-validation pass finished"
                    ),
                    Err(e) => warn!("Stale interface re-validation failed: {}", e),
                }
            }
        }
    }
}
