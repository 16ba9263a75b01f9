// ABOUTME: Background task refreshing OAuth tokens before they expire
// ABOUTME: Periodic scan on a tokio interval; failures are logged, never propagated
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 The toolpin Authors

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::OAuthEngine;
use crate::errors::{AppError, AppResult};

/// Token refresh scheduler for daemon deployments
pub struct TokenRefreshScheduler {
    engine: Arc<OAuthEngine>,
    period: Duration,
}

impl TokenRefreshScheduler {
    /// Create a scheduler scanning every `period`
    #[must_use]
    pub const fn new(engine: Arc<OAuthEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Start the refresh loop on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the period is zero
    pub fn start_scheduler(self: Arc<Self>) -> AppResult<JoinHandle<()>> {
        if self.period.is_zero() {
            return Err(AppError::config("Token refresh interval must be positive"));
        }

        info!(
            "Starting token refresh scheduler - scanning every {} seconds",
            self.period.as_secs()
        );

        let scheduler = Arc::clone(&self);
        Ok(tokio::spawn(async move {
            let mut interval_timer = interval(scheduler.period);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval_timer.tick().await;
                scheduler.run_once().await;
            }
        }))
    }

    /// One scan: discard expired pending flows, then refresh expiring tokens
    pub async fn run_once(&self) {
        if let Err(e) = self.engine.purge_expired_flows().await {
            error!("Pending authorization cleanup failed: {}", e);
        }

        match self.engine.refresh_expiring_tokens().await {
            Ok(sweep) if sweep.examined > 0 => info!(
                examined = sweep.examined,
                refreshed = sweep.refreshed,
                failed = sweep.failed,
                "Token refresh scan finished"
            ),
            Ok(_) => {}
            Err(e) => error!("Token refresh scan failed: {}", e),
        }
    }
}
