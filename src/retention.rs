// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Retention sweeper (C13): a daily background task independent of the
//! tailer loop that enforces the cold-store retention horizon. The hot
//! store's own TTL handles its side passively and needs no sweeper action.

use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cold_store::ColdStore;

pub struct RetentionSweeper {
    cold: Arc<ColdStore>,
    horizon_days: i64,
    interval: Duration,
    cancel: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(
        cold: Arc<ColdStore>,
        horizon_days: i64,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cold,
            horizon_days,
            interval,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("retention sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(self.horizon_days);
        match self.cold.delete_older_than(cutoff).await {
            Ok(deleted) => info!(deleted, cutoff = %cutoff, "retention sweep complete"),
            Err(err) => tracing::warn!(error = %err, "retention sweep failed"),
        }
    }
}
