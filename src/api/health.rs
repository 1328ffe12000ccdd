// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "logstream-server"
}

#[derive(Serialize)]
struct ServiceStatuses {
    database: bool,
    cache: bool,
    file_watcher: bool,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    timestamp: String,
    services: ServiceStatuses,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.cold.query(&Default::default()).await.is_ok();
    let cache = state.hot.count().await.is_ok();
    // The tailer has no externally observable "is running" flag beyond
    // process liveness itself, since it never blocks on a remote dependency.
    let file_watcher = true;

    let status = if database && cache {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthReport {
        status,
        timestamp: Utc::now().to_rfc3339(),
        services: ServiceStatuses {
            database,
            cache,
            file_watcher,
        },
    })
}
