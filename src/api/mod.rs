// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! HTTP/WS boundary (C10): the only surface external callers speak to.

pub mod analytics;
pub mod health;
pub mod logs;
pub mod ws;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.cors_origins);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/logs", get(logs::search))
        .route("/logs/today", get(logs::today))
        .route("/logs/error-logs", get(logs::error_logs))
        .route("/logs/filter-options", get(logs::filter_options))
        .route("/logs/details/{cid}", get(logs::details))
        .route("/logs/trace/{cid}", get(logs::trace))
        .route("/logs/{cid}", get(logs::by_id))
        .route("/analytics/overview", get(analytics::overview))
        .route("/analytics/summary", get(analytics::overview))
        .route("/analytics/stats", get(analytics::overview))
        .route("/analytics/performance", get(analytics::top_response_time_urls))
        .route("/analytics/errors/breakdown", get(analytics::error_distribution))
        .route("/analytics/logs-per-day", get(analytics::logs_per_day))
        .route("/analytics/error-distribution", get(analytics::error_distribution))
        .route(
            "/analytics/top-response-time-urls",
            get(analytics::top_response_time_urls),
        )
        .route("/analytics/url-heat-map", get(analytics::url_heat_map))
        .route("/ws/logs", get(ws::logs_ws))
        .route("/ws/live-stats", get(ws::stats_ws))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}
