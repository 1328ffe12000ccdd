// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{error::ApiError, model::AnalyticsFilter, state::AppState};

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<u32>,
}

pub async fn overview(
    State(state): State<AppState>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state.aggregator.overview(&filter).await?;
    Ok(Json(overview))
}

pub async fn logs_per_day(
    State(state): State<AppState>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state.aggregator.logs_per_day(&filter).await?;
    Ok(Json(points))
}

pub async fn error_distribution(
    State(state): State<AppState>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state.aggregator.error_distribution(&filter).await?;
    Ok(Json(points))
}

pub async fn top_response_time_urls(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state
        .aggregator
        .top_response_time_urls(query.limit.unwrap_or(10))
        .await?;
    Ok(Json(points))
}

pub async fn url_heat_map(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let points = state
        .aggregator
        .url_heat_map(query.limit.unwrap_or(20))
        .await?;
    Ok(Json(points))
}
