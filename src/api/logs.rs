// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::{
    error::ApiError,
    model::{Filter, LogLevel, wire::RecordDto},
    state::AppState,
};

#[derive(Serialize)]
struct SearchResponse {
    logs: Vec<RecordDto>,
    total: u64,
    from_cache: bool,
    from_db: bool,
}

impl From<crate::model::QueryResult> for SearchResponse {
    fn from(r: crate::model::QueryResult) -> Self {
        SearchResponse {
            logs: r.logs.iter().map(RecordDto::from).collect(),
            total: r.total,
            from_cache: r.from_cache,
            from_db: r.from_db,
        }
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(filter): Query<Filter>,
) -> impl IntoResponse {
    let result = state.query_router.execute(filter).await;
    Json(SearchResponse::from(result))
}

pub async fn today(
    State(state): State<AppState>,
    Query(mut filter): Query<Filter>,
) -> impl IntoResponse {
    if filter.log_level.is_none() {
        filter.log_level = Some(LogLevel::Error);
    }
    let now = Utc::now();
    filter.start_date.get_or_insert(
        now.date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc(),
    );
    filter.end_date.get_or_insert(now);
    let result = state.query_router.execute(filter).await;
    Json(SearchResponse::from(result))
}

pub async fn error_logs(
    State(state): State<AppState>,
    Query(mut filter): Query<Filter>,
) -> impl IntoResponse {
    filter.log_level = Some(LogLevel::Error);
    let result = state.query_router.execute(filter).await;
    Json(SearchResponse::from(result))
}

pub async fn by_id(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(record)) = state.hot.get(&cid).await {
        return Ok(Json(RecordDto::from(&record)));
    }
    let filter = Filter {
        correlation_id: Some(cid),
        limit: 1,
        ..Default::default()
    };
    let result = state.query_router.execute(filter).await;
    match result.logs.first() {
        Some(record) => Ok(Json(RecordDto::from(record))),
        None => Err(ApiError::RecordNotFound),
    }
}

pub async fn details(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> impl IntoResponse {
    match by_id(State(state), Path(cid)).await {
        Ok(resp) => resp.into_response(),
        Err(_) => Json(serde_json::json!({"error": "Log not found"})).into_response(),
    }
}

#[derive(Serialize)]
struct TraceResponse {
    correlation_id: String,
    has_error: Option<String>,
    error_message: Option<String>,
    error_trace: Option<String>,
}

pub async fn trace(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = Filter {
        correlation_id: Some(cid.clone()),
        limit: 1,
        ..Default::default()
    };
    let result = state.query_router.execute(filter).await;
    match result.logs.first() {
        Some(record) => Ok(Json(TraceResponse {
            correlation_id: record.correlation_id.clone(),
            has_error: record.has_error.clone(),
            error_message: record.error_message.clone(),
            error_trace: record.error_trace.clone(),
        })),
        None => Err(ApiError::RecordNotFound),
    }
}

#[derive(Serialize)]
struct FilterOptionsResponse {
    api_names: Vec<String>,
    service_names: Vec<String>,
}

pub async fn filter_options(State(state): State<AppState>) -> impl IntoResponse {
    let cutoff = Utc::now() - ChronoDuration::days(30);
    let filter = Filter {
        start_date: Some(cutoff),
        limit: 1000,
        ..Default::default()
    };
    let result = state.query_router.execute(filter).await;
    let mut api_names: Vec<String> = result
        .logs
        .iter()
        .map(|r| r.api_name.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut service_names: Vec<String> = result
        .logs
        .iter()
        .map(|r| r.service_name.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    api_names.sort();
    service_names.sort();
    Json(FilterOptionsResponse {
        api_names,
        service_names,
    })
}
