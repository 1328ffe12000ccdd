// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The boundary error taxonomy (SPEC_FULL.md §7). Internal components use
//! their own `thiserror` enums or `anyhow::Result`; only the HTTP layer
//! converts into this opaque, status-coded shape.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("record not found")]
    RecordNotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, id) = match &self {
            ApiError::MalformedRequest(detail) => {
                (StatusCode::BAD_REQUEST, detail.clone(), None)
            },
            ApiError::RecordNotFound => {
                (StatusCode::NOT_FOUND, "log not found".to_string(), None)
            },
            ApiError::Internal(err) => {
                let id = Uuid::new_v4().to_string();
                tracing::error!(error_id = %id, error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    Some(id),
                )
            },
        };

        (status, Json(json!(ErrorBody { error: message, id }))).into_response()
    }
}

/// Parser-local outcomes (C1), folded into structured log fields by the
/// tailer rather than surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("frame body is not valid JSON")]
    FrameRejected,
    #[error("required field missing: {0}")]
    RequiredFieldMissing(&'static str),
}

/// Cold store errors (C5).
#[derive(Debug, thiserror::Error)]
pub enum ColdStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Hot store errors (C4).
#[derive(Debug, thiserror::Error)]
pub enum HotStoreError {
    #[error("cache unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}
