// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chartly::ChartlyError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
    pub request_id: String,
    #[serde(skip)]
    status: StatusCode,
}
impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
            request_id: Uuid::new_v4().to_string(),
            status,
        }
    }
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }
    pub fn status(&self) -> StatusCode {
        self.status
    }
    fn from_engine_error(e: &ChartlyError) -> Self {
        let status = match e {
            ChartlyError::Parse(_) | ChartlyError::ColumnNotFound { .. } => StatusCode::BAD_REQUEST,
            ChartlyError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            ChartlyError::UnsupportedChartType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ChartlyError::Config(_) | ChartlyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let mut api_error = Self::new(status, e.code(), e.user_message());
        api_error.details = match e {
            ChartlyError::SessionNotFound { session_id } => {
                Some(serde_json::json!({ "session_id": session_id }))
            }
            ChartlyError::UnsupportedChartType { chart_type, .. } => {
                Some(serde_json::json!({ "chart_type": chart_type }))
            }
            ChartlyError::ColumnNotFound { column } => {
                Some(serde_json::json!({ "column": column }))
            }
            _ => None,
        };
        api_error
    }
}
impl From<ChartlyError> for ApiError {
    fn from(e: ChartlyError) -> Self {
        let api_error = Self::from_engine_error(&e);
        if e.is_client_error() {
            warn!(request_id = %api_error.request_id, code = e.code(), "Request rejected: {}", e);
        } else {
            error!(request_id = %api_error.request_id, code = e.code(), "Request failed: {}", e);
        }
        api_error
    }
}
impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        let status = e.status();
        warn!(%status, "Failed to read multipart upload: {}", e.body_text());
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload is too large.".to_string()
        } else {
            format!("Failed to read multipart field: {}", e.body_text())
        };
        Self::new(status, "INVALID_UPLOAD", message)
    }
}
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        warn!(status = %e.status(), "Rejected JSON body: {}", e.body_text());
        Self::bad_request(format!("Invalid request body: {}", e.body_text()))
    }
}
impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        warn!(status = %e.status(), "Rejected multipart request: {}", e.body_text());
        Self::bad_request(format!("Expected a multipart form upload: {}", e.body_text()))
    }
}
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(self);
        (status, body).into_response()
    }
}
