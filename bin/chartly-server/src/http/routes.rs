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

use crate::http::error::ApiError;
use crate::AppState;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chartly::{
    ChartAnalysisResult, ChartlyError, RenderRequest, RenderResponse, SessionInfo, SuggestRequest,
    SuggestionsResponse, UploadResponse,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// `*` or a comma-separated list of allowed origins.
    pub cors_origin: String,
    pub upload_limit_bytes: usize,
}
impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            cors_origin: "*".to_string(),
            upload_limit_bytes: 20 * 1024 * 1024,
        }
    }
}
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(vec![header::CONTENT_TYPE]);
    if cors_origin.trim() == "*" {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}
pub fn build_router(state: Arc<AppState>, options: &ServerOptions) -> Router {
    let upload_limit = DefaultBodyLimit::max(options.upload_limit_bytes);
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/upload-csv", post(upload_csv).layer(upload_limit.clone()))
        .route("/api/suggest-charts", post(suggest_charts))
        .route("/api/render-chart", post(render_chart))
        .route(
            "/api/analyze-chart-image",
            post(analyze_chart_image).layer(upload_limit),
        )
        .route(
            "/api/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .layer(cors_layer(&options.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
async fn root() -> Json<JsonValue> {
    Json(json!({ "message": "Chartly API is running" }))
}
async fn health(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "sessions": state.engine.sessions().len(),
        "session_ttl_secs": state.engine.sessions().ttl().num_seconds(),
        "classifier_configured": state.engine.classifier_configured(),
    }))
}
struct UploadedFile {
    file_name: Option<String>,
    bytes: Vec<u8>,
}
async fn upload_csv(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut file: Option<UploadedFile> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?.to_vec();
            file = Some(UploadedFile { file_name, bytes });
        }
    }
    let file = file.ok_or_else(|| ApiError::bad_request("No file provided in upload."))?;
    debug!(
        file_name = file.file_name.as_deref().unwrap_or("-"),
        bytes = file.bytes.len(),
        "CSV upload received"
    );
    let engine = Arc::clone(&state.engine);
    let response = tokio::task::spawn_blocking(move || {
        engine.upload_csv(file.file_name.as_deref(), &file.bytes)
    })
    .await
    .map_err(|e| ChartlyError::Internal(format!("profiling task failed: {e}")))??;
    Ok(Json(response))
}
async fn suggest_charts(
    State(state): State<Arc<AppState>>,
    request: Result<Json<SuggestRequest>, JsonRejection>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let Json(request) = request?;
    Ok(Json(state.engine.suggest(&request)?))
}
async fn render_chart(
    State(state): State<Arc<AppState>>,
    request: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<RenderResponse>, ApiError> {
    let Json(request) = request?;
    Ok(Json(state.engine.render(&request)?))
}
async fn analyze_chart_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChartAnalysisResult>, ApiError> {
    let mut multipart = multipart?;
    let mut session_id: Option<String> = None;
    let mut image: Vec<u8> = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("session_id") => session_id = Some(field.text().await?.trim().to_string()),
            Some("file") => image = field.bytes().await?.to_vec(),
            _ => {}
        }
    }
    let session_id = session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'session_id' field."))?;
    Ok(Json(state.engine.analyze_image(&session_id, &image).await?))
}
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.engine.session_info(&session_id)?))
}
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.engine.evict(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChartlyError::session_not_found(&session_id).into())
    }
}
