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

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chartly::classifier::Classification;
use chartly::error::ClassifierResult;
use chartly::{ChartClassifier, ChartlyEngine, EngineConfig};
use chartly_server::{build_router, AppState, ServerOptions};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

const BOUNDARY: &str = "----ChartlyTestBoundary";
const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

struct PieClassifier;

#[async_trait::async_trait]
impl ChartClassifier for PieClassifier {
    async fn classify(&self, _image: &[u8], _mime_type: &str) -> ClassifierResult<Classification> {
        Ok(Classification {
            label: "pie chart".to_string(),
            confidence: 0.88,
        })
    }
    fn name(&self) -> &str {
        "pie"
    }
}

fn app() -> Router {
    let engine = ChartlyEngine::new(EngineConfig::default(), Arc::new(PieClassifier)).unwrap();
    build_router(AppState::new(engine), &ServerOptions::default())
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart(parts)))
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn sales_csv() -> Vec<u8> {
    let regions = ["north", "south", "east"];
    let mut csv = String::from("date,revenue,region\n");
    for i in 0..30 {
        csv.push_str(&format!(
            "2024-05-{:02},{},{}\n",
            i + 1,
            50 + (i * 7) % 40,
            regions[i % 3]
        ));
    }
    csv.into_bytes()
}

async fn upload(app: &Router) -> String {
    let csv = sales_csv();
    let (status, body) = send(
        app,
        multipart_request("/api/upload-csv", &[Part::File("file", "sales.csv", &csv)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn upload_returns_columns_and_preview() {
    let app = app();
    let csv = sales_csv();
    let (status, body) = send(
        &app,
        multipart_request("/api/upload-csv", &[Part::File("file", "sales.csv", &csv)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());
    assert_eq!(body["columns"].as_array().unwrap().len(), 3);
    assert_eq!(body["columns"][2]["dtype"], "categorical");
    assert_eq!(body["preview"].as_array().unwrap().len(), 20);
    assert_eq!(body["preview"][0]["revenue"], json!(50));
}

#[tokio::test]
async fn upload_rejects_non_csv() {
    let app = app();
    let (status, body) = send(
        &app,
        multipart_request("/api/upload-csv", &[Part::File("file", "sales.xlsx", b"PK\x03\x04")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PARSE_ERROR");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app,
        multipart_request("/api/upload-csv", &[Part::Text("note", "hello")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn suggest_and_render_round_trip() {
    let app = app();
    let session_id = upload(&app).await;
    let (status, body) = send(
        &app,
        json_request("/api/suggest-charts", json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let suggestions = body["suggestions"].as_array().unwrap();
    assert_eq!(suggestions[0]["chart_type"], "bar");
    assert_eq!(suggestions[0]["recommended"], true);

    for suggestion in suggestions {
        let (status, body) = send(
            &app,
            json_request(
                "/api/render-chart",
                json!({
                    "session_id": session_id,
                    "chart_type": suggestion["chart_type"],
                    "x": suggestion["x"],
                    "y": suggestion["y"],
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["chart_type"], suggestion["chart_type"]);
        assert_eq!(body["spec"]["layout"]["theme"], "dark");
    }
}

#[tokio::test]
async fn incompatible_render_is_unprocessable() {
    let app = app();
    let session_id = upload(&app).await;
    let (status, body) = send(
        &app,
        json_request(
            "/api/render-chart",
            json!({ "session_id": session_id, "chart_type": "heatmap" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "UNSUPPORTED_CHART_TYPE");
}

#[tokio::test]
async fn unknown_column_is_bad_request() {
    let app = app();
    let session_id = upload(&app).await;
    let (status, body) = send(
        &app,
        json_request(
            "/api/suggest-charts",
            json!({ "session_id": session_id, "x": "profit" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "COLUMN_NOT_FOUND");
}

#[tokio::test]
async fn malformed_bodies_use_the_error_envelope() {
    let app = app();
    let requests = vec![
        json_request("/api/suggest-charts", json!({})),
        Request::builder()
            .method("POST")
            .uri("/api/render-chart")
            .header("content-type", "application/json")
            .body(Body::from("{\"session_id\": "))
            .unwrap(),
        Request::builder()
            .method("POST")
            .uri("/api/suggest-charts")
            .body(Body::from("session_id=abc"))
            .unwrap(),
        json_request("/api/upload-csv", json!({ "file": "a,b" })),
    ];
    for request in requests {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert!(body["message"].is_string());
        assert!(body["request_id"].is_string());
    }
}

#[tokio::test]
async fn missing_session_is_404_on_every_route() {
    let app = app();
    let requests = vec![
        json_request("/api/suggest-charts", json!({ "session_id": "gone" })),
        json_request(
            "/api/render-chart",
            json!({ "session_id": "gone", "chart_type": "bar" }),
        ),
        multipart_request(
            "/api/analyze-chart-image",
            &[
                Part::Text("session_id", "gone"),
                Part::File("file", "chart.png", PNG_HEADER),
            ],
        ),
        Request::builder()
            .uri("/api/sessions/gone")
            .body(Body::empty())
            .unwrap(),
        Request::builder()
            .method("DELETE")
            .uri("/api/sessions/gone")
            .body(Body::empty())
            .unwrap(),
    ];
    for request in requests {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }
}

#[tokio::test]
async fn analyze_image_reports_incompatibility_with_200() {
    let app = app();
    let mut csv = String::from("city,visitors\n");
    for i in 0..100 {
        csv.push_str(&format!("c{},{}\n", i % 40, i * 11));
    }
    let (_, body) = send(
        &app,
        multipart_request(
            "/api/upload-csv",
            &[Part::File("file", "cities.csv", csv.as_bytes())],
        ),
    )
    .await;
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        multipart_request(
            "/api/analyze-chart-image",
            &[
                Part::Text("session_id", &session_id),
                Part::File("file", "chart.png", PNG_HEADER),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detected_chart_type"], "pie");
    assert_eq!(body["is_compatible"], false);
    assert_eq!(body["error_code"], Value::Null);

    let (status, body) = send(
        &app,
        multipart_request(
            "/api/analyze-chart-image",
            &[
                Part::Text("session_id", &session_id),
                Part::File("file", "notes.txt", b"plain text"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_code"], "INVALID_IMAGE");
}

#[tokio::test]
async fn session_lifecycle_and_health() {
    let app = app();
    let session_id = upload(&app).await;

    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/api/sessions/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["row_count"], 30);
    assert_eq!(body["summary"]["datetime_count"], 1);
    assert!(body["expires_at"].is_string());

    let (_, health) = send(
        &app,
        Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["session_ttl_secs"], 3600);
    assert_eq!(health["classifier_configured"], true);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/sessions/{session_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        json_request("/api/suggest-charts", json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn root_reports_liveness() {
    let (status, body) = send(
        &app(),
        Request::builder().uri("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}
