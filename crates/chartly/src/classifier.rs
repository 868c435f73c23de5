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

use crate::error::{ClassifierError, ClassifierResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const API_KEY_ENV: &str = "CHARTLY_CLASSIFIER_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}
/// Vision capability that names the chart type shown in an image.
#[async_trait]
pub trait ChartClassifier: Send + Sync {
    async fn classify(&self, image: &[u8], mime_type: &str) -> ClassifierResult<Classification>;
    fn name(&self) -> &str;
    fn is_configured(&self) -> bool {
        true
    }
}
#[derive(Debug, Clone)]
pub struct HttpChartClassifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}
impl HttpChartClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> ClassifierResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
        })
    }
    /// Reads the bearer token from `CHARTLY_CLASSIFIER_API_KEY`.
    pub fn from_env(endpoint: impl Into<String>, timeout: Duration) -> ClassifierResult<Self> {
        Self::new(endpoint, std::env::var(API_KEY_ENV).ok(), timeout)
    }
    fn build_payload(image: &[u8], mime_type: &str) -> Value {
        json!({
            "image": STANDARD.encode(image),
            "mime_type": mime_type,
        })
    }
}
pub fn parse_classification(data: &Value) -> ClassifierResult<Classification> {
    let label = data["label"]
        .as_str()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ClassifierError::InvalidResponse("missing 'label' field".to_string()))?;
    let confidence = data["confidence"]
        .as_f64()
        .filter(|c| c.is_finite())
        .ok_or_else(|| {
            ClassifierError::InvalidResponse("missing or non-numeric 'confidence' field".to_string())
        })?;
    Ok(Classification {
        label: label.to_string(),
        confidence: confidence.clamp(0.0, 1.0),
    })
}
#[async_trait]
impl ChartClassifier for HttpChartClassifier {
    async fn classify(&self, image: &[u8], mime_type: &str) -> ClassifierResult<Classification> {
        debug!(
            endpoint = %self.endpoint,
            bytes = image.len(),
            mime_type,
            "Sending image to chart classifier"
        );
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&Self::build_payload(image, mime_type));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) if e.is_timeout() => return Err(ClassifierError::Timeout),
            Ok(Err(e)) => return Err(ClassifierError::Network(format!("Request failed: {e}"))),
            Err(_) => {
                warn!("Chart classifier timed out after {:?}", self.timeout);
                return Err(ClassifierError::Timeout);
            }
        };
        let status = response.status();
        info!("Received response from chart classifier: {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Provider(format!(
                "Classifier error {status}: {body}"
            )));
        }
        let data = response
            .json::<Value>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(format!("Failed to parse JSON response: {e}")))?;
        parse_classification(&data)
    }
    fn name(&self) -> &str {
        "http"
    }
}
/// Stand-in used when no classifier endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredClassifier;
#[async_trait]
impl ChartClassifier for UnconfiguredClassifier {
    async fn classify(&self, _image: &[u8], _mime_type: &str) -> ClassifierResult<Classification> {
        Err(ClassifierError::NotConfigured)
    }
    fn name(&self) -> &str {
        "unconfigured"
    }
    fn is_configured(&self) -> bool {
        false
    }
}
