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

use crate::chart_matcher::{ChartMatcher, RecommenderConfig, ResolvedAxes};
use crate::chart_types::{ChartType, ColumnType, LabelMapper};
use crate::classifier::{ChartClassifier, Classification};
use crate::data_profiler::{ColumnProfile, DatasetProfile};
use crate::error::{AnalysisErrorCode, ClassifierError, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub min_confidence: f64,
    pub timeout_secs: u64,
    pub endpoint: Option<String>,
    /// Extra classifier labels, normalised before lookup.
    pub label_aliases: HashMap<String, ChartType>,
}
impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            timeout_secs: 15,
            endpoint: None,
            label_aliases: HashMap::new(),
        }
    }
}
impl AnalyzerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.min_confidence".to_string(),
                value: self.min_confidence.to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "analyzer.endpoint".to_string(),
                    value: endpoint.clone(),
                });
            }
        }
        Ok(())
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}
impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}
pub fn sniff_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    match bytes {
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(ImageFormat::Webp),
        [b'B', b'M', ..] if bytes.len() >= 14 => Some(ImageFormat::Bmp),
        _ => None,
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnalysisResult {
    pub detected_chart_type: Option<ChartType>,
    pub raw_label: Option<String>,
    pub confidence: f64,
    pub is_compatible: bool,
    pub compatibility_reason: String,
    pub explanation: Option<String>,
    pub error_code: Option<AnalysisErrorCode>,
}
impl ChartAnalysisResult {
    fn failure(code: AnalysisErrorCode, reason: String) -> Self {
        Self {
            detected_chart_type: None,
            raw_label: None,
            confidence: 0.0,
            is_compatible: false,
            compatibility_reason: reason,
            explanation: None,
            error_code: Some(code),
        }
    }
}
#[derive(Debug, Clone, PartialEq)]
pub struct Compatibility {
    pub is_compatible: bool,
    pub is_recommended: bool,
    pub reason: String,
}
pub struct ImageAnalyzer {
    classifier: Arc<dyn ChartClassifier>,
    mapper: LabelMapper,
    config: AnalyzerConfig,
}
impl ImageAnalyzer {
    pub fn new(classifier: Arc<dyn ChartClassifier>, config: AnalyzerConfig) -> Self {
        let mapper = LabelMapper::with_aliases(&config.label_aliases);
        Self {
            classifier,
            mapper,
            config,
        }
    }
    pub fn classifier(&self) -> &Arc<dyn ChartClassifier> {
        &self.classifier
    }
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
    async fn classify(&self, image: &[u8], format: ImageFormat) -> Result<Classification, ClassifierError> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.classifier.classify(image, format.mime_type())).await {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout),
        }
    }
    /// Classifies a chart image and judges it against the dataset. Failures
    /// are reported through `error_code`, never as an `Err`.
    pub async fn analyze(
        &self,
        image: &[u8],
        profile: &DatasetProfile,
        recommender: &RecommenderConfig,
    ) -> ChartAnalysisResult {
        let Some(format) = sniff_image_format(image) else {
            debug!(bytes = image.len(), "Rejected upload that is not a supported image");
            return ChartAnalysisResult::failure(
                AnalysisErrorCode::InvalidImage,
                "The uploaded file is not a supported image (PNG, JPEG, GIF, WebP or BMP)."
                    .to_string(),
            );
        };
        let start = Instant::now();
        let classification = match self.classify(image, format).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    classifier = self.classifier.name(),
                    timeout = e.is_timeout(),
                    "Chart classification failed: {}",
                    e
                );
                return ChartAnalysisResult::failure(
                    AnalysisErrorCode::ClassifierUnavailable,
                    format!("The chart classifier is unavailable: {e}."),
                );
            }
        };
        info!(
            label = %classification.label,
            confidence = classification.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chart image classified"
        );
        let Some(chart_type) = self.mapper.map(&classification.label) else {
            return ChartAnalysisResult {
                detected_chart_type: None,
                raw_label: Some(classification.label.clone()),
                confidence: classification.confidence,
                is_compatible: false,
                compatibility_reason: format!(
                    "The classifier label '{}' does not match a supported chart type.",
                    classification.label
                ),
                explanation: None,
                error_code: Some(AnalysisErrorCode::UnrecognizedChart),
            };
        };
        if classification.confidence < self.config.min_confidence {
            return ChartAnalysisResult {
                detected_chart_type: Some(chart_type),
                raw_label: Some(classification.label),
                confidence: classification.confidence,
                is_compatible: false,
                compatibility_reason: format!(
                    "The image looks like a {}, but confidence {:.2} is below the minimum of {:.2}.",
                    chart_type.display_name(),
                    classification.confidence,
                    self.config.min_confidence
                ),
                explanation: Some(chart_type.describe().to_string()),
                error_code: Some(AnalysisErrorCode::LowConfidence),
            };
        }
        let verdict = assess_compatibility(profile, recommender, chart_type);
        ChartAnalysisResult {
            detected_chart_type: Some(chart_type),
            raw_label: Some(classification.label),
            confidence: classification.confidence,
            is_compatible: verdict.is_compatible,
            compatibility_reason: verdict.reason,
            explanation: Some(chart_type.describe().to_string()),
            error_code: None,
        }
    }
}
/// Scores a chart type over every usable column placement in the dataset.
pub fn assess_compatibility(
    profile: &DatasetProfile,
    recommender: &RecommenderConfig,
    chart_type: ChartType,
) -> Compatibility {
    let matcher = ChartMatcher::new(profile, recommender);
    let plural = format!("{}s", chart_type.display_name());
    match matcher.best_fit(chart_type) {
        Some(fit) if matcher.is_acceptable(fit.score) => {
            let top = matcher
                .suggest(None, None)
                .ok()
                .and_then(|s| s.into_iter().find(|s| s.recommended))
                .map(|s| s.chart_type);
            let is_recommended = top == Some(chart_type);
            let ranking = match top {
                _ if is_recommended => {
                    " It is also the recommended chart for this dataset.".to_string()
                }
                Some(other) => format!(
                    " It is compatible but not the recommended chart; a {} ranks higher.",
                    other.display_name()
                ),
                None => String::new(),
            };
            Compatibility {
                is_compatible: true,
                is_recommended,
                reason: format!(
                    "This dataset supports {plural} using {}.{ranking}",
                    describe_axes(&fit.axes)
                ),
            }
        }
        _ => Compatibility {
            is_compatible: false,
            is_recommended: false,
            reason: format!(
                "{} require {}; {}.",
                capitalise(&plural),
                matcher.requirement(chart_type),
                describe_relevant_columns(profile, chart_type)
            ),
        },
    }
}
fn describe_column(column: &ColumnProfile) -> String {
    format!(
        "{} column '{}' ({} distinct values)",
        column.dtype, column.name, column.cardinality
    )
}
fn describe_axes(axes: &ResolvedAxes<'_>) -> String {
    match axes.y {
        Some(y) => format!("{} with {}", describe_column(axes.x), describe_column(y)),
        None => describe_column(axes.x),
    }
}
fn describe_relevant_columns(profile: &DatasetProfile, chart_type: ChartType) -> String {
    let relevant: fn(&ColumnType) -> bool = match chart_type {
        ChartType::Bar | ChartType::Pie | ChartType::Heatmap => ColumnType::is_groupable,
        ChartType::Histogram | ChartType::Box | ChartType::Scatter => ColumnType::is_numeric,
        ChartType::Line | ChartType::Area => |t: &ColumnType| t.is_temporal() || t.is_numeric(),
    };
    let columns: Vec<String> = profile
        .columns
        .iter()
        .filter(|c| relevant(&c.dtype))
        .map(|c| {
            format!(
                "{} column '{}' has {} distinct values",
                c.dtype, c.name, c.cardinality
            )
        })
        .collect();
    if columns.is_empty() {
        let summary = profile.summary();
        return format!(
            "this dataset has {} numeric, {} categorical, {} boolean, {} datetime and {} text columns",
            summary.numeric_count,
            summary.categorical_count,
            summary.boolean_count,
            summary.datetime_count,
            summary.text_count
        );
    }
    let shown = columns.len().min(5);
    let mut text = format!("this dataset's {}", columns[..shown].join(", "));
    if columns.len() > shown {
        text.push_str(&format!(" and {} more", columns.len() - shown));
    }
    text
}
fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
