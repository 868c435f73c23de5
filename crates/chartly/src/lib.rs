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

pub mod chart_matcher;
pub mod chart_types;
pub mod classifier;
pub mod config;
pub mod contracts;
pub mod data_profiler;
pub mod error;
pub mod image_analyzer;
pub mod session_store;
pub mod spec_builder;

pub use chart_matcher::{suggest_charts, ChartMatcher, ChartSuggestion, RecommenderConfig};
pub use chart_types::{ChartType, ColumnType, LabelMapper};
pub use classifier::{ChartClassifier, Classification, HttpChartClassifier, UnconfiguredClassifier};
pub use config::EngineConfig;
pub use contracts::{
    RenderRequest, RenderResponse, SessionInfo, SuggestRequest, SuggestionsResponse, UploadResponse,
};
pub use data_profiler::{ColumnProfile, DataProfiler, DatasetProfile, DatasetSummary, ProfilingConfig};
pub use error::{
    AnalysisErrorCode, ChartlyError, ClassifierError, ConfigError, ParseError, Result,
};
pub use image_analyzer::{AnalyzerConfig, ChartAnalysisResult, ImageAnalyzer};
pub use session_store::{Session, SessionConfig, SessionStore};
pub use spec_builder::{ChartData, ChartSpec, RenderConfig, SpecBuilder};

use std::sync::Arc;
use tracing::{debug, info};

/// Session-scoped analysis engine behind the HTTP surface.
pub struct ChartlyEngine {
    config: EngineConfig,
    profiler: DataProfiler,
    sessions: SessionStore,
    analyzer: ImageAnalyzer,
}
impl ChartlyEngine {
    pub fn new(config: EngineConfig, classifier: Arc<dyn ChartClassifier>) -> Result<Self> {
        config.validate()?;
        let profiler = DataProfiler::with_config(config.profiling.clone());
        let sessions = SessionStore::new(&config.sessions);
        let analyzer = ImageAnalyzer::new(classifier, config.analyzer.clone());
        Ok(Self {
            config,
            profiler,
            sessions,
            analyzer,
        })
    }
    /// Uses the HTTP classifier when an endpoint is configured.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let classifier: Arc<dyn ChartClassifier> = match &config.analyzer.endpoint {
            Some(endpoint) => Arc::new(
                HttpChartClassifier::from_env(endpoint.clone(), config.analyzer.timeout())
                    .map_err(|e| ConfigError::ValidationFailed {
                        reason: format!("classifier could not be created: {e}"),
                    })?,
            ),
            None => Arc::new(UnconfiguredClassifier),
        };
        info!(classifier = classifier.name(), "Chart classifier selected");
        Self::new(config, classifier)
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
    pub fn classifier_configured(&self) -> bool {
        self.analyzer.classifier().is_configured()
    }
    pub fn upload_csv(&self, file_name: Option<&str>, bytes: &[u8]) -> Result<UploadResponse> {
        if let Some(name) = file_name {
            DataProfiler::check_file_name(name)?;
        }
        let profile = self.profiler.profile_csv_bytes(bytes)?;
        let preview = profile.preview(self.config.profiling.preview_rows);
        let session = self
            .sessions
            .insert(profile, file_name.map(str::to_string));
        Ok(UploadResponse {
            session_id: session.id.clone(),
            columns: session.profile.columns.clone(),
            preview,
        })
    }
    pub fn suggest(&self, request: &SuggestRequest) -> Result<SuggestionsResponse> {
        let session = self.sessions.get(&request.session_id)?;
        let suggestions = ChartMatcher::new(&session.profile, &self.config.recommender)
            .suggest(request.x.as_deref(), request.y.as_deref())?;
        debug!(
            session_id = %session.id,
            count = suggestions.len(),
            "Suggestions computed"
        );
        Ok(SuggestionsResponse { suggestions })
    }
    pub fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        let session = self.sessions.get(&request.session_id)?;
        let spec = SpecBuilder::new(
            &session.profile,
            &self.config.recommender,
            &self.config.render,
        )
        .build_named(&request.chart_type, request.x.as_deref(), request.y.as_deref())?;
        Ok(RenderResponse {
            chart_type: spec.chart_type,
            spec,
        })
    }
    /// The session is resolved before the classifier is ever called.
    pub async fn analyze_image(&self, session_id: &str, image: &[u8]) -> Result<ChartAnalysisResult> {
        let session = self.sessions.get(session_id)?;
        let result = self
            .analyzer
            .analyze(image, &session.profile, &self.config.recommender)
            .await;
        info!(
            session_id,
            detected = result.detected_chart_type.map_or("none", |c| c.as_str()),
            compatible = result.is_compatible,
            error_code = result.error_code.map_or("none", |c| c.as_str()),
            "Chart image analysed"
        );
        Ok(result)
    }
    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.sessions.get(session_id)?;
        Ok(SessionInfo {
            session_id: session.id.clone(),
            file_name: session.file_name.clone(),
            row_count: session.profile.row_count,
            columns: session.profile.columns.clone(),
            summary: session.profile.summary(),
            description: session.profile.describe(),
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }
    pub fn evict(&self, session_id: &str) -> bool {
        self.sessions.evict(session_id)
    }
    pub fn sweep_expired(&self) -> usize {
        self.sessions.sweep_expired()
    }
}
