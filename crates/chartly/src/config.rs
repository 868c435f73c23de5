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

use crate::chart_matcher::RecommenderConfig;
use crate::data_profiler::ProfilingConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::image_analyzer::AnalyzerConfig;
use crate::session_store::SessionConfig;
use crate::spec_builder::RenderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const ENV_PREFIX: &str = "CHARTLY_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub profiling: ProfilingConfig,
    pub recommender: RecommenderConfig,
    pub sessions: SessionConfig,
    pub analyzer: AnalyzerConfig,
    pub render: RenderConfig,
}
impl EngineConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ConfigFileError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config/chartly.toml")
    }
    /// File (if given), then environment, then validation.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }
    /// Applies `CHARTLY_*` overrides read through `lookup`, which receives the
    /// full variable name.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        if let Some(v) = get("MAX_ROWS") {
            self.profiling.max_rows = parse_override("MAX_ROWS", &v)?;
        }
        if let Some(v) = get("SESSION_TTL_SECS") {
            self.sessions.ttl_secs = parse_override("SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = get("SWEEP_INTERVAL_SECS") {
            self.sessions.sweep_interval_secs = parse_override("SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("MAX_SESSIONS") {
            self.sessions.max_sessions = parse_override("MAX_SESSIONS", &v)?;
        }
        if let Some(v) = get("MAX_SUGGESTIONS") {
            self.recommender.max_suggestions = parse_override("MAX_SUGGESTIONS", &v)?;
        }
        if let Some(v) = get("ACCEPTABILITY_THRESHOLD") {
            self.recommender.acceptability_threshold =
                parse_override("ACCEPTABILITY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MIN_CONFIDENCE") {
            self.analyzer.min_confidence = parse_override("MIN_CONFIDENCE", &v)?;
        }
        if let Some(v) = get("CLASSIFIER_TIMEOUT_SECS") {
            self.analyzer.timeout_secs = parse_override("CLASSIFIER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CLASSIFIER_ENDPOINT") {
            let v = v.trim();
            self.analyzer.endpoint = (!v.is_empty()).then(|| v.to_string());
        }
        if let Some(v) = get("THEME") {
            self.render.theme = v;
        }
        debug!("Environment overrides applied");
        Ok(())
    }
    pub fn validate(&self) -> ConfigResult<()> {
        self.profiling.validate()?;
        self.recommender.validate()?;
        self.sessions.validate()?;
        self.analyzer.validate()?;
        self.render.validate()?;
        Ok(())
    }
}
fn parse_override<T: FromStr>(suffix: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            field: format!("{ENV_PREFIX}{suffix}"),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recommender.max_suggestions, 4);
        assert_eq!(config.render.theme, "dark");
        assert!(config.analyzer.endpoint.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [sessions]
            ttl_secs = 120

            [analyzer]
            min_confidence = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.sessions.ttl_secs, 120);
        assert_eq!(config.sessions.max_sessions, 1000);
        assert!((config.analyzer.min_confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.profiling.max_rows, 10_000);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config =
            EngineConfig::from_toml_str(include_str!("../../../config/chartly.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.analyzer.label_aliases.get("waterfall"),
            Some(&crate::chart_types::ChartType::Bar)
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[render]\ntheme = \"light\"").unwrap();
        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.render.theme, "light");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = EngineConfig::from_toml_file(Path::new("/nonexistent/chartly.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/chartly.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("CHARTLY_SESSION_TTL_SECS", "30"),
            ("CHARTLY_CLASSIFIER_ENDPOINT", "http://localhost:9000/classify"),
            ("CHARTLY_THEME", "light"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides_from(|key| vars.get(key).cloned())
            .unwrap();
        assert_eq!(config.sessions.ttl_secs, 30);
        assert_eq!(
            config.analyzer.endpoint.as_deref(),
            Some("http://localhost:9000/classify")
        );
        assert_eq!(config.render.theme, "light");
    }

    #[test]
    fn test_invalid_env_override_is_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides_from(|key| (key == "CHARTLY_MAX_SESSIONS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_out_of_range_threshold_fails_validation() {
        let mut config = EngineConfig::default();
        config.analyzer.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }
}
