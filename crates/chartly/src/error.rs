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

use serde::{Deserialize, Serialize};
use thiserror::Error;
#[derive(Error, Debug)]
pub enum ChartlyError {
    #[error("Failed to parse upload: {0}")]
    Parse(#[from] ParseError),
    #[error("Session '{session_id}' not found")]
    SessionNotFound { session_id: String },
    #[error("Chart type '{chart_type}' cannot be rendered: {reason}")]
    UnsupportedChartType { chart_type: String, reason: String },
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Internal engine error: {0}")]
    Internal(String),
}
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Uploaded file is empty")]
    EmptyInput,
    #[error("No columns found in header")]
    NoColumns,
    #[error("Duplicate column name found: '{name}'")]
    DuplicateColumn { name: String },
    #[error("Unsupported file format for '{file_name}': only CSV files are accepted")]
    UnsupportedFormat { file_name: String },
    #[error("Row {line} has {found} fields, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Malformed CSV: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },
}
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {source}")]
    TomlParseError {
        #[from]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {field} = {value}")]
    InvalidValue { field: String, value: String },
    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}
#[derive(Error, Debug, Clone)]
pub enum ClassifierError {
    #[error("Classifier is not configured")]
    NotConfigured,
    #[error("Classifier request timed out")]
    Timeout,
    #[error("Classifier network error: {0}")]
    Network(String),
    #[error("Classifier returned an error: {0}")]
    Provider(String),
    #[error("Classifier response could not be parsed: {0}")]
    InvalidResponse(String),
}
pub type Result<T> = std::result::Result<T, ChartlyError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;

/// Failure codes embedded in an image analysis result. These never abort
/// the request; the result itself carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisErrorCode {
    LowConfidence,
    UnrecognizedChart,
    ClassifierUnavailable,
    InvalidImage,
}
impl AnalysisErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisErrorCode::LowConfidence => "LOW_CONFIDENCE",
            AnalysisErrorCode::UnrecognizedChart => "UNRECOGNIZED_CHART",
            AnalysisErrorCode::ClassifierUnavailable => "CLASSIFIER_UNAVAILABLE",
            AnalysisErrorCode::InvalidImage => "INVALID_IMAGE",
        }
    }
}
impl std::fmt::Display for AnalysisErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl ChartlyError {
    pub fn session_not_found(session_id: &str) -> Self {
        ChartlyError::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }
    pub fn unsupported_chart(chart_type: impl Into<String>, reason: impl Into<String>) -> Self {
        ChartlyError::UnsupportedChartType {
            chart_type: chart_type.into(),
            reason: reason.into(),
        }
    }
    pub fn code(&self) -> &'static str {
        match self {
            ChartlyError::Parse(_) => "PARSE_ERROR",
            ChartlyError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            ChartlyError::UnsupportedChartType { .. } => "UNSUPPORTED_CHART_TYPE",
            ChartlyError::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            ChartlyError::Config(_) => "CONFIG_ERROR",
            ChartlyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChartlyError::Parse(_)
                | ChartlyError::SessionNotFound { .. }
                | ChartlyError::UnsupportedChartType { .. }
                | ChartlyError::ColumnNotFound { .. }
        )
    }
    pub fn user_message(&self) -> String {
        match self {
            ChartlyError::SessionNotFound { .. } => {
                "Session not found. It may have expired; please upload the dataset again."
                    .to_string()
            }
            ChartlyError::Parse(ParseError::NoColumns | ParseError::EmptyInput) => {
                "The uploaded file has no columns. Please provide a CSV with a header row."
                    .to_string()
            }
            ChartlyError::Internal(_) => "Unexpected server error.".to_string(),
            _ => self.to_string(),
        }
    }
}
impl ClassifierError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClassifierError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            ChartlyError::session_not_found("abc").code(),
            "SESSION_NOT_FOUND"
        );
        assert_eq!(
            ChartlyError::unsupported_chart("pie", "no categories").code(),
            "UNSUPPORTED_CHART_TYPE"
        );
        assert_eq!(
            ChartlyError::from(ParseError::NoColumns).code(),
            "PARSE_ERROR"
        );
        assert_eq!(ChartlyError::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ChartlyError::session_not_found("abc").is_client_error());
        assert!(!ChartlyError::Internal("boom".into()).is_client_error());
        assert!(!ChartlyError::Config(ConfigError::ValidationFailed {
            reason: "bad".into()
        })
        .is_client_error());
    }

    #[test]
    fn test_analysis_error_code_serialises_screaming_snake() {
        let json = serde_json::to_string(&AnalysisErrorCode::ClassifierUnavailable).unwrap();
        assert_eq!(json, "\"CLASSIFIER_UNAVAILABLE\"");
        assert_eq!(AnalysisErrorCode::LowConfidence.to_string(), "LOW_CONFIDENCE");
    }
}
