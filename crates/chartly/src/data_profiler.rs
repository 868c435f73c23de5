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

use crate::chart_types::ColumnType;
use crate::error::{ChartlyError, ConfigError, ParseError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Row cap for statistics and for the rows kept to back chart specs.
    pub max_rows: usize,
    pub max_sample_values: usize,
    pub top_k_categories: usize,
    pub categorical_ratio_threshold: f64,
    pub max_categorical_cardinality: usize,
    pub preview_rows: usize,
    pub temporal_formats: Vec<String>,
    pub null_tokens: Vec<String>,
}
impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            max_sample_values: 5,
            top_k_categories: 10,
            categorical_ratio_threshold: 0.5,
            max_categorical_cardinality: 50,
            preview_rows: 20,
            temporal_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y/%m/%d".to_string(),
            ],
            null_tokens: vec![
                "".to_string(),
                "na".to_string(),
                "n/a".to_string(),
                "null".to_string(),
                "nan".to_string(),
                "none".to_string(),
            ],
        }
    }
}
impl ProfilingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rows == 0 {
            return Err(ConfigError::InvalidValue {
                field: "profiling.max_rows".to_string(),
                value: "0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.categorical_ratio_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "profiling.categorical_ratio_threshold".to_string(),
                value: self.categorical_ratio_threshold.to_string(),
            });
        }
        if self.temporal_formats.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "profiling.temporal_formats must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: ColumnType,
    pub cardinality: usize,
    pub null_count: usize,
    pub null_ratio: f64,
    pub sample_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_stats: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_stats: Option<TemporalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_categories: Option<Vec<CategoryFrequency>>,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub stddev: Option<f64>,
    pub monotonic_increasing: bool,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalStats {
    pub min: Option<String>,
    pub max: Option<String>,
    pub has_time_component: bool,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFrequency {
    pub value: String,
    pub count: usize,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub profiled_rows: usize,
    pub total_columns: usize,
    pub numeric_count: usize,
    pub categorical_count: usize,
    pub boolean_count: usize,
    pub datetime_count: usize,
    pub text_count: usize,
}
/// Profiled dataset together with the row-capped cells that back chart specs.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub columns: Vec<ColumnProfile>,
    pub row_count: usize,
    #[serde(skip)]
    rows: Vec<Vec<Option<String>>>,
    /// Leading rows kept for the preview regardless of the row cap.
    #[serde(skip)]
    head: Vec<Vec<Option<String>>>,
    #[serde(skip)]
    temporal_formats: Vec<String>,
}
impl DatasetProfile {
    pub fn profiled_rows(&self) -> usize {
        self.rows.len()
    }
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
    pub fn cells(&self, column: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(column).and_then(|c| c.as_deref()))
    }
    pub fn numeric_values(&self, column: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        self.cells(column).map(|c| c.and_then(parse_number))
    }
    pub fn datetime_value(&self, cell: &str) -> Option<DateTime<Utc>> {
        parse_datetime(cell, &self.temporal_formats)
    }
    pub fn summary(&self) -> DatasetSummary {
        let count = |t: ColumnType| self.columns.iter().filter(|c| c.dtype == t).count();
        DatasetSummary {
            row_count: self.row_count,
            profiled_rows: self.rows.len(),
            total_columns: self.columns.len(),
            numeric_count: count(ColumnType::Numeric),
            categorical_count: count(ColumnType::Categorical),
            boolean_count: count(ColumnType::Boolean),
            datetime_count: count(ColumnType::Datetime),
            text_count: count(ColumnType::Text),
        }
    }
    /// Natural-language schema description, one line per column.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "The dataset contains {} rows and {} columns.",
            self.row_count,
            self.columns.len()
        )];
        for column in &self.columns {
            lines.push(format!(
                "- Column '{}': type is {}. It has {} unique values. Examples: [{}].",
                column.name,
                column.dtype,
                column.cardinality,
                column
                    .sample_values
                    .iter()
                    .take(3)
                    .map(|v| format!("'{v}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        lines.join("\n")
    }
    /// First `limit` rows as JSON objects with typed values, up to the
    /// configured preview size.
    pub fn preview(&self, limit: usize) -> Vec<Map<String, Value>> {
        self.head
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| (column.name.clone(), typed_cell(column.dtype, cell)))
                    .collect()
            })
            .collect()
    }
}
fn typed_cell(dtype: ColumnType, cell: &Option<String>) -> Value {
    let Some(raw) = cell else {
        return Value::Null;
    };
    match dtype {
        ColumnType::Numeric => {
            if let Ok(int) = raw.parse::<i64>() {
                Value::from(int)
            } else {
                parse_number(raw)
                    .and_then(serde_json::Number::from_f64)
                    .map_or_else(|| Value::String(raw.clone()), Value::Number)
            }
        }
        ColumnType::Boolean => {
            parse_bool(raw).map_or_else(|| Value::String(raw.clone()), Value::Bool)
        }
        _ => Value::String(raw.clone()),
    }
}
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
pub fn parse_datetime(value: &str, formats: &[String]) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() || parse_number(value).is_some() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    formats.iter().find_map(|format| {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}
const BOOLEAN_VOCABULARY: [[&str; 2]; 3] = [["false", "true"], ["no", "yes"], ["0", "1"]];
pub struct DataProfiler {
    config: ProfilingConfig,
}
impl DataProfiler {
    pub fn new() -> Self {
        Self {
            config: ProfilingConfig::default(),
        }
    }
    pub fn with_config(config: ProfilingConfig) -> Self {
        Self { config }
    }
    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }
    pub fn check_file_name(file_name: &str) -> Result<(), ParseError> {
        if file_name.to_ascii_lowercase().ends_with(".csv") {
            Ok(())
        } else {
            Err(ParseError::UnsupportedFormat {
                file_name: file_name.to_string(),
            })
        }
    }
    pub fn profile_csv_bytes(&self, bytes: &[u8]) -> Result<DatasetProfile, ChartlyError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::EmptyInput.into());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(bytes);
        let headers: Vec<String> = reader
            .headers()
            .map_err(ParseError::from)?
            .iter()
            .map(str::to_string)
            .collect();
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(ParseError::from)?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        self.profile_records(headers, records)
    }
    pub fn profile_records(
        &self,
        headers: Vec<String>,
        records: Vec<Vec<String>>,
    ) -> Result<DatasetProfile, ChartlyError> {
        let headers = normalise_headers(headers)?;
        let width = headers.len();
        let mut rows = Vec::new();
        let mut head = Vec::new();
        let mut row_count = 0;
        for (idx, record) in records.into_iter().enumerate() {
            if record.len() != width {
                return Err(ParseError::RaggedRow {
                    line: idx + 2,
                    expected: width,
                    found: record.len(),
                }
                .into());
            }
            let cells: Vec<Option<String>> =
                record.into_iter().map(|c| self.normalise_cell(c)).collect();
            if cells.iter().all(Option::is_none) {
                continue;
            }
            row_count += 1;
            if head.len() < self.config.preview_rows {
                head.push(cells.clone());
            }
            if rows.len() < self.config.max_rows {
                rows.push(cells);
            }
        }
        let columns: Vec<ColumnProfile> = headers
            .par_iter()
            .enumerate()
            .map(|(idx, name)| {
                let values: Vec<Option<&str>> = rows
                    .iter()
                    .map(|row| row[idx].as_deref())
                    .collect();
                self.profile_column(name, &values)
            })
            .collect();
        debug!(
            columns = columns.len(),
            rows = row_count,
            profiled_rows = rows.len(),
            "Dataset profiled"
        );
        Ok(DatasetProfile {
            columns,
            row_count,
            rows,
            head,
            temporal_formats: self.config.temporal_formats.clone(),
        })
    }
    fn normalise_cell(&self, cell: String) -> Option<String> {
        let trimmed = cell.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if self.config.null_tokens.iter().any(|t| t.eq_ignore_ascii_case(&lowered)) {
            None
        } else if trimmed.len() == cell.len() {
            Some(cell)
        } else {
            Some(trimmed.to_string())
        }
    }
    fn profile_column(&self, name: &str, values: &[Option<&str>]) -> ColumnProfile {
        let total_rows = values.len();
        let non_null: Vec<&str> = values.iter().filter_map(|v| *v).collect();
        let null_count = total_rows - non_null.len();
        let null_ratio = if total_rows > 0 {
            null_count as f64 / total_rows as f64
        } else {
            0.0
        };
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = non_null
            .iter()
            .copied()
            .filter(|v| seen.insert(*v))
            .collect();
        let cardinality = distinct.len();
        let dtype = self.detect_column_type(&non_null, &distinct, total_rows);
        let sample_values = distinct
            .iter()
            .take(self.config.max_sample_values)
            .map(|v| (*v).to_string())
            .collect();
        let numeric_stats = matches!(dtype, ColumnType::Numeric)
            .then(|| calculate_numeric_stats(values));
        let temporal_stats = matches!(dtype, ColumnType::Datetime)
            .then(|| self.calculate_temporal_stats(&non_null));
        let top_categories = dtype
            .is_groupable()
            .then(|| self.top_categories(&non_null));
        ColumnProfile {
            name: name.to_string(),
            dtype,
            cardinality,
            null_count,
            null_ratio,
            sample_values,
            numeric_stats,
            temporal_stats,
            top_categories,
        }
    }
    fn detect_column_type(&self, non_null: &[&str], distinct: &[&str], total_rows: usize) -> ColumnType {
        if non_null.is_empty() {
            return ColumnType::Text;
        }
        if is_boolean_pair(distinct) {
            return ColumnType::Boolean;
        }
        if non_null
            .par_iter()
            .all(|v| parse_datetime(v, &self.config.temporal_formats).is_some())
        {
            return ColumnType::Datetime;
        }
        if non_null.iter().all(|v| parse_number(v).is_some()) {
            return ColumnType::Numeric;
        }
        let ratio = distinct.len() as f64 / total_rows as f64;
        if ratio <= self.config.categorical_ratio_threshold
            && distinct.len() <= self.config.max_categorical_cardinality
        {
            return ColumnType::Categorical;
        }
        if distinct.len() == 1 {
            return ColumnType::Categorical;
        }
        ColumnType::Text
    }
    fn calculate_temporal_stats(&self, non_null: &[&str]) -> TemporalStats {
        let mut parsed: Vec<DateTime<Utc>> = non_null
            .iter()
            .filter_map(|v| parse_datetime(v, &self.config.temporal_formats))
            .collect();
        parsed.sort();
        let has_time_component = parsed
            .iter()
            .any(|dt| dt.hour() != 0 || dt.minute() != 0 || dt.second() != 0);
        TemporalStats {
            min: parsed.first().map(|dt| dt.to_rfc3339()),
            max: parsed.last().map(|dt| dt.to_rfc3339()),
            has_time_component,
        }
    }
    fn top_categories(&self, non_null: &[&str]) -> Vec<CategoryFrequency> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, value) in non_null.iter().enumerate() {
            counts.entry(*value).or_insert((0, idx)).0 += 1;
        }
        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(value, (count, first))| (value, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(self.config.top_k_categories)
            .map(|(value, count, _)| CategoryFrequency {
                value: value.to_string(),
                count,
            })
            .collect()
    }
}
impl Default for DataProfiler {
    fn default() -> Self {
        Self::new()
    }
}
/// Two distinct values once case is ignored, forming a known true/false pair.
fn is_boolean_pair(distinct: &[&str]) -> bool {
    let mut lowered: Vec<String> = Vec::with_capacity(2);
    for value in distinct {
        let value = value.to_ascii_lowercase();
        if !lowered.contains(&value) {
            if lowered.len() == 2 {
                return false;
            }
            lowered.push(value);
        }
    }
    lowered.sort();
    lowered.len() == 2
        && BOOLEAN_VOCABULARY
            .iter()
            .any(|pair| lowered[0] == pair[0] && lowered[1] == pair[1])
}
fn normalise_headers(headers: Vec<String>) -> Result<Vec<String>, ParseError> {
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ParseError::NoColumns);
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());
    for (idx, header) in headers.into_iter().enumerate() {
        let name = match header.trim() {
            "" => format!("column_{}", idx + 1),
            trimmed => trimmed.to_string(),
        };
        if !seen.insert(name.clone()) {
            return Err(ParseError::DuplicateColumn { name });
        }
        out.push(name);
    }
    Ok(out)
}
pub(crate) fn calculate_numeric_stats(values: &[Option<&str>]) -> NumericStats {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.and_then(parse_number)).collect();
    if numbers.is_empty() {
        return NumericStats {
            min: None,
            max: None,
            mean: None,
            median: None,
            stddev: None,
            monotonic_increasing: false,
        };
    }
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;
    let stddev = if numbers.len() > 1 {
        let variance = numbers.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    } else {
        None
    };
    let monotonic_increasing =
        numbers.len() > 1 && numbers.windows(2).all(|pair| pair[1] >= pair[0]);
    let mut sorted = numbers.clone();
    sorted.sort_by(f64::total_cmp);
    NumericStats {
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        mean: Some(mean),
        median: quantile(&sorted, 0.5),
        stddev,
        monotonic_increasing,
    }
}
/// Linear-interpolation quantile over an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
impl std::fmt::Display for ColumnProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} distinct, {:.0}% null)",
            self.name,
            self.dtype,
            self.cardinality,
            self.null_ratio * 100.0
        )
    }
}
impl std::fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dataset: {} rows, {} columns ({} numeric, {} categorical, {} boolean, {} datetime, {} text)",
            self.row_count,
            self.total_columns,
            self.numeric_count,
            self.categorical_count,
            self.boolean_count,
            self.datetime_count,
            self.text_count
        )
    }
}
