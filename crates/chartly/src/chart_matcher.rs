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

use crate::chart_types::{ChartType, ColumnType};
use crate::data_profiler::{ColumnProfile, DatasetProfile};
use crate::error::{ChartlyError, ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub max_suggestions: usize,
    pub pie_max_categories: usize,
    /// Categorical columns at or below this cardinality are preferred as the
    /// grouping axis during auto-selection.
    pub preferred_group_cardinality: usize,
    /// Minimum score for a chart type to count as compatible with a pair.
    pub acceptability_threshold: f64,
}
impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 4,
            pie_max_categories: 8,
            preferred_group_cardinality: 12,
            acceptability_threshold: 0.5,
        }
    }
}
impl RecommenderConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptability_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "recommender.acceptability_threshold".to_string(),
                value: self.acceptability_threshold.to_string(),
            });
        }
        if self.max_suggestions == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "recommender.max_suggestions must be greater than 0".to_string(),
            });
        }
        if self.pie_max_categories < 2 {
            return Err(ConfigError::InvalidValue {
                field: "recommender.pie_max_categories".to_string(),
                value: self.pie_max_categories.to_string(),
            });
        }
        Ok(())
    }
}
pub mod scoring_weights {
    pub const SCATTER_NUMERIC_PAIR: f64 = 0.85;
    pub const LINE_NUMERIC_PAIR: f64 = 0.70;
    pub const LINE_MONOTONIC_X: f64 = 0.90;
    pub const LINE_TEMPORAL_X: f64 = 0.95;
    pub const AREA_TEMPORAL_X: f64 = 0.75;
    pub const SCATTER_TEMPORAL_X: f64 = 0.60;
    pub const BAR_GROUPED: f64 = 0.90;
    pub const BOX_GROUPED: f64 = 0.65;
    pub const PIE_GROUPED: f64 = 0.60;
    pub const HISTOGRAM_SINGLE: f64 = 0.90;
    pub const BOX_SINGLE: f64 = 0.55;
    pub const BAR_COUNTS: f64 = 0.80;
    pub const PIE_COUNTS: f64 = 0.60;
    pub const HEATMAP_CROSS_TAB: f64 = 0.85;
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSuggestion {
    pub chart_type: ChartType,
    pub reason: String,
    pub recommended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub chart_type: ChartType,
    pub score: f64,
    pub reason: String,
}
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAxes<'a> {
    pub x: &'a ColumnProfile,
    pub y: Option<&'a ColumnProfile>,
}
impl ResolvedAxes<'_> {
    pub fn x_name(&self) -> &str {
        &self.x.name
    }
    pub fn y_name(&self) -> Option<&str> {
        self.y.map(|c| c.name.as_str())
    }
}
/// Best placement of a chart type anywhere in a dataset.
#[derive(Debug, Clone)]
pub struct ChartFit<'a> {
    pub chart_type: ChartType,
    pub score: f64,
    pub axes: ResolvedAxes<'a>,
}
pub struct ChartMatcher<'a> {
    profile: &'a DatasetProfile,
    config: &'a RecommenderConfig,
}
impl<'a> ChartMatcher<'a> {
    pub fn new(profile: &'a DatasetProfile, config: &'a RecommenderConfig) -> Self {
        Self { profile, config }
    }
    pub fn config(&self) -> &RecommenderConfig {
        self.config
    }
    fn lookup(&self, name: &str) -> Result<&'a ColumnProfile> {
        self.profile
            .column(name)
            .ok_or_else(|| ChartlyError::ColumnNotFound {
                column: name.to_string(),
            })
    }
    /// Resolves the pinned axes, filling unpinned ones deterministically from
    /// declared column order. `None` means nothing in the dataset can be charted.
    pub fn resolve_axes(
        &self,
        x: Option<&str>,
        y: Option<&str>,
    ) -> Result<Option<ResolvedAxes<'a>>> {
        let x = x.filter(|s| !s.trim().is_empty());
        let y = y.filter(|s| !s.trim().is_empty());
        match (x, y) {
            (Some(x), Some(y)) => Ok(Some(ResolvedAxes {
                x: self.lookup(x)?,
                y: Some(self.lookup(y)?),
            })),
            (Some(x), None) => {
                let pinned = self.lookup(x)?;
                let partner = self
                    .profile
                    .columns
                    .iter()
                    .filter(|c| c.name != pinned.name)
                    .find(|c| !self.score_pair(pinned, Some(c)).is_empty());
                Ok(Some(ResolvedAxes {
                    x: pinned,
                    y: partner,
                }))
            }
            (None, Some(y)) => {
                let pinned = self.lookup(y)?;
                let partner = self
                    .profile
                    .columns
                    .iter()
                    .filter(|c| c.name != pinned.name)
                    .find(|c| !self.score_pair(c, Some(pinned)).is_empty());
                Ok(Some(match partner {
                    Some(x) => ResolvedAxes {
                        x,
                        y: Some(pinned),
                    },
                    None => ResolvedAxes { x: pinned, y: None },
                }))
            }
            (None, None) => Ok(self.auto_select()),
        }
    }
    fn auto_select(&self) -> Option<ResolvedAxes<'a>> {
        let columns = &self.profile.columns;
        let numeric: Vec<&'a ColumnProfile> =
            columns.iter().filter(|c| c.dtype.is_numeric()).collect();
        let groupable: Vec<&'a ColumnProfile> =
            columns.iter().filter(|c| c.dtype.is_groupable()).collect();
        let temporal = columns.iter().find(|c| c.dtype.is_temporal());
        if let Some(first_numeric) = numeric.first().copied() {
            if let Some(group) = groupable
                .iter()
                .find(|c| c.cardinality <= self.config.preferred_group_cardinality)
            {
                return Some(ResolvedAxes {
                    x: group,
                    y: Some(first_numeric),
                });
            }
            if let Some(time) = temporal {
                return Some(ResolvedAxes {
                    x: time,
                    y: Some(first_numeric),
                });
            }
            if let Some(group) = groupable.first() {
                return Some(ResolvedAxes {
                    x: group,
                    y: Some(first_numeric),
                });
            }
            if numeric.len() >= 2 {
                let mut by_cardinality = numeric.clone();
                by_cardinality.sort_by(|a, b| b.cardinality.cmp(&a.cardinality));
                let (a, b) = (by_cardinality[0], by_cardinality[1]);
                let a_first = self.profile.column_index(&a.name) < self.profile.column_index(&b.name);
                let (x, y) = if a_first { (a, b) } else { (b, a) };
                return Some(ResolvedAxes { x, y: Some(y) });
            }
            return Some(ResolvedAxes {
                x: first_numeric,
                y: None,
            });
        }
        match groupable.as_slice() {
            [first, second, ..] => Some(ResolvedAxes {
                x: first,
                y: Some(second),
            }),
            [only] => Some(ResolvedAxes { x: only, y: None }),
            [] => None,
        }
    }
    /// Every applicable chart type for a column combination, unsorted.
    pub fn score_pair(
        &self,
        x: &ColumnProfile,
        y: Option<&ColumnProfile>,
    ) -> Vec<ScoredCandidate> {
        use scoring_weights::*;
        let mut out = Vec::new();
        let mut push = |chart_type: ChartType, score: f64, reason: String| {
            out.push(ScoredCandidate {
                chart_type,
                score,
                reason,
            });
        };
        let Some(y) = y else {
            match x.dtype {
                ColumnType::Numeric => {
                    push(
                        ChartType::Histogram,
                        HISTOGRAM_SINGLE,
                        format!("Shows how the values of '{}' are distributed.", x.name),
                    );
                    push(
                        ChartType::Box,
                        BOX_SINGLE,
                        format!("Summarises the spread and outliers of '{}'.", x.name),
                    );
                }
                t if t.is_groupable() => {
                    push(
                        ChartType::Bar,
                        BAR_COUNTS,
                        format!(
                            "Counts rows in each of the {} categories of '{}'.",
                            x.cardinality, x.name
                        ),
                    );
                    if x.cardinality <= self.config.pie_max_categories {
                        push(
                            ChartType::Pie,
                            PIE_COUNTS,
                            format!("Shows each category's share of '{}'.", x.name),
                        );
                    }
                }
                _ => {}
            }
            return out;
        };
        match (x.dtype, y.dtype) {
            (ColumnType::Numeric, ColumnType::Numeric) => {
                push(
                    ChartType::Scatter,
                    SCATTER_NUMERIC_PAIR,
                    format!("Shows the correlation between '{}' and '{}'.", x.name, y.name),
                );
                let monotonic = x
                    .numeric_stats
                    .as_ref()
                    .is_some_and(|s| s.monotonic_increasing);
                if monotonic {
                    push(
                        ChartType::Line,
                        LINE_MONOTONIC_X,
                        format!(
                            "'{}' increases steadily, so a line traces the trend of '{}' along it.",
                            x.name, y.name
                        ),
                    );
                } else {
                    push(
                        ChartType::Line,
                        LINE_NUMERIC_PAIR,
                        format!("Tracks the trend of '{}' across '{}'.", y.name, x.name),
                    );
                }
            }
            (a, b) if pair_is(a, b, ColumnType::is_temporal, ColumnType::is_numeric) => {
                let (time, value) = if a.is_temporal() { (x, y) } else { (y, x) };
                push(
                    ChartType::Line,
                    LINE_TEMPORAL_X,
                    format!("Time series of '{}' over '{}'.", value.name, time.name),
                );
                push(
                    ChartType::Area,
                    AREA_TEMPORAL_X,
                    format!("Emphasises the volume of '{}' over time.", value.name),
                );
                push(
                    ChartType::Scatter,
                    SCATTER_TEMPORAL_X,
                    format!("Plots individual '{}' observations in time.", value.name),
                );
            }
            (a, b) if pair_is(a, b, ColumnType::is_groupable, ColumnType::is_numeric) => {
                let (group, value) = if a.is_groupable() { (x, y) } else { (y, x) };
                push(
                    ChartType::Bar,
                    BAR_GROUPED,
                    format!(
                        "Compares total '{}' across the {} categories of '{}'.",
                        value.name, group.cardinality, group.name
                    ),
                );
                push(
                    ChartType::Box,
                    BOX_GROUPED,
                    format!(
                        "Compares the distribution of '{}' within each '{}' group.",
                        value.name, group.name
                    ),
                );
                if group.cardinality <= self.config.pie_max_categories {
                    push(
                        ChartType::Pie,
                        PIE_GROUPED,
                        format!(
                            "Shows each '{}' category's share of total '{}'.",
                            group.name, value.name
                        ),
                    );
                }
            }
            (a, b) if a.is_groupable() && b.is_groupable() => {
                push(
                    ChartType::Heatmap,
                    HEATMAP_CROSS_TAB,
                    format!(
                        "Cross-tabulates how often '{}' and '{}' occur together.",
                        x.name, y.name
                    ),
                );
            }
            _ => {}
        }
        out
    }
    pub fn score_chart(
        &self,
        chart_type: ChartType,
        x: &ColumnProfile,
        y: Option<&ColumnProfile>,
    ) -> Option<f64> {
        self.score_pair(x, y)
            .into_iter()
            .find(|c| c.chart_type == chart_type)
            .map(|c| c.score)
    }
    pub fn is_acceptable(&self, score: f64) -> bool {
        score >= self.config.acceptability_threshold
    }
    /// Highest score the chart type reaches over every single column and
    /// ordered column pair, first in declared order on ties.
    pub fn best_fit(&self, chart_type: ChartType) -> Option<ChartFit<'a>> {
        let columns = &self.profile.columns;
        let mut best: Option<ChartFit<'a>> = None;
        let mut consider = |x: &'a ColumnProfile, y: Option<&'a ColumnProfile>| {
            if let Some(score) = self.score_chart(chart_type, x, y) {
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(ChartFit {
                        chart_type,
                        score,
                        axes: ResolvedAxes { x, y },
                    });
                }
            }
        };
        for x in columns {
            consider(x, None);
            for y in columns.iter().filter(|c| c.name != x.name) {
                consider(x, Some(y));
            }
        }
        best
    }
    /// Scores a requested chart type on the axes `resolve_axes` picks for the
    /// given pins, so a render lands on the same columns a suggestion would.
    /// `None` when the chart does not apply to those axes.
    pub fn place_chart(
        &self,
        chart_type: ChartType,
        x: Option<&str>,
        y: Option<&str>,
    ) -> Result<Option<ChartFit<'a>>> {
        let Some(axes) = self.resolve_axes(x, y)? else {
            return Ok(None);
        };
        Ok(self
            .score_chart(chart_type, axes.x, axes.y)
            .map(|score| ChartFit {
                chart_type,
                score,
                axes,
            }))
    }
    /// Plain-language statement of the columns a chart type needs.
    pub fn requirement(&self, chart_type: ChartType) -> String {
        match chart_type {
            ChartType::Line => {
                "a datetime or steadily increasing numeric column paired with a numeric column"
                    .to_string()
            }
            ChartType::Scatter => {
                "two numeric columns, or a datetime column with a numeric column".to_string()
            }
            ChartType::Bar => {
                "a categorical column, optionally with a numeric value column".to_string()
            }
            ChartType::Histogram => "a single numeric column".to_string(),
            ChartType::Heatmap => "two categorical columns".to_string(),
            ChartType::Box => {
                "a numeric column, optionally grouped by a categorical column".to_string()
            }
            ChartType::Area => "a datetime column paired with a numeric column".to_string(),
            ChartType::Pie => format!(
                "a single categorical column with at most {} distinct values",
                self.config.pie_max_categories
            ),
        }
    }
    pub fn rank(&self, axes: &ResolvedAxes<'_>) -> Vec<ScoredCandidate> {
        let mut candidates = self.score_pair(axes.x, axes.y);
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chart_type.priority().cmp(&b.chart_type.priority()))
        });
        candidates
    }
    pub fn suggest(&self, x: Option<&str>, y: Option<&str>) -> Result<Vec<ChartSuggestion>> {
        let start = Instant::now();
        let Some(axes) = self.resolve_axes(x, y)? else {
            debug!("No chartable column combination found");
            return Ok(Vec::new());
        };
        let suggestions: Vec<ChartSuggestion> = self
            .rank(&axes)
            .into_iter()
            .take(self.config.max_suggestions)
            .enumerate()
            .map(|(idx, candidate)| ChartSuggestion {
                chart_type: candidate.chart_type,
                reason: candidate.reason,
                recommended: idx == 0,
                x: Some(axes.x_name().to_string()),
                y: axes.y_name().map(str::to_string),
            })
            .collect();
        debug!(
            x = axes.x_name(),
            y = axes.y_name().unwrap_or("-"),
            count = suggestions.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Chart suggestions ranked"
        );
        Ok(suggestions)
    }
}
fn pair_is(
    a: ColumnType,
    b: ColumnType,
    first: fn(&ColumnType) -> bool,
    second: fn(&ColumnType) -> bool,
) -> bool {
    (first(&a) && second(&b)) || (second(&a) && first(&b))
}
pub fn suggest_charts(
    profile: &DatasetProfile,
    config: &RecommenderConfig,
    x: Option<&str>,
    y: Option<&str>,
) -> Result<Vec<ChartSuggestion>> {
    ChartMatcher::new(profile, config).suggest(x, y)
}
