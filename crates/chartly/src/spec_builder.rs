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
use crate::chart_types::ChartType;
use crate::data_profiler::{parse_number, quantile, ColumnProfile, DatasetProfile};
use crate::error::{ChartlyError, ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub theme: String,
}
impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
        }
    }
}
impl RenderConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.theme.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "render.theme".to_string(),
                value: self.theme.clone(),
            });
        }
        Ok(())
    }
}
/// Renderer-agnostic chart description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub layout: ChartLayout,
    pub data: ChartData,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLayout {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_title: Option<String>,
    pub theme: String,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Count,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    Points {
        x: String,
        y: String,
        points: Vec<Point>,
    },
    Categories {
        category: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        aggregation: Aggregation,
        categories: Vec<CategoryValue>,
    },
    Bins {
        column: String,
        bins: Vec<HistogramBin>,
    },
    Boxes {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        group: Option<String>,
        boxes: Vec<BoxSummary>,
    },
    Matrix {
        x: String,
        y: String,
        x_categories: Vec<String>,
        y_categories: Vec<String>,
        counts: Vec<Vec<usize>>,
    },
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: Value,
    pub y: f64,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryValue {
    pub label: String,
    pub value: f64,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub label: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub count: usize,
}
pub struct SpecBuilder<'a> {
    profile: &'a DatasetProfile,
    recommender: &'a RecommenderConfig,
    render: &'a RenderConfig,
}
impl<'a> SpecBuilder<'a> {
    pub fn new(
        profile: &'a DatasetProfile,
        recommender: &'a RecommenderConfig,
        render: &'a RenderConfig,
    ) -> Self {
        Self {
            profile,
            recommender,
            render,
        }
    }
    /// Builds by chart type name; unknown names are unsupported rather than malformed.
    pub fn build_named(
        &self,
        chart_type: &str,
        x: Option<&str>,
        y: Option<&str>,
    ) -> Result<ChartSpec> {
        let parsed = chart_type
            .parse::<ChartType>()
            .map_err(|reason| ChartlyError::unsupported_chart(chart_type, reason))?;
        self.build(parsed, x, y)
    }
    pub fn build(&self, chart_type: ChartType, x: Option<&str>, y: Option<&str>) -> Result<ChartSpec> {
        let matcher = ChartMatcher::new(self.profile, self.recommender);
        let fit = matcher.place_chart(chart_type, x, y)?;
        let Some(fit) = fit.filter(|f| matcher.is_acceptable(f.score)) else {
            let resolved = matcher.resolve_axes(x, y)?;
            return Err(ChartlyError::unsupported_chart(
                chart_type.as_str(),
                format!(
                    "a {} needs {}{}",
                    chart_type.display_name(),
                    matcher.requirement(chart_type),
                    describe_axes(resolved.as_ref())
                ),
            ));
        };
        let axes = fit.axes;
        let (layout, data) = match chart_type {
            ChartType::Scatter | ChartType::Line | ChartType::Area => self.points(chart_type, &axes),
            ChartType::Bar | ChartType::Pie => self.categories(chart_type, &axes),
            ChartType::Histogram => self.histogram(axes.x),
            ChartType::Box => self.boxes(&axes),
            ChartType::Heatmap => self.heatmap(&axes),
        }?;
        debug!(
            chart_type = chart_type.as_str(),
            x = axes.x_name(),
            y = axes.y_name().unwrap_or("-"),
            "Chart spec built"
        );
        Ok(ChartSpec {
            chart_type,
            layout,
            data,
        })
    }
    fn index(&self, column: &ColumnProfile) -> Result<usize> {
        self.profile
            .column_index(&column.name)
            .ok_or_else(|| ChartlyError::ColumnNotFound {
                column: column.name.clone(),
            })
    }
    fn layout(&self, title: String, x_title: Option<&str>, y_title: Option<&str>) -> ChartLayout {
        ChartLayout {
            title,
            x_title: x_title.map(str::to_string),
            y_title: y_title.map(str::to_string),
            theme: self.render.theme.clone(),
        }
    }
    fn points(&self, chart_type: ChartType, axes: &ResolvedAxes<'_>) -> Result<(ChartLayout, ChartData)> {
        let other = axes
            .y
            .ok_or_else(|| ChartlyError::Internal("point chart without a second column".into()))?;
        let (x_col, y_col) = if other.dtype.is_temporal() && !axes.x.dtype.is_temporal() {
            (other, axes.x)
        } else {
            (axes.x, other)
        };
        let (xi, yi) = (self.index(x_col)?, self.index(y_col)?);
        let temporal = x_col.dtype.is_temporal();
        let mut keyed: Vec<(f64, Point)> = self
            .profile
            .cells(xi)
            .zip(self.profile.numeric_values(yi))
            .filter_map(|(x_cell, y_value)| {
                let (x_cell, y) = (x_cell?, y_value?);
                if temporal {
                    let dt = self.profile.datetime_value(x_cell)?;
                    Some((
                        dt.timestamp_millis() as f64,
                        Point {
                            x: Value::String(dt.to_rfc3339()),
                            y,
                        },
                    ))
                } else {
                    let xv = parse_number(x_cell)?;
                    Some((xv, Point { x: Value::from(xv), y }))
                }
            })
            .collect();
        if chart_type != ChartType::Scatter {
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        let title = match chart_type {
            ChartType::Scatter => format!("{} vs {}", y_col.name, x_col.name),
            _ => format!("{} over {}", y_col.name, x_col.name),
        };
        Ok((
            self.layout(title, Some(&x_col.name), Some(&y_col.name)),
            ChartData::Points {
                x: x_col.name.clone(),
                y: y_col.name.clone(),
                points: keyed.into_iter().map(|(_, p)| p).collect(),
            },
        ))
    }
    fn categories(&self, chart_type: ChartType, axes: &ResolvedAxes<'_>) -> Result<(ChartLayout, ChartData)> {
        let (group, value) = match axes.y {
            Some(y) if axes.x.dtype.is_groupable() => (axes.x, Some(y)),
            Some(y) => (y, Some(axes.x)),
            None => (axes.x, None),
        };
        let gi = self.index(group)?;
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, f64> = HashMap::new();
        let values: Vec<Option<f64>> = match value {
            Some(v) => self.profile.numeric_values(self.index(v)?).collect(),
            None => vec![Some(1.0); self.profile.profiled_rows()],
        };
        for (cell, amount) in self.profile.cells(gi).zip(values) {
            let Some(label) = cell else { continue };
            let total = totals.entry(label.to_string()).or_insert_with(|| {
                order.push(label.to_string());
                0.0
            });
            *total += amount.unwrap_or(0.0);
        }
        let categories = order
            .into_iter()
            .map(|label| {
                let value = totals.get(&label).copied().unwrap_or(0.0);
                CategoryValue { label, value }
            })
            .collect();
        let (aggregation, title, value_title) = match value {
            Some(v) => (
                Aggregation::Sum,
                format!("{} by {}", v.name, group.name),
                format!("Total {}", v.name),
            ),
            None => (
                Aggregation::Count,
                format!("Count by {}", group.name),
                "Count".to_string(),
            ),
        };
        let layout = if chart_type == ChartType::Pie {
            self.layout(title, None, None)
        } else {
            self.layout(title, Some(&group.name), Some(&value_title))
        };
        Ok((
            layout,
            ChartData::Categories {
                category: group.name.clone(),
                value: value.map(|v| v.name.clone()),
                aggregation,
                categories,
            },
        ))
    }
    fn histogram(&self, column: &ColumnProfile) -> Result<(ChartLayout, ChartData)> {
        let values: Vec<f64> = self
            .profile
            .numeric_values(self.index(column)?)
            .flatten()
            .collect();
        Ok((
            self.layout(
                format!("Distribution of {}", column.name),
                Some(&column.name),
                Some("Count"),
            ),
            ChartData::Bins {
                column: column.name.clone(),
                bins: histogram_bins(&values),
            },
        ))
    }
    fn boxes(&self, axes: &ResolvedAxes<'_>) -> Result<(ChartLayout, ChartData)> {
        let (group, value) = match axes.y {
            Some(y) if axes.x.dtype.is_groupable() => (Some(axes.x), y),
            Some(y) => (Some(y), axes.x),
            None => (None, axes.x),
        };
        let vi = self.index(value)?;
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
        let labels: Vec<Option<&str>> = match group {
            Some(g) => self.profile.cells(self.index(g)?).collect(),
            None => vec![Some(value.name.as_str()); self.profile.profiled_rows()],
        };
        for (label, v) in labels.into_iter().zip(self.profile.numeric_values(vi)) {
            let (Some(label), Some(v)) = (label, v) else {
                continue;
            };
            grouped
                .entry(label.to_string())
                .or_insert_with(|| {
                    order.push(label.to_string());
                    Vec::new()
                })
                .push(v);
        }
        let boxes = order
            .into_iter()
            .filter_map(|label| {
                let mut values = grouped.remove(&label)?;
                values.sort_by(f64::total_cmp);
                five_number_summary(label, &values)
            })
            .collect();
        let title = match group {
            Some(g) => format!("{} by {}", value.name, g.name),
            None => format!("Distribution of {}", value.name),
        };
        Ok((
            self.layout(title, group.map(|g| g.name.as_str()), Some(&value.name)),
            ChartData::Boxes {
                value: value.name.clone(),
                group: group.map(|g| g.name.clone()),
                boxes,
            },
        ))
    }
    fn heatmap(&self, axes: &ResolvedAxes<'_>) -> Result<(ChartLayout, ChartData)> {
        let y_col = axes
            .y
            .ok_or_else(|| ChartlyError::Internal("heatmap without a second column".into()))?;
        let (xi, yi) = (self.index(axes.x)?, self.index(y_col)?);
        let mut x_categories: Vec<String> = Vec::new();
        let mut y_categories: Vec<String> = Vec::new();
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for (xc, yc) in self.profile.cells(xi).zip(self.profile.cells(yi)) {
            let (Some(xc), Some(yc)) = (xc, yc) else {
                continue;
            };
            pairs.push((
                position_or_push(&mut x_categories, xc),
                position_or_push(&mut y_categories, yc),
            ));
        }
        let mut counts = vec![vec![0usize; x_categories.len()]; y_categories.len()];
        for (xpos, ypos) in pairs {
            counts[ypos][xpos] += 1;
        }
        Ok((
            self.layout(
                format!("{} by {}", y_col.name, axes.x.name),
                Some(&axes.x.name),
                Some(&y_col.name),
            ),
            ChartData::Matrix {
                x: axes.x.name.clone(),
                y: y_col.name.clone(),
                x_categories,
                y_categories,
                counts,
            },
        ))
    }
}
fn position_or_push(values: &mut Vec<String>, value: &str) -> usize {
    match values.iter().position(|v| v == value) {
        Some(pos) => pos,
        None => {
            values.push(value.to_string());
            values.len() - 1
        }
    }
}
fn describe_axes(axes: Option<&ResolvedAxes<'_>>) -> String {
    let Some(axes) = axes else {
        return "; no suitable columns were found in this dataset".to_string();
    };
    let described: Vec<String> = std::iter::once(axes.x)
        .chain(axes.y)
        .map(|c| format!("'{}' is {} with {} distinct values", c.name, c.dtype, c.cardinality))
        .collect();
    format!("; {}", described.join(", "))
}
/// Equal-width bins using Sturges' rule. Bins are half-open except the last.
pub fn histogram_bins(values: &[f64]) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }
    let bin_count = ((values.len() as f64).log2().ceil() as usize + 1).max(1);
    let width = (max - min) / bin_count as f64;
    let mut counts = vec![0usize; bin_count];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(bin_count - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + width * i as f64,
            end: if i + 1 == bin_count {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}
fn five_number_summary(label: String, sorted: &[f64]) -> Option<BoxSummary> {
    Some(BoxSummary {
        label,
        min: *sorted.first()?,
        q1: quantile(sorted, 0.25)?,
        median: quantile(sorted, 0.5)?,
        q3: quantile(sorted, 0.75)?,
        max: *sorted.last()?,
        count: sorted.len(),
    })
}
