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
use std::collections::HashMap;
use std::str::FromStr;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Text,
    Boolean,
}
impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Numeric)
    }
    /// Categorical and boolean columns both act as grouping keys.
    pub fn is_groupable(&self) -> bool {
        matches!(self, ColumnType::Categorical | ColumnType::Boolean)
    }
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Datetime)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Datetime => "datetime",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        }
    }
}
impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Scatter,
    Bar,
    Histogram,
    Heatmap,
    Box,
    Area,
    Pie,
}
impl ChartType {
    /// Fixed priority order used to break score ties; lower wins.
    pub const PRIORITY: [ChartType; 8] = [
        ChartType::Line,
        ChartType::Scatter,
        ChartType::Bar,
        ChartType::Histogram,
        ChartType::Heatmap,
        ChartType::Box,
        ChartType::Area,
        ChartType::Pie,
    ];
    pub fn priority(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::PRIORITY.len())
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
            ChartType::Bar => "bar",
            ChartType::Histogram => "histogram",
            ChartType::Heatmap => "heatmap",
            ChartType::Box => "box",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
        }
    }
    pub fn display_name(&self) -> &'static str {
        match self {
            ChartType::Line => "line chart",
            ChartType::Scatter => "scatter plot",
            ChartType::Bar => "bar chart",
            ChartType::Histogram => "histogram",
            ChartType::Heatmap => "heatmap",
            ChartType::Box => "box plot",
            ChartType::Area => "area chart",
            ChartType::Pie => "pie chart",
        }
    }
    /// Short description of what a chart of this type shows.
    pub fn describe(&self) -> &'static str {
        match self {
            ChartType::Line => "A line chart tracking a measure across an ordered axis, usually time.",
            ChartType::Scatter => "A scatter plot showing the relationship between two measures.",
            ChartType::Bar => "A bar chart comparing a measure across categories.",
            ChartType::Histogram => "A histogram showing how a single measure is distributed.",
            ChartType::Heatmap => "A heatmap showing how often two categories occur together.",
            ChartType::Box => "A box plot summarising the spread of a measure, optionally per group.",
            ChartType::Area => "An area chart showing a cumulative-looking trend over time.",
            ChartType::Pie => "A pie chart showing each category's share of a whole.",
        }
    }
}
impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for ChartType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(ChartType::Line),
            "scatter" => Ok(ChartType::Scatter),
            "bar" => Ok(ChartType::Bar),
            "histogram" => Ok(ChartType::Histogram),
            "heatmap" => Ok(ChartType::Heatmap),
            "box" => Ok(ChartType::Box),
            "area" => Ok(ChartType::Area),
            "pie" => Ok(ChartType::Pie),
            other => Err(format!("unknown chart type '{other}'")),
        }
    }
}

const LABEL_TABLE: &[(&str, ChartType)] = &[
    ("bar", ChartType::Bar),
    ("column", ChartType::Bar),
    ("horizontal bar", ChartType::Bar),
    ("stacked bar", ChartType::Bar),
    ("grouped bar", ChartType::Bar),
    ("line", ChartType::Line),
    ("time series", ChartType::Line),
    ("timeseries", ChartType::Line),
    ("area", ChartType::Area),
    ("stacked area", ChartType::Area),
    ("scatter", ChartType::Scatter),
    ("scatterplot", ChartType::Scatter),
    ("bubble", ChartType::Scatter),
    ("histogram", ChartType::Histogram),
    ("box", ChartType::Box),
    ("boxplot", ChartType::Box),
    ("box and whisker", ChartType::Box),
    ("box whisker", ChartType::Box),
    ("pie", ChartType::Pie),
    ("donut", ChartType::Pie),
    ("doughnut", ChartType::Pie),
    ("heatmap", ChartType::Heatmap),
    ("heat map", ChartType::Heatmap),
    ("density heatmap", ChartType::Heatmap),
];

/// Maps raw classifier labels onto canonical chart types.
#[derive(Debug, Clone)]
pub struct LabelMapper {
    table: HashMap<String, ChartType>,
}
impl LabelMapper {
    pub fn new() -> Self {
        let table = LABEL_TABLE
            .iter()
            .map(|(label, chart)| ((*label).to_string(), *chart))
            .collect();
        Self { table }
    }
    pub fn with_aliases(aliases: &HashMap<String, ChartType>) -> Self {
        let mut mapper = Self::new();
        for (label, chart) in aliases {
            mapper.table.insert(normalise_label(label), *chart);
        }
        mapper
    }
    pub fn map(&self, raw_label: &str) -> Option<ChartType> {
        self.table.get(&normalise_label(raw_label)).copied()
    }
}
impl Default for LabelMapper {
    fn default() -> Self {
        Self::new()
    }
}

pub fn normalise_label(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace(['_', '-'], " ");
    let mut words: Vec<&str> = lowered.split_whitespace().collect();
    while words.len() > 1 && matches!(words.last(), Some(&("chart" | "plot" | "graph"))) {
        words.pop();
    }
    words.join(" ")
}
