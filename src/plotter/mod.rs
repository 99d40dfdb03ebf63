// NETSWEEP: Parameter Sweeps and Metric Extraction for Emulated Network Experiments
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Charts of stored metric series.
//!
//! Charts are first assembled as a [`Chart`] model from the metric CSVs, which is then rendered with
//! plotly into a self-contained HTML document.

use std::{
    fs,
    path::{Path, PathBuf},
};

use plotly::{
    common::Mode,
    layout::{Annotation, Axis, AxisType, GridPattern, LayoutGrid},
    Layout, Plot, Scatter,
};

use crate::records::{csv_path, read_series, MetricKind, MetricSeries};

pub mod summary;

pub use summary::SeriesSummary;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("Run directory {0:?} does not exist")]
    MissingDir(PathBuf),
    #[error("None of the runs has a {0} series")]
    EmptyComparisonSet(MetricKind),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text of the placeholder shown when a run has no usable metric.
pub const NO_DATA: &str = "No data available";

/// A renderer-independent chart.
#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    /// One panel per series, stacked vertically on a shared time axis.
    Panels {
        title: String,
        panels: Vec<MetricSeries>,
        log_y: bool,
    },
    /// A single panel with an explanatory label instead of data.
    Placeholder { title: String, message: String },
    /// Labelled series of the same metric overlaid on one time axis.
    Overlay {
        title: String,
        metric: MetricKind,
        curves: Vec<(String, MetricSeries)>,
        log_y: bool,
    },
}

impl Chart {
    pub fn title(&self) -> &str {
        match self {
            Chart::Panels { title, .. }
            | Chart::Placeholder { title, .. }
            | Chart::Overlay { title, .. } => title,
        }
    }

    /// Number of panels (subplots) of the chart.
    pub fn num_panels(&self) -> usize {
        match self {
            Chart::Panels { panels, .. } => panels.len(),
            Chart::Placeholder { .. } | Chart::Overlay { .. } => 1,
        }
    }

    /// Number of drawn curves.
    pub fn num_curves(&self) -> usize {
        match self {
            Chart::Panels { panels, .. } => panels.len(),
            Chart::Placeholder { .. } => 0,
            Chart::Overlay { curves, .. } => curves.len(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Chart::Placeholder { .. })
    }

    /// Render the chart with plotly.
    pub fn to_plot(&self) -> Plot {
        let mut plot = Plot::new();
        match self {
            Chart::Panels {
                title,
                panels,
                log_y,
            } => {
                let mut layout = Layout::new()
                    .title(title.as_str())
                    .height(300 * panels.len().max(1))
                    .grid(
                        LayoutGrid::new()
                            .rows(panels.len())
                            .columns(1)
                            .pattern(GridPattern::Coupled),
                    )
                    .x_axis(Axis::new().title("Time (s)"));
                for (i, series) in panels.iter().enumerate() {
                    let kind = series.kind();
                    plot.add_trace(
                        Scatter::new(series.times(), series.values())
                            .name(kind.curve_label())
                            .mode(Mode::Lines)
                            .x_axis("x")
                            .y_axis(&axis_id(i)),
                    );
                    let axis = value_axis(kind.axis_label(), *log_y);
                    // at most one panel per metric kind
                    layout = match i {
                        0 => layout.y_axis(axis),
                        1 => layout.y_axis2(axis),
                        _ => layout.y_axis3(axis),
                    };
                }
                plot.set_layout(layout);
            }
            Chart::Placeholder { title, message } => {
                plot.set_layout(
                    Layout::new()
                        .title(title.as_str())
                        .x_axis(Axis::new().visible(false))
                        .y_axis(Axis::new().visible(false))
                        .annotations(vec![Annotation::new()
                            .text(message)
                            .x_ref("paper")
                            .y_ref("paper")
                            .x(0.5)
                            .y(0.5)
                            .show_arrow(false)]),
                );
            }
            Chart::Overlay {
                title,
                metric,
                curves,
                log_y,
            } => {
                for (label, series) in curves.iter() {
                    plot.add_trace(
                        Scatter::new(series.times(), series.values())
                            .name(label)
                            .mode(Mode::Lines),
                    );
                }
                plot.set_layout(
                    Layout::new()
                        .title(title.as_str())
                        .x_axis(Axis::new().title("Time (s)"))
                        .y_axis(value_axis(metric.axis_label(), *log_y)),
                );
            }
        }
        plot
    }
}

fn axis_id(i: usize) -> String {
    match i {
        0 => "y".to_string(),
        i => format!("y{}", i + 1),
    }
}

fn value_axis(label: &str, log_y: bool) -> Axis {
    let axis = Axis::new().title(label);
    if log_y {
        axis.type_(AxisType::Log)
    } else {
        axis
    }
}

/// Load all metrics of the run in `run_dir` that have a non-empty CSV, in panel order. Unreadable
/// files are skipped with a warning.
pub fn load_run(run_dir: impl AsRef<Path>) -> Result<Vec<MetricSeries>, PlotError> {
    let run_dir = run_dir.as_ref();
    if !run_dir.is_dir() {
        return Err(PlotError::MissingDir(run_dir.to_path_buf()));
    }
    let mut series = Vec::new();
    for kind in MetricKind::ALL {
        if let Some(s) = load_metric(run_dir, kind) {
            series.push(s);
        }
    }
    Ok(series)
}

/// The non-empty series of `kind` in `dir`, if any.
fn load_metric(dir: &Path, kind: MetricKind) -> Option<MetricSeries> {
    let path = csv_path(dir, kind);
    match read_series(&path, kind) {
        Ok(Some(series)) if !series.is_empty() => Some(series),
        Ok(Some(_)) => {
            log::debug!("{path:?} has no samples");
            None
        }
        Ok(None) => None,
        Err(e) => {
            log::warn!("Cannot read {path:?}: {e}");
            None
        }
    }
}

/// Chart of one run: a panel per available metric, or a placeholder if there is none.
pub fn single_run_chart(run_dir: impl AsRef<Path>, log_y: bool) -> Result<Chart, PlotError> {
    let run_dir = run_dir.as_ref();
    let panels = load_run(run_dir)?;
    let title = format!("Run {}", netsweep_utils::fs::dir_name(run_dir));
    if panels.is_empty() {
        log::warn!("No metric CSV with data in {run_dir:?}");
        return Ok(Chart::Placeholder {
            title,
            message: NO_DATA.to_string(),
        });
    }
    Ok(Chart::Panels {
        title,
        panels,
        log_y,
    })
}

/// Series of one metric from several labelled runs. Only exists while plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSet {
    pub metric: MetricKind,
    pub entries: Vec<(String, MetricSeries)>,
}

impl ComparisonSet {
    /// Load `metric` from each `(label, dir)` in order. Directories without the metric are skipped
    /// with a warning.
    pub fn load<S, P>(runs: &[(S, P)], metric: MetricKind) -> Self
    where
        S: AsRef<str>,
        P: AsRef<Path>,
    {
        let mut entries = Vec::new();
        for (label, dir) in runs {
            let (label, dir) = (label.as_ref(), dir.as_ref());
            match load_metric(dir, metric) {
                Some(series) => entries.push((label.to_string(), series)),
                None => log::warn!(
                    "No {metric} data for {label} ({:?})",
                    csv_path(dir, metric)
                ),
            }
        }
        Self { metric, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Summary statistics of every entry.
    pub fn summaries(&self) -> Vec<(&str, SeriesSummary)> {
        self.entries
            .iter()
            .filter_map(|(label, series)| Some((label.as_str(), SeriesSummary::of(series)?)))
            .collect()
    }

    /// Overlay of all entries. An empty set yields no chart.
    pub fn chart(&self, log_y: bool) -> Result<Chart, PlotError> {
        if self.is_empty() {
            return Err(PlotError::EmptyComparisonSet(self.metric));
        }
        Ok(Chart::Overlay {
            title: format!("{} comparison", self.metric.axis_label()),
            metric: self.metric,
            curves: self.entries.clone(),
            log_y,
        })
    }
}

/// The path the chart is actually written to: `.html` is appended or replaces another extension.
pub fn html_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("html") => path.to_path_buf(),
        Some(ext) => {
            let html = path.with_extension("html");
            log::warn!(
                "Charts are written as HTML, not {}: writing {html:?}",
                ext.to_string_lossy()
            );
            html
        }
        None => path.with_extension("html"),
    }
}

/// Render `chart` and write it to `path` (see [`html_path`]), creating parent directories. Returns
/// the written path.
pub fn write_chart(chart: &Chart, path: impl AsRef<Path>) -> Result<PathBuf, PlotError> {
    let path = html_path(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, chart.to_plot().to_html())?;
    log::info!("Saved chart to {path:?}");
    Ok(path)
}
