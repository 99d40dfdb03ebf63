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
//! Persisting metric series as CSV.
//!
//! The store is the only writer of metric CSVs. An empty series never produces a file: a missing
//! CSV is how the absence of data is represented downstream.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use netsweep_utils::fs::{dir_name, is_writable_dir};

use crate::records::{MetricSeries, TIME_COLUMN, TIME_PRECISION};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Cannot write {file} to {primary:?} ({primary_error}) nor to {fallback:?} ({fallback_error})")]
    Unwritable {
        file: String,
        primary: PathBuf,
        primary_error: String,
        fallback: PathBuf,
        fallback_error: String,
    },
}

/// Writes metric CSVs next to the raw logs, or below `results_root` when the run directory is
/// read-only.
#[derive(Debug, Clone)]
pub struct ResultStore {
    results_root: PathBuf,
}

impl ResultStore {
    pub fn new(results_root: impl Into<PathBuf>) -> Self {
        Self {
            results_root: results_root.into(),
        }
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// Alternate destination for `run_dir`: `<results_root>/<name of run_dir>`.
    pub fn fallback(&self, run_dir: impl AsRef<Path>) -> PathBuf {
        self.results_root.join(dir_name(run_dir))
    }

    /// The directory CSVs of `run_dir` are written to: the run directory itself if this process can
    /// write there, the fallback otherwise.
    pub fn destination(&self, run_dir: impl AsRef<Path>) -> PathBuf {
        let run_dir = run_dir.as_ref();
        if is_writable_dir(run_dir) {
            run_dir.to_path_buf()
        } else {
            self.fallback(run_dir)
        }
    }

    /// Write `series` for the run in `run_dir`. Returns the path of the written file, or `None` if
    /// the series is empty and nothing was written.
    ///
    /// A failing write to the run directory is retried at the fallback; only if that fails too an
    /// error is returned.
    pub fn write(
        &self,
        series: &MetricSeries,
        run_dir: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>, StoreError> {
        if series.is_empty() {
            return Ok(None);
        }
        let run_dir = run_dir.as_ref();
        let file = series.kind().csv_file();

        let primary = self.destination(run_dir);
        let primary_error = match write_csv(series, primary.join(file)) {
            Ok(()) => return Ok(Some(primary.join(file))),
            Err(e) => e,
        };

        let fallback = self.fallback(run_dir);
        if fallback == primary {
            return Err(primary_error);
        }
        log::warn!(
            "Cannot write {:?} ({primary_error}), retrying at {fallback:?}",
            primary.join(file)
        );
        match write_csv(series, fallback.join(file)) {
            Ok(()) => Ok(Some(fallback.join(file))),
            Err(fallback_error) => Err(StoreError::Unwritable {
                file: file.to_string(),
                primary,
                primary_error: primary_error.to_string(),
                fallback,
                fallback_error: fallback_error.to_string(),
            }),
        }
    }
}

/// Serialize `series` to `time_s,<column>` CSV at `path`, creating parent directories. Nothing is
/// written for an empty series.
pub fn write_csv(series: &MetricSeries, path: impl AsRef<Path>) -> Result<(), StoreError> {
    if series.is_empty() {
        return Ok(());
    }
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_series(
        series,
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
    )?;
    Ok(())
}

/// Render `series` to the exact bytes [`write_csv`] would produce.
pub fn to_csv_string(series: &MetricSeries) -> Result<String, StoreError> {
    let buffer = write_series(series, vec![])?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn write_series<W: io::Write>(series: &MetricSeries, writer: W) -> Result<W, StoreError> {
    let kind = series.kind();
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record([TIME_COLUMN, kind.column()])?;
    for sample in series.samples() {
        csv.write_record([
            format!("{:.prec$}", sample.t, prec = TIME_PRECISION),
            kind.format_value(sample.v),
        ])?;
    }
    csv.flush()?;
    csv.into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))
}
