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
//! Module defining the metric kinds and time series that are extracted from raw logs, and how they
//! are (de-)serialized to CSV.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
/// Metrics that can be extracted from the raw logs of a run.
pub enum MetricKind {
    /// Congestion window in kilobytes, from periodic `ss -i` dumps.
    #[strum(to_string = "cwnd", serialize = "cwnd_kb")]
    Cwnd,
    /// Queue length in packets, from periodic queue samples.
    #[strum(to_string = "qlen", serialize = "qlen_pkts")]
    Qlen,
    /// Round-trip time in milliseconds, from `ping` output.
    #[strum(to_string = "rtt", serialize = "rtt_ms")]
    Rtt,
}

impl MetricKind {
    /// All metric kinds, in the order their panels are stacked.
    pub const ALL: [MetricKind; 3] = [MetricKind::Cwnd, MetricKind::Qlen, MetricKind::Rtt];

    /// Name of the raw log file (source label + `.txt`) this metric is extracted from.
    pub fn raw_file(&self) -> &'static str {
        match self {
            Self::Cwnd => "cwnd.txt",
            Self::Qlen => "qlen.txt",
            Self::Rtt => "rtt.txt",
        }
    }

    /// Name of the canonical CSV file storing this metric.
    pub fn csv_file(&self) -> &'static str {
        match self {
            Self::Cwnd => "cwnd_kb.csv",
            Self::Qlen => "qlen.csv",
            Self::Rtt => "rtt_ms.csv",
        }
    }

    /// Value column of the CSV file.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Cwnd => "cwnd_kb",
            Self::Qlen => "qlen_pkts",
            Self::Rtt => "rtt_ms",
        }
    }

    /// Number of decimals written for values of this metric. `None` writes the shortest
    /// representation of the parsed number, so `3.50` becomes `3.5`.
    pub fn precision(&self) -> Option<usize> {
        match self {
            Self::Cwnd | Self::Rtt => Some(3),
            Self::Qlen => None,
        }
    }

    /// Axis label used in charts.
    pub fn axis_label(&self) -> &'static str {
        match self {
            Self::Cwnd => "CWND (KB)",
            Self::Qlen => "Queue (pkts)",
            Self::Rtt => "RTT (ms)",
        }
    }

    /// Curve label used in single-run charts.
    pub fn curve_label(&self) -> &'static str {
        match self {
            Self::Cwnd => "cwnd (KB)",
            Self::Qlen => "qlen (pkts)",
            Self::Rtt => "RTT (ms)",
        }
    }

    /// Format a value with the precision of this metric.
    pub fn format_value(&self, v: f64) -> String {
        match self.precision() {
            Some(p) => format!("{v:.p$}"),
            None => format!("{v}"),
        }
    }
}

/// Decimals written for sample times.
pub const TIME_PRECISION: usize = 6;

/// Header of the time column in every metric CSV.
pub const TIME_COLUMN: &str = "time_s";

/// One sample: `t` seconds after the base time of its raw log file, and the value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TimeSeriesSample {
    pub t: f64,
    pub v: f64,
}

/// Time-ascending samples of exactly one metric, derived from exactly one raw log file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    kind: MetricKind,
    samples: Vec<TimeSeriesSample>,
}

impl MetricSeries {
    /// Creates a series. Samples are kept in the order given; raw logs are non-decreasing in time.
    pub fn new(kind: MetricKind, samples: Vec<TimeSeriesSample>) -> Self {
        Self { kind, samples }
    }

    pub fn empty(kind: MetricKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn samples(&self) -> &[TimeSeriesSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.v).collect()
    }
}

/// Read a metric CSV (`time_s,<column>`) back into a series.
///
/// Rows with fewer than two fields or non-numeric fields are skipped. Returns `Ok(None)` if the file
/// does not exist.
pub fn read_series(path: impl AsRef<Path>, kind: MetricKind) -> Result<Option<MetricSeries>, csv::Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut samples = Vec::new();
    for record in csv.records() {
        let Ok(record) = record else {
            continue;
        };
        if record.len() < 2 {
            continue;
        }
        let (Ok(t), Ok(v)) = (record[0].trim().parse::<f64>(), record[1].trim().parse::<f64>()) else {
            continue;
        };
        samples.push(TimeSeriesSample { t, v });
    }
    Ok(Some(MetricSeries::new(kind, samples)))
}

/// Path of the canonical CSV for `kind` below `dir`.
pub fn csv_path(dir: impl AsRef<Path>, kind: MetricKind) -> PathBuf {
    dir.as_ref().join(kind.csv_file())
}

#[cfg(test)]
mod test {
    use std::{fs, str::FromStr};

    use super::*;

    #[test]
    fn metric_names() {
        assert_eq!(MetricKind::from_str("rtt").unwrap(), MetricKind::Rtt);
        assert_eq!(MetricKind::from_str("rtt_ms").unwrap(), MetricKind::Rtt);
        assert_eq!(MetricKind::from_str("QLEN").unwrap(), MetricKind::Qlen);
        assert_eq!(MetricKind::from_str("cwnd_kb").unwrap(), MetricKind::Cwnd);
        assert!(MetricKind::from_str("loss").is_err());
        assert_eq!(MetricKind::Cwnd.to_string(), "cwnd");
    }

    #[test]
    fn format_values() {
        assert_eq!(MetricKind::Cwnd.format_value(14.140625), "14.141");
        assert_eq!(MetricKind::Rtt.format_value(40.7), "40.700");
        assert_eq!(MetricKind::Qlen.format_value(12.0), "12");
        assert_eq!(MetricKind::Qlen.format_value(12.5), "12.5");
    }

    #[test]
    fn read_tolerates_garbage_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = csv_path(dir.path(), MetricKind::Rtt);
        fs::write(
            &path,
            "time_s,rtt_ms\n0.000000,40.700\nbroken\n1.0,abc\n1.500000,41.000\n",
        )
        .unwrap();

        let series = read_series(&path, MetricKind::Rtt).unwrap().unwrap();
        assert_eq!(
            series.samples(),
            &[
                TimeSeriesSample { t: 0.0, v: 40.7 },
                TimeSeriesSample { t: 1.5, v: 41.0 }
            ]
        );
        assert!(read_series(dir.path().join("missing.csv"), MetricKind::Rtt)
            .unwrap()
            .is_none());
    }
}
