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
//! Turns raw log files into metric series.
//!
//! Extraction is pure: one raw log file in, one [`MetricSeries`] out. The base time of a file is the
//! timestamp of its first line with a parseable leading number, whether or not that line matches the
//! metric. Lines without a parseable leading number (comments, blank lines, partial writes) are
//! skipped without aborting the parse.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::{
    records::{MetricKind, MetricSeries, TimeSeriesSample},
    store::{ResultStore, StoreError},
};

pub mod rules;

use rules::{leading_timestamp, CwndRule, MetricRule, QlenRule, RttRule};

/// Apply rule `R` to all lines.
pub fn parse_lines<R, I, S>(lines: I) -> MetricSeries
where
    R: MetricRule,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut base: Option<f64> = None;
    let mut samples = Vec::new();

    for line in lines {
        let line = line.as_ref();
        let Some(ts) = leading_timestamp(line) else {
            log::trace!("[{}] skipping line without timestamp: {line:?}", R::kind());
            continue;
        };
        let base = *base.get_or_insert(ts);
        if let Some(v) = R::value(line) {
            samples.push(TimeSeriesSample { t: ts - base, v });
        }
    }

    MetricSeries::new(R::kind(), samples)
}

/// Parse `lines` with the rule of `kind`.
pub fn parse<I, S>(kind: MetricKind, lines: I) -> MetricSeries
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match kind {
        MetricKind::Cwnd => parse_lines::<CwndRule, _, _>(lines),
        MetricKind::Qlen => parse_lines::<QlenRule, _, _>(lines),
        MetricKind::Rtt => parse_lines::<RttRule, _, _>(lines),
    }
}

/// Parse a reader line by line. Invalid UTF-8 is replaced instead of failing the parse.
pub fn parse_reader(kind: MetricKind, reader: impl BufRead) -> io::Result<MetricSeries> {
    let mut lines = Vec::new();
    for line in reader.split(b'\n') {
        lines.push(String::from_utf8_lossy(&line?).trim_end_matches('\r').to_string());
    }
    Ok(parse(kind, lines))
}

/// Parse a raw log file.
pub fn parse_file(kind: MetricKind, path: impl AsRef<Path>) -> io::Result<MetricSeries> {
    parse_reader(kind, BufReader::new(File::open(path)?))
}

/// What happened to one metric of a run directory.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    /// The CSV was written to the given path.
    Written { path: PathBuf, samples: usize },
    /// The raw log file exists, but no line matched.
    Empty,
    /// The raw log file does not exist.
    Missing,
    /// The raw log file exists, but cannot be read.
    Unreadable(String),
}

/// Result of extracting all metrics of one run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractReport {
    pub run_dir: PathBuf,
    pub metrics: Vec<(MetricKind, MetricOutcome)>,
}

impl ExtractReport {
    pub fn written(&self) -> impl Iterator<Item = (MetricKind, &Path)> {
        self.metrics.iter().filter_map(|(kind, outcome)| match outcome {
            MetricOutcome::Written { path, .. } => Some((*kind, path.as_path())),
            _ => None,
        })
    }
}

/// Extract every metric from the raw logs in `run_dir` and write the CSVs through `store`.
///
/// Missing and unreadable raw logs are logged and skipped. Only a store failure at both the run
/// directory and the results root is returned as an error.
pub fn extract_run_dir(run_dir: impl AsRef<Path>, store: &ResultStore) -> Result<ExtractReport, StoreError> {
    let run_dir = run_dir.as_ref();
    log::info!("Processing: {run_dir:?} -> {:?}", store.destination(run_dir));

    let mut metrics = Vec::new();
    for kind in MetricKind::ALL {
        let raw = run_dir.join(kind.raw_file());
        if !raw.exists() {
            log::warn!("[{kind}] no {raw:?}, skipping");
            metrics.push((kind, MetricOutcome::Missing));
            continue;
        }
        let series = match parse_file(kind, &raw) {
            Ok(series) => series,
            Err(e) => {
                log::warn!("[{kind}] cannot read {raw:?}: {e}");
                metrics.push((kind, MetricOutcome::Unreadable(e.to_string())));
                continue;
            }
        };
        match store.write(&series, run_dir)? {
            Some(path) => {
                log::info!("  -> {path:?} ({} samples)", series.len());
                metrics.push((
                    kind,
                    MetricOutcome::Written {
                        path,
                        samples: series.len(),
                    },
                ));
            }
            None => {
                log::warn!("[{kind}] no samples in {raw:?}");
                metrics.push((kind, MetricOutcome::Empty));
            }
        }
    }

    Ok(ExtractReport {
        run_dir: run_dir.to_path_buf(),
        metrics,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(t: f64, v: f64) -> TimeSeriesSample {
        TimeSeriesSample { t, v }
    }

    #[test]
    fn cwnd_series_is_aligned_to_first_line() {
        let t0 = 1_700_000_000.0;
        let lines = [
            format!("{t0}, ESTAB 0 0 cubic mss:1448 cwnd:10"),
            format!("{}, ESTAB 0 0 cubic mss:1448 cwnd:10", t0 + 1.5),
            format!("{}, ESTAB 0 0 cubic mss:1448 cwnd:10", t0 + 3.0),
        ];
        let series = parse(MetricKind::Cwnd, &lines);
        assert_eq!(series.kind(), MetricKind::Cwnd);
        assert_eq!(
            series.samples(),
            &[
                sample(0.0, 14.140625),
                sample(1.5, 14.140625),
                sample(3.0, 14.140625)
            ]
        );
    }

    #[test]
    fn base_time_from_non_matching_line() {
        let lines = [
            "# started",
            "10.0, State Recv-Q Send-Q",
            "",
            "12.5, cwnd:1 mss:1024",
        ];
        let series = parse(MetricKind::Cwnd, lines);
        assert_eq!(series.samples(), &[sample(2.5, 1.0)]);
    }

    #[test]
    fn rtt_single_line() {
        let series = parse(
            MetricKind::Rtt,
            ["5.0, 64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=40.7 ms"],
        );
        assert_eq!(series.samples(), &[sample(0.0, 40.7)]);
    }

    #[test]
    fn rtt_skips_summary_lines() {
        let series = parse(
            MetricKind::Rtt,
            [
                "5.0, PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.",
                "5.1, 64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=201 ms",
                "partial wri",
                "6.1, 64 bytes from 10.0.0.2: icmp_seq=2 ttl=64 time=200.5 ms",
                "6.2, rtt min/avg/max/mdev = 200.5/200.7/201.0/0.2 ms",
            ],
        );
        assert_eq!(series.len(), 2);
        assert!((series.samples()[0].t - 0.1).abs() < 1e-9);
        assert_eq!(series.samples()[0].v, 201.0);
        assert!((series.samples()[1].t - 1.1).abs() < 1e-9);
    }

    #[test]
    fn qlen_takes_second_field() {
        let series = parse(MetricKind::Qlen, ["1.0", "1.5, 3", "2.0, 12", "garbage, 7"]);
        assert_eq!(series.samples(), &[sample(0.5, 3.0), sample(1.0, 12.0)]);
    }

    #[test]
    fn qlen_values_are_written_as_numbers() {
        let series = parse(MetricKind::Qlen, ["1.0, 3.50", "2.0, 007", "3.0, 1e2"]);
        assert_eq!(
            crate::store::to_csv_string(&series).unwrap(),
            "time_s,qlen_pkts\n0.000000,3.5\n1.000000,7\n2.000000,100\n"
        );
    }

    #[test]
    fn no_matching_lines_yields_empty_series() {
        for kind in MetricKind::ALL {
            assert!(parse(kind, ["# nothing here", "abc, def"]).is_empty());
        }
        // timestamps alone establish a base time but produce no rtt/cwnd samples
        assert!(parse(MetricKind::Rtt, ["1.0, hello", "2.0, world"]).is_empty());
        assert!(parse(MetricKind::Cwnd, Vec::<String>::new()).is_empty());
    }

    #[test]
    fn reader_tolerates_invalid_utf8() {
        let mut data = b"1.0, time=1.5 ms\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        data.extend_from_slice(b"2.0, time=2.5 ms\r\n");
        let series = parse_reader(MetricKind::Rtt, data.as_slice()).unwrap();
        assert_eq!(series.samples(), &[sample(0.0, 1.5), sample(1.0, 2.5)]);
    }
}
