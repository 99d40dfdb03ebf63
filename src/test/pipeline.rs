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
//! From raw logs to CSV files to charts.

use std::fs;

use super::write_file;
use crate::{
    extractor::{extract_run_dir, MetricOutcome},
    plotter::{single_run_chart, ComparisonSet},
    records::{csv_path, read_series, MetricKind},
    store::ResultStore,
};

const PING: &str = "\
1700000000.000000, PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.
1700000000.100000, 64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=20.4 ms
1700000001.100000, 64 bytes from 10.0.0.2: icmp_seq=2 ttl=64 time=35.1 ms
1700000002.100000, 64 bytes from 10.0.0.2: icmp_seq=3 ttl=64 time=51.9 ms
";

const SS: &str = "\
1700000000.000000, State Recv-Q Send-Q Local Address:Port Peer Address:Port
1700000000.500000, ESTAB 0 0 10.0.0.1:5001 10.0.0.2:44 cubic wscale:7,7 mss:1448 cwnd:10
1700000001.000000, ESTAB 0 0 10.0.0.1:5001 10.0.0.2:44 cubic wscale:7,7 mss:1448 cwnd:20
";

const QLEN: &str = "\
1700000000.000000, 0
1700000000.250000, 4
1700000000.500000, 17
";

fn run_with_all_metrics(dir: &std::path::Path) {
    write_file(dir, "rtt.txt", PING);
    write_file(dir, "cwnd.txt", SS);
    write_file(dir, "qlen.txt", QLEN);
}

#[test]
fn extraction_is_idempotent() {
    let base = tempfile::tempdir().unwrap();
    let run = base.path().join("qlen-100");
    run_with_all_metrics(&run);
    let store = ResultStore::new(base.path().join("results"));

    let report = extract_run_dir(&run, &store).unwrap();
    assert_eq!(report.written().count(), 3);
    let first = MetricKind::ALL.map(|k| fs::read(csv_path(&run, k)).unwrap());

    extract_run_dir(&run, &store).unwrap();
    let second = MetricKind::ALL.map(|k| fs::read(csv_path(&run, k)).unwrap());
    assert_eq!(first, second);

    let rtt = read_series(csv_path(&run, MetricKind::Rtt), MetricKind::Rtt)
        .unwrap()
        .unwrap();
    assert_eq!(rtt.values(), vec![20.4, 35.1, 51.9]);
    assert!((rtt.times()[0] - 0.1).abs() < 1e-6);
}

#[test]
fn no_matching_line_writes_no_csv() {
    let base = tempfile::tempdir().unwrap();
    let run = base.path().join("qlen-10");
    write_file(&run, "rtt.txt", "1.0, PING 10.0.0.2 (10.0.0.2) 56(84) bytes of data.\n");
    let store = ResultStore::new(base.path().join("results"));

    let report = extract_run_dir(&run, &store).unwrap();
    assert_eq!(report.written().count(), 0);
    assert!(report
        .metrics
        .contains(&(MetricKind::Rtt, MetricOutcome::Empty)));
    assert!(report
        .metrics
        .contains(&(MetricKind::Qlen, MetricOutcome::Missing)));
    assert!(!csv_path(&run, MetricKind::Rtt).exists());
}

#[test]
fn extracted_run_has_one_panel_per_metric() {
    let base = tempfile::tempdir().unwrap();
    let run = base.path().join("run");
    run_with_all_metrics(&run);
    extract_run_dir(&run, &ResultStore::new(base.path().join("results"))).unwrap();

    let chart = single_run_chart(&run, false).unwrap();
    assert!(!chart.is_placeholder());
    assert_eq!(chart.num_panels(), 3);

    // raw logs alone are not plotted
    let raw_only = base.path().join("raw_only");
    run_with_all_metrics(&raw_only);
    assert!(single_run_chart(&raw_only, false).unwrap().is_placeholder());
}

#[test]
fn comparison_skips_runs_without_the_metric() {
    let base = tempfile::tempdir().unwrap();
    let store = ResultStore::new(base.path().join("results"));
    let cubic = base.path().join("cubic");
    let bbr = base.path().join("bbr");
    let none = base.path().join("none");
    run_with_all_metrics(&cubic);
    write_file(&bbr, "rtt.txt", PING);
    write_file(&none, "qlen.txt", QLEN);
    for dir in [&cubic, &bbr, &none] {
        extract_run_dir(dir, &store).unwrap();
    }

    let runs = [("cubic", &cubic), ("bbr", &bbr), ("none", &none)];
    let set = ComparisonSet::load(&runs, MetricKind::Rtt);
    assert_eq!(set.len(), 2);
    let chart = set.chart(true).unwrap();
    assert_eq!(chart.num_curves(), 2);

    let summaries = set.summaries();
    assert_eq!(summaries[0].0, "cubic");
    assert_eq!(summaries[1].1.max, 51.9);

    assert!(ComparisonSet::load(&runs, MetricKind::Cwnd).len() == 1);
    assert!(ComparisonSet::load(&runs[1..], MetricKind::Cwnd).is_empty());
}
