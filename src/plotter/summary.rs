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
//! Summary statistics of a metric series.

use std::fmt;

use statrs::statistics::{Data, Max, Median, Min, OrderStatistics};

use crate::records::MetricSeries;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub samples: usize,
    pub duration: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesSummary {
    /// Statistics over the values of `series`; `None` if it is empty.
    pub fn of(series: &MetricSeries) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        let values = series.values();
        let mean = statrs::statistics::Statistics::mean(values.iter());
        let times = series.times();
        let duration = times.last().copied().unwrap_or_default() - times[0];
        let mut data = Data::new(values);
        Some(Self {
            samples: series.len(),
            duration,
            mean,
            median: data.median(),
            p95: data.percentile(95),
            min: data.min(),
            max: data.max(),
        })
    }
}

impl fmt::Display for SeriesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples over {:.1}s, mean {:.3}, median {:.3}, p95 {:.3}, max {:.3}",
            self.samples, self.duration, self.mean, self.median, self.p95, self.max
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::records::{MetricKind, TimeSeriesSample};

    #[test]
    fn summary_of_rtt() {
        let series = MetricSeries::new(
            MetricKind::Rtt,
            (0..100)
                .map(|i| TimeSeriesSample {
                    t: i as f64 * 0.1,
                    v: (i + 1) as f64,
                })
                .collect(),
        );
        let s = SeriesSummary::of(&series).unwrap();
        assert_eq!(s.samples, 100);
        assert!((s.duration - 9.9).abs() < 1e-9);
        assert!((s.mean - 50.5).abs() < 1e-9);
        assert!((s.median - 50.5).abs() < 1e-9);
        assert!(s.p95 > 94.0 && s.p95 < 97.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 100.0);
    }

    #[test]
    fn empty_series_has_no_summary() {
        assert!(SeriesSummary::of(&MetricSeries::empty(MetricKind::Qlen)).is_none());
    }
}
