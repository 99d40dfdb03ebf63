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
//! Parsing rules for the individual metrics.
//!
//! A raw log line looks like `<timestamp>, <probe output>`. The leading field (everything before the
//! first comma) must parse as a finite number, otherwise the whole line is ignored. Everything after
//! it is opaque until a rule inspects it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::records::MetricKind;

/// Segment size assumed when an `ss` dump carries no `mss:` token.
pub const DEFAULT_MSS: f64 = 1448.0;

lazy_static! {
    static ref CWND: Regex = Regex::new(r"\bcwnd:(\d+)").unwrap();
    static ref MSS: Regex = Regex::new(r"\bmss:(\d+)").unwrap();
    static ref RTT: Regex = Regex::new(r"\btime=(\d+(?:\.\d*)?)\s*ms").unwrap();
}

/// Parse the leading timestamp of a line.
pub fn leading_timestamp(line: &str) -> Option<f64> {
    let field = line.split(',').next()?.trim();
    field.parse::<f64>().ok().filter(|ts| ts.is_finite())
}

/// A rule deciding whether a (timestamped) line contributes a sample, and with which value.
pub trait MetricRule {
    /// The metric produced by this rule.
    fn kind() -> MetricKind;

    /// Value of the sample contributed by `line`, if any. Only called for lines with a valid
    /// leading timestamp.
    fn value(line: &str) -> Option<f64>;
}

/// `cwnd:<n>` scaled by `mss:<n>` (default 1448) into kilobytes.
pub struct CwndRule;

impl MetricRule for CwndRule {
    fn kind() -> MetricKind {
        MetricKind::Cwnd
    }

    fn value(line: &str) -> Option<f64> {
        let cwnd: f64 = CWND.captures(line)?.get(1)?.as_str().parse().ok()?;
        let mss = MSS
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(DEFAULT_MSS);
        Some(cwnd * mss / 1024.0)
    }
}

/// Second comma-separated field, taken as is.
pub struct QlenRule;

impl MetricRule for QlenRule {
    fn kind() -> MetricKind {
        MetricKind::Qlen
    }

    fn value(line: &str) -> Option<f64> {
        let field = line.split(',').nth(1)?.trim();
        field.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// `time=<float>ms` as printed by `ping`.
pub struct RttRule;

impl MetricRule for RttRule {
    fn kind() -> MetricKind {
        MetricKind::Rtt
    }

    fn value(line: &str) -> Option<f64> {
        RTT.captures(line)?.get(1)?.as_str().parse().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timestamps() {
        assert_eq!(leading_timestamp("1700000000.25, cwnd:10"), Some(1700000000.25));
        assert_eq!(leading_timestamp("  3.5  ,x"), Some(3.5));
        assert_eq!(leading_timestamp("42"), Some(42.0));
        assert_eq!(leading_timestamp("# comment, 1"), None);
        assert_eq!(leading_timestamp(""), None);
        assert_eq!(leading_timestamp("nan, 1"), None);
        assert_eq!(leading_timestamp("inf, 1"), None);
        assert_eq!(leading_timestamp("64 bytes from 10.0.0.2: time=1 ms"), None);
    }

    #[test]
    fn cwnd() {
        assert_eq!(
            CwndRule::value("1.0, cubic wscale:7,7 rto:204 mss:1448 cwnd:10 ssthresh:7"),
            Some(14.140625)
        );
        assert_eq!(CwndRule::value("1.0, cwnd:2 mss:1024"), Some(2.0));
        // default mss
        assert_eq!(CwndRule::value("1.0, cwnd:1024"), Some(1448.0));
        // `advmss` and `snd_cwnd` are different tokens
        assert_eq!(CwndRule::value("1.0, cwnd:1 advmss:65483"), Some(DEFAULT_MSS / 1024.0));
        assert_eq!(CwndRule::value("1.0, snd_cwnd:10"), None);
        assert_eq!(CwndRule::value("1.0, ESTAB 0 0"), None);
    }

    #[test]
    fn qlen() {
        assert_eq!(QlenRule::value("1.0, 17"), Some(17.0));
        assert_eq!(QlenRule::value("1.0,3,extra"), Some(3.0));
        assert_eq!(QlenRule::value("1.0"), None);
        assert_eq!(QlenRule::value("1.0, 17p"), None);
    }

    #[test]
    fn rtt() {
        assert_eq!(
            RttRule::value("2.0, 64 bytes from 10.0.0.2: icmp_seq=1 ttl=64 time=40.7 ms"),
            Some(40.7)
        );
        assert_eq!(RttRule::value("2.0, time=12ms"), Some(12.0));
        assert_eq!(RttRule::value("2.0, time=0.052 ms"), Some(0.052));
        assert_eq!(RttRule::value("2.0, PING 10.0.0.2 56(84) bytes of data."), None);
        assert_eq!(RttRule::value("2.0, time=40.7 us"), None);
    }
}
