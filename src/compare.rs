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
use std::{path::PathBuf, process};

use clap::Parser;

use netsweep::{
    plotter::{self, ComparisonSet},
    records::MetricKind,
    util,
};
use netsweep_utils::fs::dir_name;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Run directories, either `LABEL=PATH` or `PATH` (labelled with the directory name).
    #[arg(required = true)]
    runs: Vec<String>,
    /// Metric to compare.
    #[arg(short, long, default_value = "rtt")]
    metric: MetricKind,
    /// Output file.
    #[arg(short, long, default_value = "comparison.html")]
    output: PathBuf,
    /// Use a logarithmic value axis.
    #[arg(short, long)]
    log: bool,
}

fn parse_run(arg: &str) -> (String, PathBuf) {
    match arg.split_once('=') {
        Some((label, path)) if !label.is_empty() => (label.to_string(), PathBuf::from(path)),
        _ => {
            let path = PathBuf::from(arg);
            (dir_name(&path), path)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let runs = args.runs.iter().map(|r| parse_run(r)).collect::<Vec<_>>();
    let set = ComparisonSet::load(&runs, args.metric);
    if set.is_empty() {
        log::error!("None of the {} run directories has {} data", runs.len(), args.metric);
        process::exit(1);
    }

    for (label, summary) in set.summaries() {
        log::info!("{label}: {summary}");
    }

    let chart = set.chart(args.log)?;
    let path = plotter::write_chart(&chart, &args.output)?;
    log::info!("{} of {} curves written to {}", set.len(), runs.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_arguments() {
        assert_eq!(parse_run("cubic=data/a"), ("cubic".to_string(), PathBuf::from("data/a")));
        assert_eq!(parse_run("data/10_100ms_1M_1"), ("10_100ms_1M_1".to_string(), PathBuf::from("data/10_100ms_1M_1")));
        assert_eq!(parse_run("=x"), ("=x".to_string(), PathBuf::from("=x")));
    }
}
