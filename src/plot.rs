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
    plotter::{self, PlotError},
    util,
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Directory holding the CSV files of one run.
    run_dir: PathBuf,
    /// Output file; defaults to `plot.html` inside the run directory.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Use a logarithmic value axis.
    #[arg(short, long)]
    log: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let chart = match plotter::single_run_chart(&args.run_dir, args.log) {
        Ok(chart) => chart,
        Err(e @ PlotError::MissingDir(_)) => {
            log::error!("{e}");
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let output = args
        .output
        .unwrap_or_else(|| args.run_dir.join("plot.html"));
    let path = plotter::write_chart(&chart, output)?;

    if chart.is_placeholder() {
        log::warn!("No metric in {}, wrote a placeholder to {}", args.run_dir.display(), path.display());
        process::exit(2);
    }
    log::info!("{} panels written to {}", chart.num_panels(), path.display());
    Ok(())
}
