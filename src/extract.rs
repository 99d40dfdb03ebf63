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

use netsweep::{extractor::extract_run_dir, store::ResultStore, util};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Glob patterns of the run directories, relative to --base.
    #[arg(default_value = "qlen-*")]
    patterns: Vec<String>,
    /// Directory the patterns are resolved in.
    #[arg(short, long, default_value = ".")]
    base: PathBuf,
    /// Where the CSV files go if a run directory is not writable.
    #[arg(short, long, default_value = "./results/")]
    results_root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    util::init_logging();
    let args = Args::parse();

    let dirs = util::find_run_dirs(&args.base, &args.patterns);
    if dirs.is_empty() {
        log::error!(
            "No run directory in {} matches {}",
            args.base.display(),
            args.patterns.join(" ")
        );
        process::exit(1);
    }
    log::info!("Extracting metrics of {} run directories", dirs.len());

    let store = ResultStore::new(&args.results_root);
    let reports = util::par_map_dirs(&dirs, |dir| extract_run_dir(dir, &store));

    let mut failed = 0;
    for (dir, report) in dirs.iter().zip(reports) {
        match report {
            Ok(report) => {
                let written = report.written().map(|(kind, _)| kind.to_string()).collect::<Vec<_>>();
                if written.is_empty() {
                    log::warn!("{}: no metric found", dir.display());
                } else {
                    log::info!("{}: {}", dir.display(), written.join(", "));
                }
            }
            Err(e) => {
                log::error!("{}: {e}", dir.display());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("could not store the results of {failed} run directories");
    }
    Ok(())
}
