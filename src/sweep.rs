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
use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use tokio::sync::watch;

use netsweep::{
    emulation::{Emulator, LocalEmulator, NetnsEmulator},
    experiments::{ExperimentDescription, ExperimentDriver, RunStatus},
    extractor::extract_run_dir,
    store::ResultStore,
    util,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// One network namespace per host, links as veth pairs shaped with tc.
    Netns,
    /// All hosts are the local machine; links are only recorded.
    Local,
}

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// The experiment description (JSON).
    config: PathBuf,
    /// Raw log files go to <DATA_ROOT>/<experiment name>/<run name>/.
    #[arg(short, long, default_value = "./data/")]
    data_root: PathBuf,
    #[arg(short, long, value_enum, default_value_t = Backend::Netns)]
    backend: Backend,
    /// Prefix of the network namespaces.
    #[arg(long, default_value = "nsw-")]
    prefix: String,
    /// Skip parameter sets that already have a run record.
    #[arg(short, long)]
    resume: bool,
    /// Only print the parameter sets that would be run.
    #[arg(long)]
    dry_run: bool,
    /// Extract the metrics of every completed run afterwards.
    #[arg(short, long)]
    extract: bool,
    /// Where extracted CSV files go (with --extract).
    #[arg(long, default_value = "./results/")]
    results_root: PathBuf,
    /// Do not check that the required programs are installed.
    #[arg(long)]
    skip_preflight: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    util::init_logging();
    let args = Args::parse();

    let description = match ExperimentDescription::from_file(&args.config) {
        Ok(d) => d,
        Err(e) => {
            log::error!("{}: {e}", args.config.display());
            return ExitCode::from(1);
        }
    };
    let sets = description.matrix.enumerate();
    log::info!(
        "Experiment {}: {} parameter sets",
        description.name,
        sets.len()
    );

    if args.dry_run {
        for params in sets.iter() {
            println!("{}", params.name());
        }
        return ExitCode::SUCCESS;
    }

    if !args.skip_preflight {
        let mut missing = description.missing_programs();
        if args.backend == Backend::Netns {
            missing.extend(["ip", "tc"].into_iter().filter(|p| util::which(p).is_none()));
        }
        if !missing.is_empty() {
            log::error!("Required programs not found: {}", missing.join(", "));
            return ExitCode::from(2);
        }
    }

    let workdir = description.workdir();
    let emulator: Box<dyn Emulator> = match args.backend {
        Backend::Netns => Box::new(NetnsEmulator::new(args.prefix.clone(), workdir)),
        Backend::Local => Box::new(LocalEmulator::new(workdir)),
    };
    log::info!("Using the {} backend", emulator.description());
    let out_dir = args.data_root.join(&description.name);
    let driver = ExperimentDriver::new(emulator, description, &out_dir).cancel_on(ctrl_c_requests());

    let summary = driver.run_matrix(&sets, args.resume).await;
    log::info!(
        "Completed: {}, skipped: {}, failed: {}, cancelled: {}",
        summary.count(RunStatus::Completed),
        summary.count(RunStatus::Skipped),
        summary.count(RunStatus::Failed),
        summary.count(RunStatus::Cancelled),
    );
    if let Some(csv) = summary.csv.as_ref() {
        log::info!("Summary written to {}", csv.display());
    }

    let done = summary
        .runs
        .iter()
        .filter(|r| matches!(r.status, RunStatus::Completed | RunStatus::Skipped))
        .map(|r| driver.run_dir(&r.params))
        .collect::<Vec<_>>();
    // from here on, Ctrl-C exits
    drop(driver);

    if args.extract {
        let store = ResultStore::new(&args.results_root);
        for run_dir in done {
            match extract_run_dir(&run_dir, &store) {
                Ok(report) => {
                    for (kind, path) in report.written() {
                        log::info!("{kind}: {}", path.display());
                    }
                }
                Err(e) => log::error!("{}: {e}", run_dir.display()),
            }
        }
    }

    if summary.interrupted {
        log::warn!("The sweep was interrupted; continue it with --resume");
    }
    ExitCode::SUCCESS
}

/// Count Ctrl-C presses. Once nothing listens any more, Ctrl-C exits the process.
fn ctrl_c_requests() -> watch::Receiver<u64> {
    let (requests, receiver) = watch::channel(0);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if requests.is_closed() {
                std::process::exit(130);
            }
            requests.send_modify(|n| *n += 1);
        }
        log::warn!("Cannot listen for Ctrl-C");
    });
    receiver
}
