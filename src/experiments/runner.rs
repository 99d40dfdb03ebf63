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
//! Runs parameter sets on an emulated network and captures their raw log files.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    process::Stdio,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use netsweep_utils::{fs::PathBufExt, other::get_timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{
    collector::terminate_groups, seconds, Axis, CollectorSpec, ConfigError, ExperimentDescription,
    HostCommand, ParameterSet, RunningCollector, WorkloadStep, RUN_RECORD,
};
use crate::emulation::{CommandOutput, EmulationError, Emulator, Environment};

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("Cannot provision the environment: {0}")]
    Provision(EmulationError),
    #[error("Setup command {command:?} on {host} failed: {reason}")]
    Setup {
        host: String,
        command: String,
        reason: String,
    },
    #[error("Cannot start background command {label}: {source}")]
    Collector {
        label: String,
        source: EmulationError,
    },
    #[error("Workload step {step} failed: {reason}")]
    Workload { step: usize, reason: String },
    #[error("Teardown failed: {0}")]
    Teardown(String),
    #[error("The run was cancelled")]
    Cancelled,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot write the run record: {0}")]
    Record(#[from] serde_json::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Record of a successful run, stored as `run.json` in its directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub params: ParameterSet,
    pub name: String,
    /// RFC 3339 start time.
    pub started: String,
    pub duration_s: f64,
    /// Whether all workload steps ran before `max_duration_s` was reached.
    pub workload_complete: bool,
    /// Raw log files of the run, relative to the run directory.
    pub raw_logs: Vec<String>,
}

impl RunRecord {
    /// Read the record of the run in `run_dir`, if there is a valid one.
    pub fn load(run_dir: impl AsRef<Path>) -> Option<Self> {
        let content = fs::read_to_string(run_dir.as_ref().join(RUN_RECORD)).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("Invalid run record in {:?}: {e}", run_dir.as_ref());
                None
            }
        }
    }

    fn store(&self, run_dir: &Path) -> Result<(), ExperimentError> {
        fs::write(run_dir.join(RUN_RECORD), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Skipped because a record of an earlier successful run exists.
    Skipped,
    Failed,
    Cancelled,
}

/// One row of the sweep summary.
#[derive(Debug)]
pub struct RunSummary {
    pub params: ParameterSet,
    pub status: RunStatus,
    pub duration: Duration,
    pub error: Option<String>,
}

const RECORD_SIZE: usize = 9;

impl RunSummary {
    pub fn record_title() -> [&'static str; RECORD_SIZE] {
        [
            "run",
            "bandwidth",
            "delay",
            "size",
            "queue",
            "repetition",
            "status",
            "duration_s",
            "error",
        ]
    }

    pub fn record(&self) -> [String; RECORD_SIZE] {
        let p = &self.params;
        [
            p.name(),                                     // run
            p.value(Axis::Bandwidth),                     // bandwidth
            p.value(Axis::Delay),                         // delay
            p.value(Axis::Size),                          // size
            p.value(Axis::Queue),                         // queue
            p.value(Axis::Repetition),                    // repetition
            self.status.to_string(),                      // status
            format!("{:.3}", self.duration.as_secs_f64()), // duration_s
            self.error.clone().unwrap_or_default(),       // error
        ]
    }
}

/// Outcome of a whole sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub runs: Vec<RunSummary>,
    /// Where the summary CSV was written, if it could be.
    pub csv: Option<PathBuf>,
    /// Whether the sweep was stopped before all parameter sets were attempted.
    pub interrupted: bool,
}

impl SweepSummary {
    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|r| r.status == status).count()
    }
}

/// Executes parameter sets one after the other, each in a fresh environment.
pub struct ExperimentDriver<E> {
    emulator: E,
    description: ExperimentDescription,
    out_dir: PathBuf,
    /// Number of cancellation requests so far.
    cancel_requests: Option<watch::Receiver<u64>>,
    /// Number of cancellation requests already acted upon.
    cancels_handled: AtomicU64,
}

impl<E: Emulator> ExperimentDriver<E> {
    /// Raw log files of the run for `params` go to `<out_dir>/<run name>/`.
    pub fn new(emulator: E, description: ExperimentDescription, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            emulator,
            description,
            out_dir: out_dir.into(),
            cancel_requests: None,
            cancels_handled: AtomicU64::new(0),
        }
    }

    /// Cancel on every increment of `requests`: a request during a run aborts that run, a request
    /// between runs stops the sweep. A request arriving while nothing can be cancelled (e.g. during
    /// teardown) is acted upon at the next opportunity.
    pub fn cancel_on(mut self, requests: watch::Receiver<u64>) -> Self {
        self.cancels_handled = AtomicU64::new(*requests.borrow());
        self.cancel_requests = Some(requests);
        self
    }

    pub fn description(&self) -> &ExperimentDescription {
        &self.description
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn run_dir(&self, params: &ParameterSet) -> PathBuf {
        self.out_dir.join(params.name())
    }

    /// Resolves once there is a cancellation request that was not acted upon yet.
    async fn cancelled(&self) {
        if let Some(requests) = self.cancel_requests.as_ref() {
            let mut requests = requests.clone();
            let handled = self.cancels_handled.load(Ordering::SeqCst);
            let pending = requests.wait_for(|&n| n > handled).await.map(|n| *n);
            if let Ok(n) = pending {
                self.cancels_handled.store(n, Ordering::SeqCst);
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Run one parameter set: provision, setup, start the collectors, run the workload, stop the
    /// collectors and release the environment. Raw log files of an earlier attempt are overwritten.
    ///
    /// The run record is only written when every step succeeded.
    pub async fn run(&self, params: &ParameterSet) -> Result<RunRecord, ExperimentError> {
        let run_dir = self.run_dir(params);
        fs::create_dir_all(&run_dir)?;
        // a stale record must not survive a failing re-run
        match fs::remove_file(run_dir.join(RUN_RECORD)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let teardown_timeout = seconds(self.description.teardown_timeout_s, "teardown_timeout_s")?;
        let bound = self
            .description
            .workload
            .max_duration_s
            .map(|max| seconds(max, "max_duration_s"))
            .transpose()?;

        let started = chrono::Local::now();
        let start_time = Instant::now();
        log::info!("[{params}] starting run in {run_dir:?}");

        let topology = self
            .description
            .topology
            .resolve(params)
            .map_err(ExperimentError::Provision)?;
        let env = self
            .emulator
            .start(&topology)
            .await
            .map_err(ExperimentError::Provision)?;
        log::debug!("[{params}] hosts: {}", env.host_names().join(", "));

        let mut collectors = Vec::new();
        let mut foreground = Vec::new();
        let mut raw_logs = Vec::new();
        let outcome = tokio::select! {
            result = self.run_in(
                env.as_ref(),
                params,
                &run_dir,
                bound,
                &mut collectors,
                &mut foreground,
                &mut raw_logs,
            ) => result,
            _ = self.cancelled() => {
                log::warn!("[{params}] cancelled");
                Err(ExperimentError::Cancelled)
            }
        };

        let teardown = match tokio::time::timeout(
            teardown_timeout,
            self.teardown(env.as_ref(), collectors, &foreground),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!("not finished after {teardown_timeout:?}")),
        };

        let workload_complete = match (outcome, teardown) {
            (Err(e), teardown) => {
                if let Err(t) = teardown {
                    log::warn!("[{params}] teardown after failure: {t}");
                }
                return Err(e);
            }
            (Ok(_), Err(t)) => return Err(ExperimentError::Teardown(t)),
            (Ok(complete), Ok(())) => complete,
        };

        raw_logs.sort();
        raw_logs.dedup();
        let record = RunRecord {
            params: params.clone(),
            name: params.name(),
            started: started.to_rfc3339(),
            duration_s: start_time.elapsed().as_secs_f64(),
            workload_complete,
            raw_logs,
        };
        record.store(&run_dir)?;
        log::info!(
            "[{params}] finished in {}",
            HumanDuration(start_time.elapsed())
        );
        Ok(record)
    }

    /// Everything between provisioning and teardown. Returns whether the workload completed
    /// within `bound`. Process groups of the foreground steps are added to `foreground`.
    #[allow(clippy::too_many_arguments)]
    async fn run_in(
        &self,
        env: &dyn Environment,
        params: &ParameterSet,
        run_dir: &Path,
        bound: Option<Duration>,
        collectors: &mut Vec<RunningCollector>,
        foreground: &mut Vec<u32>,
        raw_logs: &mut Vec<String>,
    ) -> Result<bool, ExperimentError> {
        for cmd in self.description.setup.iter() {
            self.setup(env, cmd, params, run_dir).await?;
        }

        for spec in self.description.background.iter() {
            collectors.push(self.start_collector(env, spec, params, run_dir).await?);
            raw_logs.push(spec.output.clone());
        }

        let workload = self.run_workload(env, params, run_dir, foreground, raw_logs);
        match bound {
            Some(max) => {
                match tokio::time::timeout(max, workload).await {
                    Ok(result) => result.map(|_| true),
                    Err(_) => {
                        log::warn!("[{params}] workload reached its bound of {max:?}");
                        Ok(false)
                    }
                }
            }
            None => workload.await.map(|_| true),
        }
    }

    async fn setup(
        &self,
        env: &dyn Environment,
        cmd: &HostCommand,
        params: &ParameterSet,
        run_dir: &Path,
    ) -> Result<(), ExperimentError> {
        let command = params.substitute(&cmd.command, run_dir);
        let failed = |reason: String| ExperimentError::Setup {
            host: cmd.host.clone(),
            command: command.clone(),
            reason,
        };
        let host = env.host(&cmd.host).map_err(|e| failed(e.to_string()))?;
        let output = host
            .execute(&command)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !output.success() {
            if cmd.check {
                return Err(failed(format!("{output}: {}", output.combined().trim())));
            }
            log::warn!(
                "[{params}] setup command {command:?} on {} returned {output}",
                cmd.host
            );
        }
        Ok(())
    }

    async fn start_collector(
        &self,
        env: &dyn Environment,
        spec: &CollectorSpec,
        params: &ParameterSet,
        run_dir: &Path,
    ) -> Result<RunningCollector, ExperimentError> {
        let failed = |source: EmulationError| ExperimentError::Collector {
            label: spec.output.clone(),
            source,
        };
        let host = env.host(&spec.host).map_err(failed)?;
        RunningCollector::start(
            host,
            &params.substitute(&spec.command, run_dir),
            spec.mode,
            run_dir,
            &spec.output,
        )
        .await
        .map_err(failed)
    }

    async fn run_workload(
        &self,
        env: &dyn Environment,
        params: &ParameterSet,
        run_dir: &Path,
        foreground: &mut Vec<u32>,
        raw_logs: &mut Vec<String>,
    ) -> Result<(), ExperimentError> {
        // labels already written in this run are appended to
        let mut written: HashSet<String> = HashSet::new();

        for (i, step) in self.description.workload.steps.iter().enumerate() {
            let failed = |reason: String| ExperimentError::Workload { step: i, reason };
            match step {
                WorkloadStep::Exec {
                    host,
                    command,
                    output,
                    check,
                } => {
                    let command = params.substitute(command, run_dir);
                    log::debug!("[{params}] step {i}: {host}: {command}");
                    let host = env.host(host).map_err(|e| failed(e.to_string()))?;
                    let status = match output {
                        Some(label) => {
                            let file = fs::OpenOptions::new()
                                .write(true)
                                .create(true)
                                .append(written.contains(label))
                                .truncate(!written.contains(label))
                                .open(run_dir.join(label))?;
                            if written.insert(label.clone()) {
                                raw_logs.push(label.clone());
                            }
                            let mut child = host
                                .spawn(&command, file.try_clone()?.into(), file.into())
                                .map_err(|e| failed(e.to_string()))?;
                            foreground.extend(child.id());
                            let status = child.wait().await?;
                            status.code()
                        }
                        None => {
                            let child = host
                                .spawn(&command, Stdio::piped(), Stdio::piped())
                                .map_err(|e| failed(e.to_string()))?;
                            foreground.extend(child.id());
                            let output = CommandOutput::from_output(child.wait_with_output().await?);
                            log::trace!("[{params}] step {i} output: {}", output.combined());
                            output.status
                        }
                    };
                    if status != Some(0) {
                        let reason = match status {
                            Some(code) => format!("{command:?} exited with code {code}"),
                            None => format!("{command:?} was terminated by a signal"),
                        };
                        if *check {
                            return Err(failed(reason));
                        }
                        log::warn!("[{params}] step {i}: {reason}");
                    }
                }
                WorkloadStep::Sleep { secs } => {
                    tokio::time::sleep(seconds(*secs, "sleep")?).await;
                }
                WorkloadStep::DisableLink { a, b } => {
                    if !env
                        .disable_link(a, b)
                        .await
                        .map_err(|e| failed(e.to_string()))?
                    {
                        log::warn!("[{params}] step {i}: there is no link {a} -- {b}");
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop whatever the foreground steps left running, all collectors, then the environment.
    /// Best-effort: every part is attempted.
    async fn teardown(
        &self,
        env: &dyn Environment,
        collectors: Vec<RunningCollector>,
        foreground: &[u32],
    ) -> Result<(), String> {
        let grace = Duration::from_millis(self.description.stop_grace_ms);
        terminate_groups(foreground, grace).await;
        let mut errors = Vec::new();
        for collector in collectors {
            let label = collector.label().to_string();
            if let Err(e) = collector.stop(grace).await {
                log::warn!("Cannot stop background command {label}: {e}");
                errors.push(format!("{label}: {e}"));
            }
        }
        if let Err(e) = env.stop().await {
            log::warn!("Cannot release the environment: {e}");
            errors.push(e.to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// Run all `sets` in order. With `resume`, sets with a run record are skipped. A failing set is
    /// recorded and the sweep moves on. Writes `sweep_<timestamp>.csv` into the output directory.
    pub async fn run_matrix(&self, sets: &[ParameterSet], resume: bool) -> SweepSummary {
        let bar = ProgressBar::new(sets.len() as u64);
        if let Ok(style) = ProgressStyle::with_template("{wide_bar} {pos}/{len} time: {elapsed}, eta: {msg} ") {
            bar.set_style(style);
        }
        bar.set_message("?");
        bar.tick();

        let mut summary = SweepSummary::default();
        let start_time = Instant::now();
        let mut executed = 0u32;
        let settle = match seconds(self.description.settle_s, "settle_s") {
            Ok(settle) => settle,
            Err(e) => {
                log::warn!("{e}, not pausing between runs");
                Duration::ZERO
            }
        };

        for (i, params) in sets.iter().enumerate() {
            if resume && RunRecord::load(self.run_dir(params)).is_some() {
                bar.suspend(|| log::info!("[{params}] already done, skipping"));
                summary.runs.push(RunSummary {
                    params: params.clone(),
                    status: RunStatus::Skipped,
                    duration: Duration::ZERO,
                    error: None,
                });
                bar.inc(1);
                continue;
            }

            let run_start = Instant::now();
            let result = self.run(params).await;
            let (status, error) = match result {
                Ok(_) => (RunStatus::Completed, None),
                Err(ExperimentError::Cancelled) => {
                    (RunStatus::Cancelled, Some(ExperimentError::Cancelled.to_string()))
                }
                Err(e) => {
                    bar.suspend(|| log::warn!("[{params}] run failed: {e}"));
                    (RunStatus::Failed, Some(e.to_string()))
                }
            };
            summary.runs.push(RunSummary {
                params: params.clone(),
                status,
                duration: run_start.elapsed(),
                error,
            });
            executed += 1;

            bar.inc(1);
            let per_run = start_time.elapsed() / executed;
            let remaining = (sets.len() - i - 1) as u32;
            bar.set_message(HumanDuration(per_run * remaining).to_string());

            if i + 1 < sets.len() {
                let stop = tokio::select! {
                    biased;
                    _ = self.cancelled() => true,
                    _ = tokio::time::sleep(settle) => false,
                };
                if stop {
                    bar.suspend(|| log::warn!("Interrupted between runs, stopping the sweep"));
                    summary.interrupted = true;
                    break;
                }
            }
        }
        bar.finish_and_clear();

        summary.csv = match self.write_summary(&summary) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Cannot write the sweep summary: {e}");
                None
            }
        };
        summary
    }

    fn write_summary(&self, summary: &SweepSummary) -> Result<PathBuf, csv::Error> {
        fs::create_dir_all(&self.out_dir)?;
        let filename = self
            .out_dir
            .as_path()
            .then_ext(format!("sweep_{}", get_timestamp()), "csv");
        let mut csv_writer = csv::Writer::from_path(&filename)?;
        csv_writer.write_record(RunSummary::record_title())?;
        for run in summary.runs.iter() {
            csv_writer.write_record(run.record())?;
        }
        csv_writer.flush()?;
        Ok(filename)
    }
}
