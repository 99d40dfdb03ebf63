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
//! Background collectors: processes running next to the workload, each writing one raw log file.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use netsweep_utils::other::unix_timestamp;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Child,
    sync::watch,
    task::JoinHandle,
};

use super::CollectorMode;
use crate::emulation::{kill_command, EmulationError, HostHandle};

/// A started collector. Must be stopped with [`RunningCollector::stop`]; dropping it kills the
/// process without waiting for it.
pub struct RunningCollector {
    label: String,
    path: PathBuf,
    task: CollectorTask,
}

enum CollectorTask {
    /// A long-running process. `pump` prefixes its output lines with timestamps, if enabled.
    Process {
        child: Child,
        pump: Option<JoinHandle<std::io::Result<()>>>,
    },
    /// A command invoked periodically until `stop` is set.
    Sampler {
        stop: watch::Sender<bool>,
        handle: JoinHandle<std::io::Result<()>>,
    },
}

/// Format one line of a timestamped raw log file.
pub fn timestamped_line(ts: f64, text: &str) -> String {
    format!("{ts:.6}, {text}\n")
}

impl RunningCollector {
    /// Start `command` on `host`, writing to `<run_dir>/<label>`. An existing file is truncated.
    pub async fn start(
        host: Arc<dyn HostHandle>,
        command: &str,
        mode: CollectorMode,
        run_dir: &Path,
        label: &str,
    ) -> Result<Self, EmulationError> {
        let path = run_dir.join(label);
        log::debug!("[{}] starting {command:?} -> {path:?} ({mode:?})", host.name());
        let task = match mode {
            CollectorMode::Raw => {
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?;
                let child = host.spawn(command, Stdio::from(file.try_clone()?), Stdio::from(file))?;
                CollectorTask::Process { child, pump: None }
            }
            CollectorMode::Timestamped => {
                let mut file = File::create(&path).await?;
                let mut child = host.spawn(
                    &format!("exec 2>&1; {command}"),
                    Stdio::piped(),
                    Stdio::null(),
                )?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    EmulationError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "stdout of the collector is not piped",
                    ))
                })?;
                let pump = tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Some(line) = lines.next_line().await? {
                        file.write_all(timestamped_line(unix_timestamp(), &line).as_bytes())
                            .await?;
                        file.flush().await?;
                    }
                    Ok::<(), std::io::Error>(())
                });
                CollectorTask::Process {
                    child,
                    pump: Some(pump),
                }
            }
            CollectorMode::Sampled { interval_ms } => {
                let file = File::create(&path).await?;
                let (stop, stopped) = watch::channel(false);
                let handle = tokio::spawn(sample(
                    host.clone(),
                    command.to_string(),
                    Duration::from_millis(interval_ms.max(1)),
                    file,
                    stopped,
                ));
                CollectorTask::Sampler { stop, handle }
            }
        };
        Ok(Self {
            label: label.to_string(),
            path,
            task,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the collector: SIGTERM to its process group, SIGKILL if it is still alive after
    /// `grace`. Samplers finish their current invocation's write and stop.
    pub async fn stop(self, grace: Duration) -> Result<(), EmulationError> {
        match self.task {
            CollectorTask::Process { mut child, pump } => {
                match child.try_wait()? {
                    Some(status) => {
                        if !status.success() {
                            log::warn!("[{}] collector exited early with {status}", self.label);
                        }
                    }
                    None => {
                        if let Some(pid) = child.id() {
                            signal_group(pid, "TERM").await;
                        }
                        match tokio::time::timeout(grace, child.wait()).await {
                            Ok(status) => {
                                let status = status?;
                                log::trace!("[{}] collector stopped: {status}", self.label);
                            }
                            Err(_) => {
                                log::warn!(
                                    "[{}] collector ignored SIGTERM for {grace:?}, killing it",
                                    self.label
                                );
                                if let Some(pid) = child.id() {
                                    signal_group(pid, "KILL").await;
                                }
                                if let Err(e) = child.kill().await {
                                    log::debug!("[{}] cannot kill collector: {e}", self.label);
                                }
                            }
                        }
                    }
                }
                if let Some(pump) = pump {
                    finish(&self.label, pump, grace).await;
                }
            }
            CollectorTask::Sampler { stop, handle } => {
                let _ = stop.send(true);
                finish(&self.label, handle, grace).await;
            }
        }
        Ok(())
    }
}

/// Interval at which [`terminate_groups`] checks whether a group has exited.
const GROUP_POLL: Duration = Duration::from_millis(20);

/// Send `signal` to the process group `pgid`. Returns `false` if the group does not exist (any
/// more) or the signal could not be sent; `"0"` only checks that the group exists.
pub(crate) async fn signal_group(pgid: u32, signal: &str) -> bool {
    match kill_command(signal, &format!("-{pgid}")).output().await {
        Ok(out) => out.status.success(),
        Err(e) => {
            log::debug!("cannot send SIG{signal} to process group {pgid}: {e}");
            false
        }
    }
}

/// Stop everything left in the process groups `pgids`: SIGTERM to each group, then SIGKILL to the
/// groups still alive after `grace`.
pub(crate) async fn terminate_groups(pgids: &[u32], grace: Duration) {
    let mut alive = Vec::new();
    for &pgid in pgids {
        if signal_group(pgid, "TERM").await {
            alive.push(pgid);
        }
    }
    let deadline = tokio::time::Instant::now() + grace;
    while !alive.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(GROUP_POLL).await;
        let mut still_alive = Vec::new();
        for pgid in alive {
            if signal_group(pgid, "0").await {
                still_alive.push(pgid);
            }
        }
        alive = still_alive;
    }
    for pgid in alive {
        log::debug!("process group {pgid} ignored SIGTERM for {grace:?}, killing it");
        signal_group(pgid, "KILL").await;
    }
}

/// Wait for a writer task, aborting it after `grace`.
async fn finish(label: &str, mut handle: JoinHandle<std::io::Result<()>>, grace: Duration) {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::warn!("[{label}] cannot write raw log: {e}"),
        Ok(Err(e)) => log::warn!("[{label}] writer task failed: {e}"),
        Err(_) => {
            log::warn!("[{label}] writer did not finish in time");
            handle.abort();
        }
    }
}

/// Run `command` every `interval` until `stopped` turns true, writing one timestamped line per
/// invocation with the output lines joined by spaces.
async fn sample(
    host: Arc<dyn HostHandle>,
    command: String,
    interval: Duration,
    mut file: File,
    mut stopped: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            _ = ticker.tick() => {}
        }
        let ts = unix_timestamp();
        let output = tokio::select! {
            _ = stopped.changed() => break,
            output = host.execute(&command) => output,
        };
        match output {
            Ok(output) => {
                let text = output
                    .combined()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                file.write_all(timestamped_line(ts, &text).as_bytes()).await?;
                file.flush().await?;
            }
            Err(e) => log::debug!("[{}] sampling {command:?} failed: {e}", host.name()),
        }
    }
    Ok(())
}
