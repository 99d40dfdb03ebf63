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
//! The JSON experiment description.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::ExperimentMatrix;
use crate::emulation::TopologyConfig;

/// File name of the record a successful run leaves in its directory.
pub const RUN_RECORD: &str = "run.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid experiment description: {0}")]
    Invalid(String),
}

fn default_settle() -> f64 {
    1.0
}

fn default_teardown_timeout() -> f64 {
    10.0
}

fn default_stop_grace() -> u64 {
    2000
}

/// Everything needed to run a sweep.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentDescription {
    pub name: String,
    /// Directory the host commands run in. Defaults to the current directory.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Programs that must be on the `PATH` before the sweep starts.
    #[serde(default)]
    pub required_programs: Vec<String>,
    #[serde(default)]
    pub matrix: ExperimentMatrix,
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Commands run once after provisioning, in order.
    #[serde(default)]
    pub setup: Vec<HostCommand>,
    /// Collectors and daemons running alongside the workload.
    #[serde(default)]
    pub background: Vec<CollectorSpec>,
    #[serde(default)]
    pub workload: Workload,
    /// Pause after every run, in seconds.
    #[serde(default = "default_settle")]
    pub settle_s: f64,
    /// Bound on stopping collectors and releasing the environment, in seconds.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_s: f64,
    /// How long a collector may take to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

/// A command for a specific host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostCommand {
    pub host: String,
    pub command: String,
    /// Fail the run if the command exits with a non-zero code.
    #[serde(default)]
    pub check: bool,
}

/// How the output of a background command is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorMode {
    /// stdout and stderr verbatim.
    #[default]
    Raw,
    /// Every output line prefixed with the absolute time it was read at, e.g. `ping`.
    Timestamped,
    /// The command is run every `interval_ms` milliseconds; each invocation becomes one line,
    /// prefixed with the time of the invocation, e.g. `ss -ti` or `tc -s qdisc`.
    Sampled { interval_ms: u64 },
}

/// A background process writing one raw log file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CollectorSpec {
    pub host: String,
    pub command: String,
    /// File name of the raw log file inside the run directory, e.g. `rtt.txt`.
    pub output: String,
    #[serde(default)]
    pub mode: CollectorMode,
}

/// One foreground step.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WorkloadStep {
    /// Run a command to completion. Its stdout and stderr go to the raw log file `output` if given.
    /// The first step writing a label in a run truncates it, later ones append.
    Exec {
        host: String,
        command: String,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        check: bool,
    },
    Sleep { secs: f64 },
    /// Take down the link between two hosts while everything keeps running.
    DisableLink { a: String, b: String },
}

/// The foreground part of a run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Workload {
    pub steps: Vec<WorkloadStep>,
    /// Upper bound on the duration of all steps, in seconds. Remaining steps are cancelled when it
    /// is reached.
    #[serde(default)]
    pub max_duration_s: Option<f64>,
}

impl ExperimentDescription {
    /// Read and validate an experiment description.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate an experiment description.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let description: Self = serde_json::from_str(content)?;
        description.validate()?;
        Ok(description)
    }

    /// Required programs that cannot be found.
    pub fn missing_programs(&self) -> Vec<&str> {
        self.required_programs
            .iter()
            .map(String::as_str)
            .filter(|p| crate::util::which(p).is_none())
            .collect()
    }

    pub fn workdir(&self) -> PathBuf {
        self.workdir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Check the description for mistakes that would make every run fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return invalid(format!("name {:?} is not a valid directory name", self.name));
        }
        self.matrix.validate().map_err(ConfigError::Invalid)?;

        let hosts: HashSet<String> = self
            .topology
            .spec()
            .hosts
            .into_iter()
            .map(|h| h.name)
            .collect();
        let check_host = |host: &str, what: &str| {
            if hosts.contains(host) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{what} references unknown host {host}")))
            }
        };

        for cmd in self.setup.iter() {
            check_host(&cmd.host, "setup command")?;
        }

        let mut collector_outputs = HashSet::new();
        for collector in self.background.iter() {
            check_host(&collector.host, "background command")?;
            check_label(&collector.output)?;
            if !collector_outputs.insert(collector.output.as_str()) {
                return invalid(format!(
                    "two background commands write to {}",
                    collector.output
                ));
            }
            if collector.mode == (CollectorMode::Sampled { interval_ms: 0 }) {
                return invalid(format!(
                    "sampling interval of {:?} must be positive",
                    collector.command
                ));
            }
        }

        for step in self.workload.steps.iter() {
            match step {
                WorkloadStep::Exec { host, output, .. } => {
                    check_host(host, "workload step")?;
                    if let Some(output) = output {
                        check_label(output)?;
                        if collector_outputs.contains(output.as_str()) {
                            return invalid(format!(
                                "{output} is written by both a background command and a workload step"
                            ));
                        }
                    }
                }
                WorkloadStep::Sleep { secs } => {
                    seconds(*secs, "sleep")?;
                }
                WorkloadStep::DisableLink { a, b } => {
                    check_host(a, "disable_link")?;
                    check_host(b, "disable_link")?;
                }
            }
        }

        if let Some(max) = self.workload.max_duration_s {
            seconds(max, "max_duration_s")?;
        }
        seconds(self.settle_s, "settle_s")?;
        seconds(self.teardown_timeout_s, "teardown_timeout_s")?;
        Ok(())
    }
}

/// `secs` as a [`Duration`]. Negative, non-finite and unrepresentably large values are rejected.
pub fn seconds(secs: f64, what: &str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::Invalid(format!(
            "{what} must be a non-negative number of seconds, not {secs}"
        ))
    })
}

/// Raw log labels are plain file names inside the run directory.
fn check_label(label: &str) -> Result<(), ConfigError> {
    if label.is_empty()
        || label == "."
        || label == ".."
        || label.contains(['/', '\\'])
        || label == RUN_RECORD
    {
        Err(ConfigError::Invalid(format!("{label:?} is not a valid output file name")))
    } else {
        Ok(())
    }
}
