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
//! The network-emulation provider seam.
//!
//! An [`Emulator`] stands up an isolated [`Environment`] from a [`ResolvedTopology`]. The environment
//! hands out [`HostHandle`]s to execute commands on its hosts, can disable links while the
//! experiment is running, and is torn down with [`Environment::stop`]. Everything that mutates the
//! topology takes the environment handle explicitly.

use std::{fmt, process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::process::{Child, Command};

pub mod local;
pub mod netns;
pub mod topology;

pub use local::LocalEmulator;
pub use netns::NetnsEmulator;
pub use topology::*;

#[derive(Debug, thiserror::Error)]
pub enum EmulationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command `{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Unknown host: {0}")]
    UnknownHost(String),
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),
    #[error("The environment was already stopped")]
    Stopped,
}

/// Output of a command executed on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the command was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout followed by stderr, as a shell running `cmd 2>&1` would show it.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }

    pub(crate) fn from_output(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// `kill -s <signal> -- <targets>` through the shell builtin, which needs no `kill` binary.
/// Negative targets address process groups.
pub(crate) fn kill_command(signal: &str, targets: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(format!("kill -s {signal} -- {targets}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// Capability to run shell commands on one emulated host.
#[async_trait]
pub trait HostHandle: Send + Sync {
    /// Name of the host in the topology.
    fn name(&self) -> &str;

    /// Run `command` through `sh -c` on the host and wait for it, capturing stdout and stderr.
    /// The command is killed if the returned future is dropped.
    async fn execute(&self, command: &str) -> Result<CommandOutput, EmulationError>;

    /// Start `command` through `sh -c` on the host in the background, as leader of a new process
    /// group.
    fn spawn(&self, command: &str, stdout: Stdio, stderr: Stdio) -> Result<Child, EmulationError>;
}

/// A running, isolated network instance.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Handle of the host called `name`.
    fn host(&self, name: &str) -> Result<Arc<dyn HostHandle>, EmulationError>;

    /// Names of all hosts.
    fn host_names(&self) -> Vec<String>;

    /// Take down the link between `a` and `b` while the environment keeps running.
    ///
    /// Returns `true` if such a link exists (including when it was already disabled earlier, which
    /// makes repeated calls a no-op), and `false` if the topology has no link between `a` and `b`.
    async fn disable_link(&self, a: &str, b: &str) -> Result<bool, EmulationError>;

    /// Tear the environment down. Best-effort: all resources are released even if one of them
    /// fails, and the first error is reported.
    async fn stop(&self) -> Result<(), EmulationError>;
}

/// Creates environments.
#[async_trait]
pub trait Emulator: Send + Sync {
    /// Short name of the backend, used in logs.
    fn description(&self) -> &'static str;

    /// Provision a new environment for `topology`.
    async fn start(&self, topology: &ResolvedTopology) -> Result<Box<dyn Environment>, EmulationError>;
}

#[async_trait]
impl<E: Emulator + ?Sized> Emulator for Box<E> {
    fn description(&self) -> &'static str {
        (**self).description()
    }

    async fn start(&self, topology: &ResolvedTopology) -> Result<Box<dyn Environment>, EmulationError> {
        (**self).start(topology).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combined_output() {
        let out = CommandOutput {
            status: Some(1),
            stdout: "a".to_string(),
            stderr: "b\n".to_string(),
        };
        assert_eq!(out.combined(), "a\nb\n");
        assert!(!out.success());
        assert_eq!(out.to_string(), "exit code 1");
    }

    #[tokio::test]
    async fn kill_builtin_reports_missing_processes() {
        let own = std::process::id().to_string();
        assert!(kill_command("0", &own).status().await.unwrap().success());
        // above the largest possible pid
        let out = kill_command("KILL", "2147483647").output().await.unwrap();
        assert!(!out.status.success());
        assert!(!out.stderr.is_empty());
    }
}
