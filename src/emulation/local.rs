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
//! Backend without any isolation: every host is the local machine.
//!
//! Links are only book-kept, not shaped. Useful for dry-running an experiment description and for
//! exercising the driver without privileges.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::{
    CommandOutput, EmulationError, Emulator, Environment, HostHandle, ResolvedTopology,
};

/// Emulator running all hosts as plain local shells in `workdir`.
#[derive(Debug, Clone)]
pub struct LocalEmulator {
    workdir: PathBuf,
}

impl LocalEmulator {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Emulator for LocalEmulator {
    fn description(&self) -> &'static str {
        "local"
    }

    async fn start(&self, topology: &ResolvedTopology) -> Result<Box<dyn Environment>, EmulationError> {
        if !self.workdir.is_dir() {
            return Err(EmulationError::InvalidTopology(format!(
                "working directory {:?} does not exist",
                self.workdir
            )));
        }
        let hosts = topology
            .hosts
            .iter()
            .map(|h| {
                (
                    h.name.clone(),
                    Arc::new(LocalHost {
                        name: h.name.clone(),
                        workdir: self.workdir.clone(),
                    }),
                )
            })
            .collect();
        let links = topology
            .links
            .iter()
            .map(|l| ((l.a.clone(), l.b.clone()), false))
            .collect();
        log::debug!(
            "[local] started {} hosts and {} links",
            topology.hosts.len(),
            topology.links.len()
        );
        Ok(Box::new(LocalEnvironment {
            hosts,
            links: Mutex::new(links),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct LocalHost {
    name: String,
    workdir: PathBuf,
}

impl LocalHost {
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .env("NETSWEEP_HOST", &self.name)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl HostHandle for LocalHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, EmulationError> {
        log::trace!("[local] {}: {command}", self.name);
        let output = self.command(command).output().await?;
        Ok(CommandOutput::from_output(output))
    }

    fn spawn(&self, command: &str, stdout: Stdio, stderr: Stdio) -> Result<Child, EmulationError> {
        log::trace!("[local] {} (background): {command}", self.name);
        // own process group, so stopping the command also stops everything it started
        Ok(self
            .command(command)
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()?)
    }
}

struct LocalEnvironment {
    hosts: HashMap<String, Arc<LocalHost>>,
    /// (a, b) -> disabled
    links: Mutex<HashMap<(String, String), bool>>,
    stopped: AtomicBool,
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn host(&self, name: &str) -> Result<Arc<dyn HostHandle>, EmulationError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EmulationError::Stopped);
        }
        self.hosts
            .get(name)
            .map(|h| h.clone() as Arc<dyn HostHandle>)
            .ok_or_else(|| EmulationError::UnknownHost(name.to_string()))
    }

    fn host_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.keys().cloned().collect();
        names.sort();
        names
    }

    async fn disable_link(&self, a: &str, b: &str) -> Result<bool, EmulationError> {
        let mut links = self.links.lock().map_err(|_| EmulationError::Stopped)?;
        let Some(disabled) = links
            .iter_mut()
            .find(|((x, y), _)| (x == a && y == b) || (x == b && y == a))
            .map(|(_, disabled)| disabled)
        else {
            return Ok(false);
        };
        if !*disabled {
            log::debug!("[local] disabling link {a} -- {b}");
            *disabled = true;
        }
        Ok(true)
    }

    async fn stop(&self) -> Result<(), EmulationError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        emulation::{BuiltinTopology, TopologyConfig},
        experiments::ParameterSet,
    };

    async fn start() -> Box<dyn Environment> {
        let topo = TopologyConfig::Builtin {
            builtin: BuiltinTopology::MospfMesh,
        }
        .resolve(&ParameterSet::default())
        .unwrap();
        LocalEmulator::new(".").start(&topo).await.unwrap()
    }

    #[tokio::test]
    async fn execute_captures_output() {
        let env = start().await;
        let out = env
            .host("h1")
            .unwrap()
            .execute("echo hello; echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.status, Some(3));
        assert!(matches!(env.host("h9"), Err(EmulationError::UnknownHost(_))));
    }

    #[tokio::test]
    async fn disable_link_is_idempotent() {
        let env = start().await;
        assert!(env.disable_link("r1", "r2").await.unwrap());
        assert!(env.disable_link("r2", "r1").await.unwrap());
        assert!(!env.disable_link("h1", "h2").await.unwrap());
    }

    #[tokio::test]
    async fn stopped_environment_has_no_hosts() {
        let env = start().await;
        env.stop().await.unwrap();
        assert!(matches!(env.host("h1"), Err(EmulationError::Stopped)));
    }
}
