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
//! Linux network-namespace backend.
//!
//! Every host of the topology becomes a network namespace called `<prefix><host>`. Links are veth
//! pairs created directly inside the two namespaces, named `<host>-eth<n>` as in Mininet. Shaped
//! links get an `htb` rate limiter with a `netem` qdisc for delay and queue length below it, on both
//! ends. Requires root privileges and `iproute2`.

use std::{collections::HashSet, path::PathBuf, process::Stdio, sync::Arc};

use async_trait::async_trait;
use tokio::{
    process::{Child, Command},
    sync::Mutex,
};

use super::{
    kill_command, CommandOutput, EmulationError, Emulator, Environment, HostHandle, LinkShape,
    ResolvedLink, ResolvedTopology,
};

/// Linux limit on interface names (`IFNAMSIZ - 1`).
pub const MAX_IFACE_NAME: usize = 15;

/// Emulator building topologies out of network namespaces and veth pairs.
#[derive(Debug, Clone)]
pub struct NetnsEmulator {
    prefix: String,
    workdir: PathBuf,
}

impl NetnsEmulator {
    pub fn new(prefix: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            workdir: workdir.into(),
        }
    }

    fn namespace(&self, host: &str) -> String {
        format!("{}{}", self.prefix, host)
    }

    /// All `ip` invocations needed to provision `topology`, in order.
    pub fn provision_commands(&self, topology: &ResolvedTopology) -> Vec<Vec<String>> {
        let mut cmds = Vec::new();
        for host in topology.hosts.iter() {
            let ns = self.namespace(&host.name);
            cmds.push(args(["netns", "add", &ns]));
            cmds.push(args(["-n", &ns, "link", "set", "lo", "up"]));
        }
        for link in topology.links.iter() {
            let ns_a = self.namespace(&link.a);
            let ns_b = self.namespace(&link.b);
            cmds.push(args([
                "link",
                "add",
                &link.a_iface,
                "netns",
                &ns_a,
                "type",
                "veth",
                "peer",
                "name",
                &link.b_iface,
                "netns",
                &ns_b,
            ]));
            cmds.push(args(["-n", &ns_a, "link", "set", &link.a_iface, "up"]));
            cmds.push(args(["-n", &ns_b, "link", "set", &link.b_iface, "up"]));
        }
        for host in topology.hosts.iter() {
            let Some(ip) = host.ip else { continue };
            let first_iface = format!("{}-eth0", host.name);
            if !topology
                .links
                .iter()
                .any(|l| l.a_iface == first_iface || l.b_iface == first_iface)
            {
                continue;
            }
            let ns = self.namespace(&host.name);
            cmds.push(args([
                "-n",
                &ns,
                "addr",
                "add",
                &ip.to_string(),
                "dev",
                &first_iface,
            ]));
        }
        cmds
    }

    /// `tc` invocations shaping `link` (both ends).
    pub fn shaping_commands(&self, link: &ResolvedLink) -> Vec<Vec<String>> {
        let mut cmds = Vec::new();
        for (host, iface) in [(&link.a, &link.a_iface), (&link.b, &link.b_iface)] {
            cmds.extend(tc_commands(&self.namespace(host), iface, &link.shape));
        }
        cmds
    }

    fn validate(&self, topology: &ResolvedTopology) -> Result<(), EmulationError> {
        for link in topology.links.iter() {
            for iface in [&link.a_iface, &link.b_iface] {
                if iface.len() > MAX_IFACE_NAME {
                    return Err(EmulationError::InvalidTopology(format!(
                        "interface name {iface} is longer than {MAX_IFACE_NAME} characters"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for NetnsEmulator {
    fn default() -> Self {
        Self::new("nsw-", ".")
    }
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| s.to_string()).collect()
}

/// `tc` invocations for one interface, run through `ip netns exec`.
fn tc_commands(ns: &str, iface: &str, shape: &LinkShape) -> Vec<Vec<String>> {
    if shape.is_unshaped() {
        return Vec::new();
    }
    let mut cmds = Vec::new();
    let tc = |rest: &[&str]| {
        let mut cmd = args(["netns", "exec", ns, "tc"]);
        cmd.extend(rest.iter().map(|s| s.to_string()));
        cmd
    };

    let netem_parent = if let Some(bw) = shape.bw {
        let rate = format!("{bw}Mbit");
        cmds.push(tc(&[
            "qdisc", "add", "dev", iface, "root", "handle", "5:", "htb", "default", "1",
        ]));
        cmds.push(tc(&[
            "class", "add", "dev", iface, "parent", "5:", "classid", "5:1", "htb", "rate", rate.as_str(),
            "burst", "15k",
        ]));
        Some("5:1")
    } else {
        None
    };

    if shape.delay.is_some() || shape.max_queue.is_some() {
        let mut netem: Vec<String> = args(["qdisc", "add", "dev", iface]);
        match netem_parent {
            Some(parent) => netem.extend(args(["parent", parent])),
            None => netem.push("root".to_string()),
        }
        netem.extend(args(["handle", "10:", "netem"]));
        if let Some(delay) = &shape.delay {
            netem.extend(args(["delay", delay.as_str()]));
        }
        if let Some(limit) = shape.max_queue {
            netem.extend(["limit".to_string(), limit.to_string()]);
        }
        let netem: Vec<&str> = netem.iter().map(String::as_str).collect();
        cmds.push(tc(&netem));
    }
    cmds
}

async fn run_ip(args: &[String]) -> Result<CommandOutput, EmulationError> {
    log::trace!("[netns] ip {}", args.join(" "));
    let output = Command::new("ip")
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    let output = CommandOutput::from_output(output);
    if output.success() {
        Ok(output)
    } else {
        Err(EmulationError::CommandFailed {
            command: format!("ip {}", args.join(" ")),
            status: output.to_string(),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

#[async_trait]
impl Emulator for NetnsEmulator {
    fn description(&self) -> &'static str {
        "netns"
    }

    async fn start(&self, topology: &ResolvedTopology) -> Result<Box<dyn Environment>, EmulationError> {
        self.validate(topology)?;

        let env = NetnsEnvironment {
            namespaces: topology
                .hosts
                .iter()
                .map(|h| (h.name.clone(), self.namespace(&h.name)))
                .collect(),
            links: topology.links.clone(),
            disabled: Mutex::new(HashSet::new()),
            workdir: self.workdir.clone(),
        };

        let mut cmds = self.provision_commands(topology);
        cmds.extend(topology.links.iter().flat_map(|l| self.shaping_commands(l)));
        for cmd in cmds.iter() {
            if let Err(e) = run_ip(cmd).await {
                log::warn!("[netns] provisioning failed, cleaning up: {e}");
                if let Err(cleanup) = env.stop().await {
                    log::warn!("[netns] cleanup failed: {cleanup}");
                }
                return Err(e);
            }
        }
        log::debug!(
            "[netns] started {} namespaces and {} links",
            topology.hosts.len(),
            topology.links.len()
        );
        Ok(Box::new(env))
    }
}

struct NetnsHost {
    name: String,
    namespace: String,
    workdir: PathBuf,
}

impl NetnsHost {
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new("ip");
        cmd.args(["netns", "exec", self.namespace.as_str(), "sh", "-c", command])
            .current_dir(&self.workdir)
            .env("NETSWEEP_HOST", &self.name)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl HostHandle for NetnsHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, EmulationError> {
        log::trace!("[netns] {}: {command}", self.name);
        let output = self.command(command).output().await?;
        Ok(CommandOutput::from_output(output))
    }

    fn spawn(&self, command: &str, stdout: Stdio, stderr: Stdio) -> Result<Child, EmulationError> {
        log::trace!("[netns] {} (background): {command}", self.name);
        // own process group, so stopping the command also stops everything it started
        Ok(self
            .command(command)
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()?)
    }
}

struct NetnsEnvironment {
    /// host name -> namespace name, in topology order
    namespaces: Vec<(String, String)>,
    links: Vec<ResolvedLink>,
    /// indices into `links`
    disabled: Mutex<HashSet<usize>>,
    workdir: PathBuf,
}

impl NetnsEnvironment {
    fn namespace(&self, host: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, ns)| ns.as_str())
    }
}

#[async_trait]
impl Environment for NetnsEnvironment {
    fn host(&self, name: &str) -> Result<Arc<dyn HostHandle>, EmulationError> {
        let namespace = self
            .namespace(name)
            .ok_or_else(|| EmulationError::UnknownHost(name.to_string()))?;
        Ok(Arc::new(NetnsHost {
            name: name.to_string(),
            namespace: namespace.to_string(),
            workdir: self.workdir.clone(),
        }))
    }

    fn host_names(&self) -> Vec<String> {
        self.namespaces.iter().map(|(h, _)| h.clone()).collect()
    }

    async fn disable_link(&self, a: &str, b: &str) -> Result<bool, EmulationError> {
        let Some((idx, link)) = self.links.iter().enumerate().find(|(_, l)| l.connects(a, b)) else {
            return Ok(false);
        };
        let mut disabled = self.disabled.lock().await;
        if disabled.contains(&idx) {
            log::debug!("[netns] link {a} -- {b} is already down");
            return Ok(true);
        }
        let ns = self
            .namespace(&link.a)
            .ok_or_else(|| EmulationError::UnknownHost(link.a.clone()))?;
        // deleting one end of a veth pair removes the peer as well
        run_ip(&args(["-n", ns, "link", "del", &link.a_iface])).await?;
        disabled.insert(idx);
        log::info!("[netns] disabled link {a} -- {b}");
        Ok(true)
    }

    async fn stop(&self) -> Result<(), EmulationError> {
        let mut first_error = None;
        for (_, ns) in self.namespaces.iter() {
            match run_ip(&args(["netns", "pids", ns])).await {
                Ok(pids) => {
                    let pids = pids.stdout.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !pids.is_empty() {
                        match kill_command("KILL", &pids).output().await {
                            Ok(out) if out.status.success() => {}
                            Ok(out) => log::debug!(
                                "[netns] cannot kill the processes of {ns}: {}",
                                String::from_utf8_lossy(&out.stderr).trim()
                            ),
                            Err(e) => log::debug!("[netns] cannot kill the processes of {ns}: {e}"),
                        }
                    }
                }
                Err(e) => log::debug!("[netns] cannot list processes of {ns}: {e}"),
            }
            if let Err(e) = run_ip(&args(["netns", "del", ns])).await {
                log::warn!("[netns] cannot delete namespace {ns}: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        emulation::{BuiltinTopology, HostSpec, LinkSpec, TopologySpec},
        experiments::ParameterSet,
    };

    fn params() -> ParameterSet {
        ParameterSet {
            bandwidth: Some(10),
            delay: Some("100ms".to_string()),
            queue: Some(20),
            ..Default::default()
        }
    }

    fn joined(cmds: Vec<Vec<String>>) -> Vec<String> {
        cmds.into_iter().map(|c| c.join(" ")).collect()
    }

    #[test]
    fn provisions_two_hosts() {
        let emu = NetnsEmulator::default();
        let topo = BuiltinTopology::TwoHosts.spec().resolve(&params()).unwrap();
        assert_eq!(
            joined(emu.provision_commands(&topo)),
            vec![
                "netns add nsw-h1",
                "-n nsw-h1 link set lo up",
                "netns add nsw-h2",
                "-n nsw-h2 link set lo up",
                "link add h1-eth0 netns nsw-h1 type veth peer name h2-eth0 netns nsw-h2",
                "-n nsw-h1 link set h1-eth0 up",
                "-n nsw-h2 link set h2-eth0 up",
                "-n nsw-h1 addr add 10.0.0.1/8 dev h1-eth0",
                "-n nsw-h2 addr add 10.0.0.2/8 dev h2-eth0",
            ]
        );
    }

    #[test]
    fn shapes_rate_delay_and_queue() {
        let emu = NetnsEmulator::default();
        let topo = BuiltinTopology::TwoHosts.spec().resolve(&params()).unwrap();
        let cmds = joined(emu.shaping_commands(&topo.links[0]));
        assert_eq!(cmds.len(), 6);
        assert_eq!(
            cmds[0],
            "netns exec nsw-h1 tc qdisc add dev h1-eth0 root handle 5: htb default 1"
        );
        assert_eq!(
            cmds[1],
            "netns exec nsw-h1 tc class add dev h1-eth0 parent 5: classid 5:1 htb rate 10Mbit burst 15k"
        );
        assert_eq!(
            cmds[2],
            "netns exec nsw-h1 tc qdisc add dev h1-eth0 parent 5:1 handle 10: netem delay 100ms limit 20"
        );
        assert!(cmds[5].starts_with("netns exec nsw-h2 tc qdisc add dev h2-eth0 parent 5:1"));
    }

    #[test]
    fn delay_only_uses_root_netem() {
        let shape = LinkShape {
            delay: Some("5ms".to_string()),
            ..Default::default()
        };
        assert_eq!(
            joined(tc_commands("ns", "x-eth0", &shape)),
            vec!["netns exec ns tc qdisc add dev x-eth0 root handle 10: netem delay 5ms"]
        );
        assert!(tc_commands("ns", "x-eth0", &LinkShape::default()).is_empty());
    }

    #[test]
    fn rejects_long_interface_names() {
        let spec = TopologySpec {
            hosts: vec![HostSpec::new("a-very-long-host"), HostSpec::new("h2")],
            links: vec![LinkSpec::new("a-very-long-host", "h2")],
        };
        let topo = spec.resolve(&params()).unwrap();
        assert!(matches!(
            NetnsEmulator::default().validate(&topo),
            Err(EmulationError::InvalidTopology(_))
        ));
    }
}
