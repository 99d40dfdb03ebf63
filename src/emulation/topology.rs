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
//! Topology descriptions, and their resolution for a specific parameter set.

use std::collections::{HashMap, HashSet};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use super::EmulationError;
use crate::experiments::ParameterSet;

/// A host (or bridge / hub / router node) of the topology.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostSpec {
    pub name: String,
    /// Address of the first interface. Hubs and switches have none.
    #[serde(default)]
    pub ip: Option<Ipv4Net>,
}

impl HostSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: None,
        }
    }

    pub fn with_ip(name: impl Into<String>, ip: &str) -> Self {
        Self {
            name: name.into(),
            ip: ip.parse().ok(),
        }
    }
}

/// A point-to-point link.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinkSpec {
    pub a: String,
    pub b: String,
    /// Bandwidth in Mbit/s.
    #[serde(default)]
    pub bw: Option<f64>,
    /// Delay in `tc` notation, e.g. `100ms`.
    #[serde(default)]
    pub delay: Option<String>,
    /// Maximum queue length in packets.
    #[serde(default)]
    pub max_queue: Option<u32>,
    /// Whether the bandwidth, delay and queue of the parameter set apply to this link.
    #[serde(default)]
    pub shaped: bool,
}

impl LinkSpec {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            bw: None,
            delay: None,
            max_queue: None,
            shaped: false,
        }
    }

    pub fn bw(mut self, bw: f64) -> Self {
        self.bw = Some(bw);
        self
    }

    pub fn shaped(mut self) -> Self {
        self.shaped = true;
        self
    }

    /// Shape of this link for `params`: parameter-set values take precedence on shaped links.
    pub fn shape(&self, params: &ParameterSet) -> LinkShape {
        let mut shape = LinkShape {
            bw: self.bw,
            delay: self.delay.clone(),
            max_queue: self.max_queue,
        };
        if self.shaped {
            if let Some(bw) = params.bandwidth {
                shape.bw = Some(bw as f64);
            }
            if let Some(delay) = &params.delay {
                shape.delay = Some(delay.clone());
            }
            if let Some(queue) = params.queue {
                shape.max_queue = Some(queue);
            }
        }
        shape
    }
}

/// Explicit description of hosts and links.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TopologySpec {
    pub hosts: Vec<HostSpec>,
    pub links: Vec<LinkSpec>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
/// Topologies of the lab exercises.
pub enum BuiltinTopology {
    /// `h1 -- h2`, shaped by the parameter set.
    TwoHosts,
    /// Three hosts attached to hub `b1`.
    HubStar,
    /// Two hosts attached to a triangle of hubs `b1`, `b2`, `b3`.
    HubLoop,
    /// Four bridges in a ring.
    StpRing,
    /// `h1 -- r1 -- r2 -- r3 -- h2`.
    RouterChain,
    /// `h1 -- r1 -- {r2, r3} -- r4 -- h2`.
    MospfMesh,
}

impl BuiltinTopology {
    pub fn spec(&self) -> TopologySpec {
        match self {
            Self::TwoHosts => TopologySpec {
                hosts: vec![
                    HostSpec::with_ip("h1", "10.0.0.1/8"),
                    HostSpec::with_ip("h2", "10.0.0.2/8"),
                ],
                links: vec![LinkSpec::new("h1", "h2").shaped()],
            },
            Self::HubStar => TopologySpec {
                hosts: vec![
                    HostSpec::with_ip("h1", "10.0.0.1/8"),
                    HostSpec::with_ip("h2", "10.0.0.2/8"),
                    HostSpec::with_ip("h3", "10.0.0.3/8"),
                    HostSpec::new("b1"),
                ],
                links: vec![
                    LinkSpec::new("h1", "b1").bw(20.0),
                    LinkSpec::new("h2", "b1").bw(10.0),
                    LinkSpec::new("h3", "b1").bw(10.0),
                ],
            },
            Self::HubLoop => TopologySpec {
                hosts: vec![
                    HostSpec::with_ip("h1", "10.0.0.1/8"),
                    HostSpec::with_ip("h2", "10.0.0.2/8"),
                    HostSpec::new("b1"),
                    HostSpec::new("b2"),
                    HostSpec::new("b3"),
                ],
                links: vec![
                    LinkSpec::new("h1", "b1").bw(100.0),
                    LinkSpec::new("h2", "b2").bw(100.0),
                    LinkSpec::new("b1", "b3").bw(50.0),
                    LinkSpec::new("b2", "b3").bw(50.0),
                    LinkSpec::new("b1", "b2").bw(50.0),
                ],
            },
            Self::StpRing => TopologySpec {
                hosts: ["b1", "b2", "b3", "b4"].map(HostSpec::new).to_vec(),
                links: vec![
                    LinkSpec::new("b1", "b2"),
                    LinkSpec::new("b1", "b3"),
                    LinkSpec::new("b2", "b4"),
                    LinkSpec::new("b3", "b4"),
                ],
            },
            Self::RouterChain => TopologySpec {
                hosts: vec![
                    HostSpec::with_ip("h1", "10.0.1.11/24"),
                    HostSpec::with_ip("h2", "10.0.2.22/24"),
                    HostSpec::new("r1"),
                    HostSpec::new("r2"),
                    HostSpec::new("r3"),
                ],
                links: vec![
                    LinkSpec::new("h1", "r1"),
                    LinkSpec::new("r1", "r2"),
                    LinkSpec::new("r2", "r3"),
                    LinkSpec::new("r3", "h2"),
                ],
            },
            Self::MospfMesh => TopologySpec {
                hosts: vec![
                    HostSpec::with_ip("h1", "10.0.1.11/24"),
                    HostSpec::with_ip("h2", "10.0.6.22/24"),
                    HostSpec::new("r1"),
                    HostSpec::new("r2"),
                    HostSpec::new("r3"),
                    HostSpec::new("r4"),
                ],
                links: vec![
                    LinkSpec::new("h1", "r1"),
                    LinkSpec::new("r1", "r2"),
                    LinkSpec::new("r1", "r3"),
                    LinkSpec::new("r2", "r4"),
                    LinkSpec::new("r3", "r4"),
                    LinkSpec::new("r4", "h2"),
                ],
            },
        }
    }
}

/// Topology as written in an experiment description: a built-in name or explicit hosts and links.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TopologyConfig {
    Builtin { builtin: BuiltinTopology },
    Explicit(TopologySpec),
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::Builtin {
            builtin: BuiltinTopology::TwoHosts,
        }
    }
}

impl TopologyConfig {
    pub fn spec(&self) -> TopologySpec {
        match self {
            Self::Builtin { builtin } => builtin.spec(),
            Self::Explicit(spec) => spec.clone(),
        }
    }

    /// Resolve the topology for one parameter set.
    pub fn resolve(&self, params: &ParameterSet) -> Result<ResolvedTopology, EmulationError> {
        self.spec().resolve(params)
    }
}

/// Concrete link properties applied by the emulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkShape {
    pub bw: Option<f64>,
    pub delay: Option<String>,
    pub max_queue: Option<u32>,
}

impl LinkShape {
    pub fn is_unshaped(&self) -> bool {
        self.bw.is_none() && self.delay.is_none() && self.max_queue.is_none()
    }
}

/// A link with its interface names and concrete shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLink {
    pub a: String,
    pub b: String,
    pub a_iface: String,
    pub b_iface: String,
    pub shape: LinkShape,
}

impl ResolvedLink {
    /// Whether this link connects `x` and `y`, in either direction.
    pub fn connects(&self, x: &str, y: &str) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

/// Topology ready to be provisioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTopology {
    pub hosts: Vec<HostSpec>,
    pub links: Vec<ResolvedLink>,
}

impl TopologySpec {
    /// Validate the topology and assign interface names (`<host>-eth<n>`, numbered per host in link
    /// order).
    pub fn resolve(&self, params: &ParameterSet) -> Result<ResolvedTopology, EmulationError> {
        let mut names = HashSet::new();
        for host in self.hosts.iter() {
            if host.name.is_empty() {
                return Err(EmulationError::InvalidTopology("empty host name".to_string()));
            }
            if !names.insert(host.name.as_str()) {
                return Err(EmulationError::InvalidTopology(format!(
                    "duplicate host {}",
                    host.name
                )));
            }
        }

        let mut next_iface: HashMap<String, usize> = HashMap::new();
        let mut links = Vec::with_capacity(self.links.len());
        for link in self.links.iter() {
            for end in [&link.a, &link.b] {
                if !names.contains(end.as_str()) {
                    return Err(EmulationError::InvalidTopology(format!(
                        "link {} -- {} references unknown host {end}",
                        link.a, link.b
                    )));
                }
            }
            if link.a == link.b {
                return Err(EmulationError::InvalidTopology(format!(
                    "link from {} to itself",
                    link.a
                )));
            }
            let a_iface = next_iface_name(&mut next_iface, &link.a);
            let b_iface = next_iface_name(&mut next_iface, &link.b);
            links.push(ResolvedLink {
                a: link.a.clone(),
                b: link.b.clone(),
                a_iface,
                b_iface,
                shape: link.shape(params),
            });
        }

        Ok(ResolvedTopology {
            hosts: self.hosts.clone(),
            links,
        })
    }
}

fn next_iface_name(next_iface: &mut HashMap<String, usize>, host: &str) -> String {
    let n = next_iface.entry(host.to_string()).or_default();
    *n += 1;
    format!("{host}-eth{}", *n - 1)
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    fn params() -> ParameterSet {
        ParameterSet {
            bandwidth: Some(10),
            delay: Some("100ms".to_string()),
            size: Some("1M".to_string()),
            queue: None,
            repetition: 1,
        }
    }

    #[test]
    fn builtins_resolve() {
        for builtin in BuiltinTopology::iter() {
            let topo = builtin.spec().resolve(&params()).unwrap();
            assert!(!topo.links.is_empty(), "{builtin}");
        }
    }

    #[test]
    fn interfaces_are_numbered_per_host() {
        let topo = BuiltinTopology::MospfMesh.spec().resolve(&params()).unwrap();
        let r1_links = topo
            .links
            .iter()
            .filter(|l| l.a == "r1" || l.b == "r1")
            .map(|l| if l.a == "r1" { &l.a_iface } else { &l.b_iface })
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(r1_links, vec!["r1-eth0", "r1-eth1", "r1-eth2"]);
        assert_eq!(topo.links[5].b_iface, "h2-eth0");
        assert!(topo.links[1].connects("r2", "r1"));
    }

    #[test]
    fn shaped_links_follow_parameters() {
        let topo = BuiltinTopology::TwoHosts.spec().resolve(&params()).unwrap();
        assert_eq!(
            topo.links[0].shape,
            LinkShape {
                bw: Some(10.0),
                delay: Some("100ms".to_string()),
                max_queue: None
            }
        );

        let topo = BuiltinTopology::HubStar.spec().resolve(&params()).unwrap();
        assert_eq!(topo.links[0].shape.bw, Some(20.0));
        assert_eq!(topo.links[0].shape.delay, None);
    }

    #[test]
    fn invalid_topologies() {
        let mut spec = BuiltinTopology::TwoHosts.spec();
        spec.links.push(LinkSpec::new("h1", "h3"));
        assert!(spec.resolve(&params()).is_err());

        let mut spec = BuiltinTopology::TwoHosts.spec();
        spec.hosts.push(HostSpec::new("h1"));
        assert!(spec.resolve(&params()).is_err());
    }

    #[test]
    fn deserialize_config() {
        let builtin: TopologyConfig = serde_json::from_str(r#"{"builtin": "stp_ring"}"#).unwrap();
        assert_eq!(
            builtin,
            TopologyConfig::Builtin {
                builtin: BuiltinTopology::StpRing
            }
        );

        let explicit: TopologyConfig = serde_json::from_str(
            r#"{"hosts": [{"name": "h1", "ip": "10.0.0.1/8"}, {"name": "h2"}],
                "links": [{"a": "h1", "b": "h2", "delay": "5ms", "shaped": true}]}"#,
        )
        .unwrap();
        let spec = explicit.spec();
        assert_eq!(spec.hosts[0].ip, "10.0.0.1/8".parse().ok());
        assert_eq!(spec.links[0].delay.as_deref(), Some("5ms"));
        assert!(spec.links[0].shaped);
    }
}
