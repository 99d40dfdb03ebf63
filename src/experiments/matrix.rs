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
//! Enumeration of experiment conditions.

use std::{collections::HashSet, fmt, path::Path};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One dimension of the experiment space.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Axis {
    Repetition,
    Bandwidth,
    Delay,
    Size,
    Queue,
}

impl Axis {
    /// Order used when the experiment description does not name one: repetitions outermost.
    pub const DEFAULT_ORDER: [Axis; 5] = [
        Axis::Repetition,
        Axis::Bandwidth,
        Axis::Delay,
        Axis::Size,
        Axis::Queue,
    ];
}

/// One experimental condition. Unset axes are `None`; the repetition index starts at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ParameterSet {
    /// Bandwidth in Mbit/s.
    pub bandwidth: Option<u32>,
    /// Delay in `tc` notation, e.g. `100ms`.
    pub delay: Option<String>,
    /// Payload size, e.g. `1M`.
    pub size: Option<String>,
    /// Maximum queue length in packets.
    pub queue: Option<u32>,
    pub repetition: usize,
}

impl ParameterSet {
    /// Name of the run, used for its artifact directory, e.g. `10_100ms_1M_1`. The fields appear in
    /// a fixed order regardless of the enumeration order; unset axes are left out and the queue is
    /// prefixed with `q`.
    pub fn name(&self) -> String {
        let mut parts = Vec::with_capacity(5);
        if let Some(bw) = self.bandwidth {
            parts.push(bw.to_string());
        }
        if let Some(delay) = &self.delay {
            parts.push(delay.clone());
        }
        if let Some(size) = &self.size {
            parts.push(size.clone());
        }
        if let Some(queue) = self.queue {
            parts.push(format!("q{queue}"));
        }
        parts.push(self.repetition.to_string());
        parts.join("_")
    }

    /// Value of `axis` as text, empty if unset.
    pub fn value(&self, axis: Axis) -> String {
        match axis {
            Axis::Repetition => self.repetition.to_string(),
            Axis::Bandwidth => self.bandwidth.map(|x| x.to_string()).unwrap_or_default(),
            Axis::Delay => self.delay.clone().unwrap_or_default(),
            Axis::Size => self.size.clone().unwrap_or_default(),
            Axis::Queue => self.queue.map(|x| x.to_string()).unwrap_or_default(),
        }
    }

    /// Substitute the placeholders `{bw}`, `{delay}`, `{size}`, `{queue}`, `{rep}`, `{run}` and
    /// `{run_dir}` in `template`. Unset axes are replaced by the empty string.
    pub fn substitute(&self, template: &str, run_dir: &Path) -> String {
        template
            .replace("{bw}", &self.value(Axis::Bandwidth))
            .replace("{delay}", &self.value(Axis::Delay))
            .replace("{size}", &self.value(Axis::Size))
            .replace("{queue}", &self.value(Axis::Queue))
            .replace("{rep}", &self.value(Axis::Repetition))
            .replace("{run_dir}", &run_dir.to_string_lossy())
            .replace("{run}", &self.name())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// The axes of an experiment and the order in which they are nested.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExperimentMatrix {
    pub bandwidths: Vec<u32>,
    pub delays: Vec<String>,
    pub sizes: Vec<String>,
    pub queues: Vec<u32>,
    pub repetitions: usize,
    /// Outermost axis first. Axes not mentioned are appended in their default order.
    pub order: Vec<Axis>,
}

impl Default for ExperimentMatrix {
    fn default() -> Self {
        Self {
            bandwidths: Vec::new(),
            delays: Vec::new(),
            sizes: Vec::new(),
            queues: Vec::new(),
            repetitions: 1,
            order: Axis::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl ExperimentMatrix {
    /// Check that no axis is named twice in `order`.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for axis in self.order.iter() {
            if !seen.insert(axis) {
                return Err(format!("axis {axis} appears more than once in the order"));
            }
        }
        Ok(())
    }

    /// Nesting order actually used, outermost first.
    pub fn effective_order(&self) -> Vec<Axis> {
        let mut order = self.order.iter().copied().unique().collect_vec();
        for axis in Axis::DEFAULT_ORDER {
            if !order.contains(&axis) {
                order.push(axis);
            }
        }
        order
    }

    /// Number of parameter sets [`Self::enumerate`] yields.
    pub fn len(&self) -> usize {
        [
            self.bandwidths.len(),
            self.delays.len(),
            self.sizes.len(),
            self.queues.len(),
        ]
        .into_iter()
        .map(|n| n.max(1))
        .product::<usize>()
            * self.repetitions
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All parameter sets as a nested cross product, the outermost axis varying slowest. An axis
    /// without values stays unset. The result only depends on the matrix itself.
    pub fn enumerate(&self) -> Vec<ParameterSet> {
        let mut sets = vec![ParameterSet::default()];
        for axis in self.effective_order() {
            sets = match axis {
                Axis::Repetition => expand(sets, 1..=self.repetitions, |p, rep| p.repetition = rep),
                Axis::Bandwidth => expand_optional(sets, &self.bandwidths, |p, bw| {
                    p.bandwidth = Some(*bw)
                }),
                Axis::Delay => {
                    expand_optional(sets, &self.delays, |p, d| p.delay = Some(d.clone()))
                }
                Axis::Size => expand_optional(sets, &self.sizes, |p, s| p.size = Some(s.clone())),
                Axis::Queue => {
                    expand_optional(sets, &self.queues, |p, q| p.queue = Some(*q))
                }
            };
        }
        sets
    }
}

/// Replace every set by one copy per value, keeping the existing order outermost.
fn expand<T, I, F>(sets: Vec<ParameterSet>, values: I, set: F) -> Vec<ParameterSet>
where
    I: IntoIterator<Item = T> + Clone,
    F: Fn(&mut ParameterSet, T),
{
    let set = &set;
    sets.into_iter()
        .flat_map(|p| {
            values.clone().into_iter().map(move |v| {
                let mut p = p.clone();
                set(&mut p, v);
                p
            })
        })
        .collect()
}

fn expand_optional<'a, T, F>(sets: Vec<ParameterSet>, values: &'a [T], set: F) -> Vec<ParameterSet>
where
    F: Fn(&mut ParameterSet, &'a T),
{
    if values.is_empty() {
        sets
    } else {
        expand(sets, values.iter(), set)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fct_matrix() -> ExperimentMatrix {
        ExperimentMatrix {
            bandwidths: vec![10, 30],
            delays: vec!["100ms".to_string()],
            sizes: vec!["1M".to_string()],
            repetitions: 2,
            ..Default::default()
        }
    }

    #[test]
    fn fct_matrix_order() {
        let names = fct_matrix()
            .enumerate()
            .iter()
            .map(ParameterSet::name)
            .collect_vec();
        assert_eq!(
            names,
            vec!["10_100ms_1M_1", "30_100ms_1M_1", "10_100ms_1M_2", "30_100ms_1M_2"]
        );
        assert_eq!(fct_matrix().len(), 4);
    }

    #[test]
    fn enumeration_is_reproducible() {
        assert_eq!(fct_matrix().enumerate(), fct_matrix().enumerate());
        let serialized = serde_json::to_string(&fct_matrix()).unwrap();
        let restored: ExperimentMatrix = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.enumerate(), fct_matrix().enumerate());
    }

    #[test]
    fn custom_order_keeps_outermost_slowest() {
        let matrix = ExperimentMatrix {
            order: vec![Axis::Bandwidth],
            ..fct_matrix()
        };
        assert_eq!(
            matrix.effective_order(),
            vec![Axis::Bandwidth, Axis::Repetition, Axis::Delay, Axis::Size, Axis::Queue]
        );
        let sets = matrix.enumerate();
        assert_eq!(
            sets.iter().map(|p| (p.bandwidth, p.repetition)).collect_vec(),
            vec![(Some(10), 1), (Some(10), 2), (Some(30), 1), (Some(30), 2)]
        );
    }

    #[test]
    fn repetitions_only() {
        let matrix = ExperimentMatrix {
            repetitions: 3,
            ..Default::default()
        };
        let sets = matrix.enumerate();
        assert_eq!(sets.len(), 3);
        assert!(sets.iter().all(|p| p.bandwidth.is_none() && p.delay.is_none()));
        assert_eq!(sets[2].name(), "3");

        let none = ExperimentMatrix {
            repetitions: 0,
            ..fct_matrix()
        };
        assert!(none.enumerate().is_empty());
        assert!(none.is_empty());
    }

    #[test]
    fn queue_in_name_and_templates() {
        let p = ParameterSet {
            bandwidth: Some(10),
            delay: Some("5ms".to_string()),
            size: None,
            queue: Some(100),
            repetition: 2,
        };
        assert_eq!(p.name(), "10_5ms_q100_2");
        assert_eq!(
            p.substitute(
                "wget http://10.0.0.2/{size}B.dat -o {run_dir}/{bw}_{delay}_{rep}.log # {run} {queue}",
                Path::new("out/x")
            ),
            "wget http://10.0.0.2/B.dat -o out/x/10_5ms_2.log # 10_5ms_q100_2 100"
        );
    }

    #[test]
    fn duplicate_axes_are_rejected() {
        let matrix = ExperimentMatrix {
            order: vec![Axis::Delay, Axis::Bandwidth, Axis::Delay],
            ..Default::default()
        };
        assert!(matrix.validate().is_err());
        assert!(fct_matrix().validate().is_ok());
        assert_eq!("Size".parse::<Axis>().unwrap(), Axis::Size);
    }
}
