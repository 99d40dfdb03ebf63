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
//! Library for running parameter sweeps of network experiments on an emulated network, and for
//! turning their raw logs into comparable metric time series.

pub mod emulation;
pub mod experiments;
pub mod extractor;
pub mod plotter;
pub mod records;
pub mod store;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        emulation::{Emulator, Environment, HostHandle, LocalEmulator, NetnsEmulator},
        experiments::{ExperimentDescription, ExperimentDriver, ExperimentMatrix, ParameterSet},
        extractor::{extract_run_dir, parse},
        plotter::{Chart, ComparisonSet},
        records::{MetricKind, MetricSeries, TimeSeriesSample},
        store::ResultStore,
    };
}
