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
//! Tests spanning several modules: sweeps on the local backend, and extraction followed by
//! plotting.
//!
//! The driver tests spawn real shells; run them with
//!
//! ```shell
//! cargo test -- --nocapture
//! ```

use std::{fs, path::Path};

mod pipeline;

/// Write `content` to `dir/name`, creating `dir` if needed.
pub fn write_file(dir: impl AsRef<Path>, name: &str, content: &str) {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}
