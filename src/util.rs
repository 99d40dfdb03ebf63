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
//! Utility module collection of functions

use std::{
    env,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use rayon::prelude::*;

/// Configuration file of the logger, looked up in the working directory.
pub const LOG_CONFIG: &str = "log4rs.yml";

/// Initialize logging from `log4rs.yml`. Without a usable config file, fall back to
/// `pretty_env_logger` at `RUST_LOG` (default `info`).
pub fn init_logging() {
    if Path::new(LOG_CONFIG).is_file() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot use {LOG_CONFIG} ({e}), logging to stderr"),
        }
    }
    let filters = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .try_init();
}

/// Full path of `program` if it is an executable file on the `PATH` (or, if it contains a `/`, at
/// the given location).
pub fn which(program: &str) -> Option<PathBuf> {
    let is_executable = |path: &Path| {
        path.metadata()
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    };
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

/// Resolve the glob `patterns` relative to `base` into directories, ordered naturally
/// (`qlen-2` before `qlen-10`) and without duplicates. Invalid patterns are logged and skipped.
pub fn find_run_dirs<S: AsRef<str>>(base: impl AsRef<Path>, patterns: &[S]) -> Vec<PathBuf> {
    let base = base.as_ref();
    let mut dirs = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            base.join(pattern).to_string_lossy().to_string()
        };
        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Invalid pattern {pattern:?}: {e}");
                continue;
            }
        };
        for path in paths {
            match path {
                Ok(path) if path.is_dir() => dirs.push(path),
                Ok(_) => {}
                Err(e) => log::warn!("Cannot access {:?}: {}", e.path(), e.error()),
            }
        }
    }
    dirs.into_iter()
        .unique()
        .sorted_by(|a, b| human_sort::compare(&a.to_string_lossy(), &b.to_string_lossy()))
        .collect_vec()
}

/// Apply `f` to all `dirs` in parallel; results are returned in the order of `dirs`.
pub fn par_map_dirs<F, T>(dirs: &[PathBuf], f: F) -> Vec<T>
where
    F: Fn(&Path) -> T + Sync + Send,
    T: Send,
{
    dirs.par_iter().map(|dir| f(dir.as_path())).collect()
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn run_dirs_are_sorted_naturally() {
        let base = tempfile::tempdir().unwrap();
        for name in ["qlen-10", "qlen-2", "qlen-100", "other"] {
            fs::create_dir(base.path().join(name)).unwrap();
        }
        fs::write(base.path().join("qlen-5"), "not a directory").unwrap();

        let dirs = find_run_dirs(base.path(), &["qlen-*", "qlen-2"]);
        let names = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().to_string())
            .collect_vec();
        assert_eq!(names, vec!["qlen-2", "qlen-10", "qlen-100"]);

        assert!(find_run_dirs(base.path(), &["nothing-*"]).is_empty());
        assert!(find_run_dirs(base.path(), &["[invalid"]).is_empty());
    }

    #[test]
    fn which_finds_sh() {
        assert!(which("sh").is_some());
        assert!(which("netsweep-no-such-program").is_none());
        assert!(which("/nonexistent/sh").is_none());
    }

    #[test]
    fn parallel_map_keeps_order() {
        let dirs = (0..20).map(|i| PathBuf::from(format!("d{i}"))).collect_vec();
        let names = par_map_dirs(&dirs, |d| d.to_string_lossy().to_string());
        assert_eq!(names[7], "d7");
        assert_eq!(names.len(), 20);
    }
}
