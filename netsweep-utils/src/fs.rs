//! Path helpers shared by the binaries.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process,
};

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;

    /// Append `{p}.{ext}`.
    fn then_ext(self, p: impl AsRef<str>, ext: &str) -> PathBuf {
        self.then(format!("{}.{ext}", p.as_ref()))
    }
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}

/// Check whether the current process can create files in `dir`.
///
/// Permission bits alone do not tell (root, read-only mounts, ACLs), so this creates and removes a
/// probe file.
pub fn is_writable_dir(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return false;
    }
    let probe = dir.then(format!(".netsweep-probe-{}", process::id()));
    match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(_) => {
            if let Err(e) = fs::remove_file(&probe) {
                log::trace!("Cannot remove write probe {probe:?}: {e}");
            }
            true
        }
        Err(e) => {
            log::trace!("{dir:?} is not writable: {e}");
            false
        }
    }
}

/// Last component of `path` as a `String`, or the whole path if it has none (e.g., `..`).
pub fn dir_name(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
