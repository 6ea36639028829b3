//! Test fixtures for source trees and loopback fleets.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary tree of source files with automatic cleanup.
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    /// Creates an empty source tree.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the absolute path of `rel`.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Writes a file, creating parent directories.
    pub fn file(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Creates a directory and its parents.
    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }

    /// Sets the permission bits of a file.
    #[cfg(unix)]
    pub fn chmod(&self, rel: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(self.path(rel), fs::Permissions::from_mode(mode))
            .expect("Failed to set permissions");
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary loopback fleet: one subdirectory per worker.
pub struct FleetDir {
    dir: TempDir,
    workers: Vec<String>,
}

impl FleetDir {
    /// Creates a fleet directory with the given workers.
    pub fn with_workers<I, S>(workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let workers: Vec<String> = workers.into_iter().map(Into::into).collect();
        for worker in &workers {
            fs::create_dir(dir.path().join(worker)).expect("Failed to create worker directory");
        }
        Self { dir, workers }
    }

    /// Returns the fleet root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the worker ids.
    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// Returns where `remote_path` lands on `worker`.
    pub fn local(&self, worker: &str, remote_path: &str) -> PathBuf {
        self.dir
            .path()
            .join(worker)
            .join(remote_path.trim_start_matches('/'))
    }

    /// Reads a file received by `worker`.
    pub fn read(&self, worker: &str, remote_path: &str) -> Vec<u8> {
        fs::read(self.local(worker, remote_path)).expect("Failed to read received file")
    }
}
