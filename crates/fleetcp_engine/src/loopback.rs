//! A loopback executor that plays the worker side on the local machine.
//!
//! Every worker owns a directory below a common root; a remote path such
//! as `/etc/app.conf` addressed to worker `web1` lands in
//! `<root>/web1/etc/app.conf`.

use crate::error::EngineResult;
use crate::executor::{one_shot_remote_path, RemoteExecutor};
use flate2::write::GzDecoder;
use fleetcp_core::{StaticResolver, TargetResolver};
use fleetcp_protocol::{ChunkCall, FileMap, Outcome, TargetExpr, TransferResult, WorkerReplies};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Executes receive calls against per-worker directories.
pub struct LoopbackExecutor {
    root: PathBuf,
    resolver: StaticResolver,
    /// Open gzip streams, keyed by (worker, remote path).
    streams: Mutex<HashMap<(String, String), GzDecoder<File>>>,
}

impl LoopbackExecutor {
    /// Creates a loopback executor for `workers` below `root`.
    pub fn new<I, S>(root: impl Into<PathBuf>, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            resolver: StaticResolver::new(workers),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Uses every subdirectory of `root` as a worker.
    pub fn discover(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        let mut workers = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                workers.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        workers.sort();
        Ok(Self::new(root, workers))
    }

    /// Returns the worker roster.
    pub fn workers(&self) -> &[String] {
        self.resolver.roster()
    }

    /// Returns the number of compressed streams still open.
    pub fn open_streams(&self) -> usize {
        self.streams.lock().len()
    }

    /// Returns the local path that backs `remote_path` on `worker`.
    pub fn local_path(&self, worker: &str, remote_path: &str) -> Result<PathBuf, String> {
        let mut local = self.root.join(worker);
        for component in Path::new(remote_path).components() {
            match component {
                Component::Normal(part) => local.push(part),
                Component::ParentDir => {
                    return Err(format!("refusing path outside destination: {remote_path}"))
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        Ok(local)
    }

    fn apply_chunk(&self, worker: &str, call: &ChunkCall) -> Result<(), String> {
        let local = self.local_path(worker, &call.remote_path)?;

        let Some(data) = call.decode_data().map_err(|e| e.to_string())? else {
            return fs::create_dir_all(&local).map_err(|e| e.to_string());
        };

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        if call.compressed {
            let key = (worker.to_string(), call.remote_path.clone());
            let mut streams = self.streams.lock();
            if !call.append {
                let file = File::create(&local).map_err(|e| e.to_string())?;
                streams.insert(key.clone(), GzDecoder::new(file));
            }
            let decoder = streams
                .get_mut(&key)
                .ok_or_else(|| format!("no compressed stream open for {}", call.remote_path))?;
            decoder.write_all(&data).map_err(|e| e.to_string())?;
            decoder.flush().map_err(|e| e.to_string())?;
        } else {
            let mut options = OpenOptions::new();
            if call.append {
                options.create(true).append(true);
            } else {
                options.create(true).write(true).truncate(true);
            }
            let mut file = options.open(&local).map_err(|e| e.to_string())?;
            file.write_all(&data).map_err(|e| e.to_string())?;
        }

        if let Some(mode) = call.mode {
            set_mode(&local, mode).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn write_file(&self, worker: &str, remote_path: &str, contents: &str) -> Result<(), String> {
        let local = self.local_path(worker, remote_path)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(&local, contents).map_err(|e| e.to_string())
    }
}

fn into_outcome(result: Result<(), String>) -> Outcome {
    match result {
        Ok(()) => Outcome::Success,
        Err(message) => Outcome::Failure(message),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

impl RemoteExecutor for LoopbackExecutor {
    fn receive_chunk(
        &self,
        target: &TargetExpr,
        call: &ChunkCall,
        _timeout: Duration,
    ) -> EngineResult<WorkerReplies> {
        let mut replies = WorkerReplies::new();
        for worker in self.resolver.resolve(target) {
            let outcome = into_outcome(self.apply_chunk(&worker, call));
            if let Some(message) = outcome.error() {
                warn!("{} rejected {}: {}", worker, call.remote_path, message);
            } else {
                debug!("{} applied {}", worker, call.remote_path);
            }
            replies.insert(worker, outcome);
        }
        Ok(replies)
    }

    fn receive_files(
        &self,
        target: &TargetExpr,
        files: &FileMap,
        dest: &str,
        _timeout: Duration,
    ) -> EngineResult<TransferResult> {
        let mut result = TransferResult::new();
        for worker in self.resolver.resolve(target) {
            for (source, contents) in files {
                let remote = one_shot_remote_path(source, dest, files.len());
                let outcome = into_outcome(self.write_file(&worker, &remote, contents));
                result.record(worker.clone(), remote, outcome);
            }
        }
        Ok(result)
    }

    fn close_stream(&self, target: &TargetExpr, remote_path: &str) {
        let mut streams = self.streams.lock();
        for worker in self.resolver.resolve(target) {
            let key = (worker, remote_path.to_string());
            let Some(mut decoder) = streams.remove(&key) else {
                continue;
            };
            match decoder.try_finish() {
                Ok(()) => debug!("{} closed {}", key.0, remote_path),
                Err(e) => warn!("{} closed {} before its stream ended: {}", key.0, remote_path, e),
            }
        }
    }
}
