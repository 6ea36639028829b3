//! Chunked transfer engine.

use crate::error::{EngineError, EngineResult};
use crate::executor::RemoteExecutor;
use bytes::Bytes;
use fleetcp_core::{
    collect_paths, load_files, ChunkReader, CollectedPaths, CopyConfig, FileEntry,
    RemotePathResolver, TargetSet,
};
use fleetcp_protocol::{ChunkCall, Outcome, TransferChunk, TransferResult, WorkerReplies};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The current state of the transfer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No transfer has started.
    Idle,
    /// Files are being sent.
    Transferring,
    /// Empty directories are being created.
    CreatingDirs,
    /// The last transfer finished.
    Done,
    /// The last transfer aborted on a fatal error.
    Failed,
}

impl TransferState {
    /// Returns true if a transfer can be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            TransferState::Idle | TransferState::Done | TransferState::Failed
        )
    }
}

/// Statistics about the last transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Files for which at least one call was issued.
    pub files: u64,
    /// Chunk calls issued.
    pub chunks: u64,
    /// Payload bytes sent, after compression.
    pub bytes: u64,
    /// Directory creation calls issued.
    pub dirs: u64,
    /// Calls that could not be published.
    pub publish_failures: u64,
    /// Paths omitted because no remote path could be computed.
    pub skipped: u64,
    /// Wall time of the last transfer.
    pub duration: Duration,
}

/// Drives ordered, chunked delivery of files to a set of workers.
///
/// Chunks of one file are sent strictly in order, one call at a time. The
/// first failure a worker reports for a file is kept for that file even if
/// later chunks succeed.
pub struct ChunkedTransferEngine<E: RemoteExecutor> {
    config: CopyConfig,
    executor: Arc<E>,
    state: RwLock<TransferState>,
    stats: RwLock<TransferStats>,
}

impl<E: RemoteExecutor> ChunkedTransferEngine<E> {
    /// Creates a new engine.
    pub fn new(config: CopyConfig, executor: E) -> Self {
        Self::with_shared(config, Arc::new(executor))
    }

    /// Creates a new engine over a shared executor.
    pub fn with_shared(config: CopyConfig, executor: Arc<E>) -> Self {
        Self {
            config,
            executor,
            state: RwLock::new(TransferState::Idle),
            stats: RwLock::new(TransferStats::default()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Gets the executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Gets the current state.
    pub fn state(&self) -> TransferState {
        *self.state.read()
    }

    /// Gets the stats of the last transfer.
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: TransferState) {
        *self.state.write() = state;
    }

    /// Collects the configured sources and transfers them to `targets`.
    ///
    /// Fails only on fatal input errors. Per-worker failures, including
    /// calls that could not be published, are part of the returned result.
    pub fn run(&self, targets: &TargetSet) -> EngineResult<TransferResult> {
        let collected = self
            .config
            .validate()
            .and_then(|()| collect_paths(&self.config.sources));
        match collected {
            Ok(collected) => self.transfer(&collected, targets),
            Err(e) => {
                error!("{}", e);
                self.set_state(TransferState::Failed);
                Err(e.into())
            }
        }
    }

    /// Transfers already collected paths to `targets`.
    pub fn transfer(
        &self,
        collected: &CollectedPaths,
        targets: &TargetSet,
    ) -> EngineResult<TransferResult> {
        let current = self.state();
        if !current.can_start() {
            return Err(EngineError::InvalidStateTransition {
                from: format!("{:?}", current),
                to: "Transferring".into(),
            });
        }

        let start = Instant::now();
        *self.stats.write() = TransferStats::default();
        self.set_state(TransferState::Transferring);
        info!(
            "Copying {} file(s) and {} empty dir(s) to {} target(s)",
            collected.file_count(),
            collected.empty_dirs.len(),
            targets.len()
        );

        let resolver = RemotePathResolver::new(&self.config.sources, &self.config.dest, collected);
        let mut result = TransferResult::new();

        for entry in &collected.files {
            let remote_path = match resolver.resolve(&entry.path) {
                Ok(remote_path) => remote_path,
                Err(e) => {
                    error!("{}", e);
                    self.stats.write().skipped += 1;
                    continue;
                }
            };
            self.transfer_file(entry, &remote_path, targets, &mut result);
        }

        self.set_state(TransferState::CreatingDirs);
        for dir in &collected.empty_dirs {
            let remote_path = match resolver.resolve(dir) {
                Ok(remote_path) => remote_path,
                Err(e) => {
                    error!("{}", e);
                    self.stats.write().skipped += 1;
                    continue;
                }
            };
            debug!(
                "Creating empty dir {:?} on {} target '{}'",
                dir,
                self.config.target.selection.as_str(),
                self.config.target
            );
            let call = ChunkCall::create_dir(remote_path.clone());
            self.stats.write().dirs += 1;
            match self.dispatch(&call) {
                Some(replies) => {
                    for (worker, outcome) in replies {
                        result.record(worker, remote_path.as_str(), outcome);
                    }
                }
                None => {
                    for worker in targets {
                        result.record(worker.as_str(), remote_path.as_str(), Outcome::failure("Publish failed."));
                    }
                }
            }
        }

        let mut stats = self.stats.write();
        stats.duration = start.elapsed();
        info!(
            "Transfer finished: {} chunk(s), {} byte(s), {} dir(s), {} publish failure(s) in {:?}",
            stats.chunks, stats.bytes, stats.dirs, stats.publish_failures, stats.duration
        );
        drop(stats);
        self.set_state(TransferState::Done);
        Ok(result)
    }

    fn transfer_file(
        &self,
        entry: &FileEntry,
        remote_path: &str,
        targets: &TargetSet,
        result: &mut TransferResult,
    ) {
        let chunks = match ChunkReader::open(
            &entry.path,
            remote_path,
            self.config.chunk_size,
            self.config.compress,
            entry.mode,
        ) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Unable to read {:?}: {}", entry.path, e);
                record_all(result, targets, remote_path, &format!("Unable to read source: {e}"));
                return;
            }
        };
        self.stats.write().files += 1;

        // First failure per worker for this file.
        let mut failed: BTreeMap<String, String> = BTreeMap::new();
        let mut sent = 0u64;

        for chunk in chunks {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Read of {:?} failed after {} chunk(s): {}", entry.path, sent, e);
                    record_all(result, targets, remote_path, &format!("Unable to read source: {e}"));
                    break;
                }
            };
            sent += 1;
            if !self.send_chunk(entry, &chunk, targets, &mut failed, result) {
                break;
            }
        }

        if sent == 0 {
            // Nothing was read; still create the file on the workers.
            let chunk = TransferChunk::new(remote_path, Bytes::new(), 1, false, entry.mode);
            self.send_chunk(entry, &chunk, targets, &mut failed, result);
        }

        if self.config.compress {
            self.executor.close_stream(&self.config.target, remote_path);
        }

        for (worker, message) in failed {
            result.record(worker, remote_path, Outcome::Failure(message));
        }
    }

    /// Sends one chunk. Returns false when the rest of the file must be skipped.
    fn send_chunk(
        &self,
        entry: &FileEntry,
        chunk: &TransferChunk,
        targets: &TargetSet,
        failed: &mut BTreeMap<String, String>,
        result: &mut TransferResult,
    ) -> bool {
        debug!(
            "Copying {:?} to {} target '{}' as {}{}",
            entry.path,
            self.config.target.selection.as_str(),
            self.config.target,
            chunk.remote_path,
            if chunk.append {
                format!(" (chunk #{})", chunk.index)
            } else {
                String::new()
            }
        );

        {
            let mut stats = self.stats.write();
            stats.chunks += 1;
            stats.bytes += chunk.len() as u64;
        }

        let Some(replies) = self.dispatch(&chunk.to_call()) else {
            let message = publish_failure_message(chunk.index, self.config.chunk_size);
            record_all(result, targets, &chunk.remote_path, &message);
            return false;
        };

        for (worker, outcome) in replies {
            if let Some(message) = outcome.error() {
                failed
                    .entry(worker.clone())
                    .or_insert_with(|| message.to_string());
            }
            result.record(worker, chunk.remote_path.as_str(), outcome);
        }
        true
    }

    /// Issues one call; `None` means it could not be published.
    fn dispatch(&self, call: &ChunkCall) -> Option<WorkerReplies> {
        match self
            .executor
            .receive_chunk(&self.config.target, call, self.config.timeout)
        {
            Ok(replies) if !replies.is_empty() => Some(replies),
            Ok(_) => {
                error!("No worker replied for {}", call.remote_path);
                self.stats.write().publish_failures += 1;
                None
            }
            Err(e) => {
                error!("Publish of {} failed: {}", call.remote_path, e);
                self.stats.write().publish_failures += 1;
                None
            }
        }
    }
}

fn record_all(result: &mut TransferResult, targets: &TargetSet, remote_path: &str, message: &str) {
    for worker in targets {
        result.record(worker.as_str(), remote_path, Outcome::failure(message));
    }
}

/// Builds the error recorded for every target when a chunk call could not be published.
pub fn publish_failure_message(index: u64, chunk_size: usize) -> String {
    format!(
        "Publish failed.{} It may be necessary to decrease the chunk size (current value: {})",
        if index > 1 { " File partially transferred." } else { "" },
        chunk_size
    )
}

/// Sends every source in one receive-files call.
///
/// Only regular files are accepted; directories need chunked mode.
pub fn send_files<E: RemoteExecutor + ?Sized>(
    config: &CopyConfig,
    executor: &E,
) -> EngineResult<TransferResult> {
    config.validate()?;
    let files = load_files(&config.sources)?;
    info!(
        "Copying {} file(s) to {} target '{}'",
        files.len(),
        config.target.selection.as_str(),
        config.target
    );
    executor.receive_files(&config.target, &files, &config.dest, config.timeout)
}
