//! Remote executor abstraction.

use crate::error::{EngineError, EngineResult};
use fleetcp_core::{dest_is_dir, StaticResolver, TargetResolver};
use fleetcp_protocol::{ChunkCall, FileMap, Outcome, TargetExpr, TransferResult, WorkerReplies};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Delivers function calls to workers and collects their replies.
///
/// This trait abstracts the remote-execution transport. A call either
/// returns the replies of the workers that answered, or fails as a whole
/// when it could not be published. An empty reply map is treated by
/// callers the same way as a publish failure.
pub trait RemoteExecutor: Send + Sync {
    /// Invokes the receive-chunk function on every worker matched by `target`.
    ///
    /// A call without data asks the workers to create a directory.
    fn receive_chunk(
        &self,
        target: &TargetExpr,
        call: &ChunkCall,
        timeout: Duration,
    ) -> EngineResult<WorkerReplies>;

    /// Invokes the receive-files function with a whole file map.
    fn receive_files(
        &self,
        target: &TargetExpr,
        files: &FileMap,
        dest: &str,
        timeout: Duration,
    ) -> EngineResult<TransferResult>;

    /// Signals that no more chunks will follow for `remote_path`.
    ///
    /// Executors that keep per-file state between chunks release it here.
    fn close_stream(&self, _target: &TargetExpr, _remote_path: &str) {}
}

impl<T: RemoteExecutor + ?Sized> RemoteExecutor for Arc<T> {
    fn receive_chunk(
        &self,
        target: &TargetExpr,
        call: &ChunkCall,
        timeout: Duration,
    ) -> EngineResult<WorkerReplies> {
        (**self).receive_chunk(target, call, timeout)
    }

    fn receive_files(
        &self,
        target: &TargetExpr,
        files: &FileMap,
        dest: &str,
        timeout: Duration,
    ) -> EngineResult<TransferResult> {
        (**self).receive_files(target, files, dest, timeout)
    }

    fn close_stream(&self, target: &TargetExpr, remote_path: &str) {
        (**self).close_stream(target, remote_path)
    }
}

/// Returns where a one-shot file lands on a worker.
pub fn one_shot_remote_path(source: &str, dest: &str, file_count: usize) -> String {
    if !dest_is_dir(dest, file_count, false) {
        return dest.to_string();
    }
    let name = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if dest.ends_with('/') || dest.ends_with('\\') {
        format!("{dest}{name}")
    } else {
        format!("{dest}/{name}")
    }
}

/// A call observed by `MockExecutor`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// A receive-chunk call.
    Chunk {
        /// Target expression.
        target: TargetExpr,
        /// Call arguments.
        call: ChunkCall,
        /// Timeout passed by the caller.
        timeout: Duration,
    },
    /// A receive-files call.
    Files {
        /// Target expression.
        target: TargetExpr,
        /// File map.
        files: FileMap,
        /// Destination.
        dest: String,
    },
    /// The end of a chunked file.
    CloseStream {
        /// Target expression.
        target: TargetExpr,
        /// Remote path of the file.
        remote_path: String,
    },
}

/// A scripted executor for testing.
///
/// Unscripted calls succeed on every worker of the roster that matches the
/// target expression.
#[derive(Default)]
pub struct MockExecutor {
    resolver: StaticResolver,
    chunk_replies: Mutex<VecDeque<EngineResult<WorkerReplies>>>,
    file_replies: Mutex<VecDeque<EngineResult<TransferResult>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockExecutor {
    /// Creates a mock executor over a worker roster.
    pub fn new<I, S>(workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resolver: StaticResolver::new(workers),
            ..Self::default()
        }
    }

    /// Queues the replies of the next receive-chunk call.
    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = (S, Outcome)>,
        S: Into<String>,
    {
        let replies = replies.into_iter().map(|(w, o)| (w.into(), o)).collect();
        self.chunk_replies.lock().push_back(Ok(replies));
    }

    /// Queues a publish failure for the next receive-chunk call.
    pub fn push_publish_failure(&self) {
        self.chunk_replies
            .lock()
            .push_back(Err(EngineError::publish("no reply from any worker")));
    }

    /// Queues the result of the next receive-files call.
    pub fn push_files_result(&self, result: EngineResult<TransferResult>) {
        self.file_replies.lock().push_back(result);
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the receive-chunk calls made so far.
    pub fn chunk_calls(&self) -> Vec<ChunkCall> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Chunk { call, .. } => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RemoteExecutor for MockExecutor {
    fn receive_chunk(
        &self,
        target: &TargetExpr,
        call: &ChunkCall,
        timeout: Duration,
    ) -> EngineResult<WorkerReplies> {
        self.calls.lock().push(RecordedCall::Chunk {
            target: target.clone(),
            call: call.clone(),
            timeout,
        });
        if let Some(scripted) = self.chunk_replies.lock().pop_front() {
            return scripted;
        }
        Ok(self
            .resolver
            .resolve(target)
            .into_iter()
            .map(|worker| (worker, Outcome::Success))
            .collect())
    }

    fn receive_files(
        &self,
        target: &TargetExpr,
        files: &FileMap,
        dest: &str,
        _timeout: Duration,
    ) -> EngineResult<TransferResult> {
        self.calls.lock().push(RecordedCall::Files {
            target: target.clone(),
            files: files.clone(),
            dest: dest.to_string(),
        });
        if let Some(scripted) = self.file_replies.lock().pop_front() {
            return scripted;
        }
        let mut result = TransferResult::new();
        for worker in self.resolver.resolve(target) {
            for source in files.keys() {
                let remote = one_shot_remote_path(source, dest, files.len());
                result.record(worker.clone(), remote, Outcome::Success);
            }
        }
        Ok(result)
    }

    fn close_stream(&self, target: &TargetExpr, remote_path: &str) {
        self.calls.lock().push(RecordedCall::CloseStream {
            target: target.clone(),
            remote_path: remote_path.to_string(),
        });
    }
}
