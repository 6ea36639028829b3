//! Transfer chunks and receive-chunk call arguments.

use crate::error::ProtocolResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One slice of a file's (possibly compressed) byte stream.
///
/// Chunks for one file are numbered from 1 and must be delivered in
/// increasing index order: the first chunk truncates the remote file and
/// every later chunk appends to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferChunk {
    /// Destination path on the worker.
    pub remote_path: String,
    /// Raw payload bytes (compressed when `compressed` is set).
    pub payload: Bytes,
    /// Whether the receiver appends instead of truncating.
    pub append: bool,
    /// Whether the payload is part of a gzip stream.
    pub compressed: bool,
    /// Permission bits to apply on the worker, if known.
    pub mode: Option<u32>,
    /// 1-based position of this chunk within the file.
    pub index: u64,
}

impl TransferChunk {
    /// Creates a chunk. `append` is derived from the index.
    pub fn new(
        remote_path: impl Into<String>,
        payload: Bytes,
        index: u64,
        compressed: bool,
        mode: Option<u32>,
    ) -> Self {
        Self {
            remote_path: remote_path.into(),
            payload,
            append: index > 1,
            compressed,
            mode,
            index,
        }
    }

    /// Returns the payload size in bytes, before transport encoding.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encodes the chunk into the arguments of a receive-chunk call.
    pub fn to_call(&self) -> ChunkCall {
        ChunkCall {
            remote_path: self.remote_path.clone(),
            data: Some(STANDARD.encode(&self.payload)),
            append: self.append,
            compressed: self.compressed,
            mode: self.mode,
        }
    }
}

/// Arguments of the worker-side receive-chunk function.
///
/// A call without `data` asks the worker to create `remote_path` as a
/// directory; `append`, `compressed` and `mode` are then ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCall {
    /// Destination path on the worker.
    pub remote_path: String,
    /// Base64-encoded payload, or `None` for directory creation.
    pub data: Option<String>,
    /// Whether to append to an existing file.
    #[serde(default)]
    pub append: bool,
    /// Whether `data` is a slice of a gzip stream.
    #[serde(default)]
    pub compressed: bool,
    /// Permission bits to apply.
    #[serde(default)]
    pub mode: Option<u32>,
}

impl ChunkCall {
    /// Creates a directory-creation call.
    pub fn create_dir(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            data: None,
            append: false,
            compressed: false,
            mode: None,
        }
    }

    /// Returns true if this call creates a directory.
    pub fn is_create_dir(&self) -> bool {
        self.data.is_none()
    }

    /// Decodes the transport-safe payload back into bytes.
    pub fn decode_data(&self) -> ProtocolResult<Option<Vec<u8>>> {
        match &self.data {
            Some(encoded) => Ok(Some(STANDARD.decode(encoded)?)),
            None => Ok(None),
        }
    }
}
