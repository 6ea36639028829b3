//! The directive published on the fan-out channel in barrier mode.

use crate::error::ProtocolResult;
use crate::target::TargetExpr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File contents keyed by local path, as sent in one-shot mode.
pub type FileMap = BTreeMap<String, String>;

/// Operation carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Copy a file map to a destination on every target.
    FileCopy,
}

/// A whole operation described as a single directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEnvelope {
    /// What the relays should run.
    pub operation_kind: OperationKind,
    /// Which workers the relays should address.
    pub target: TargetExpr,
    /// The controller configuration the operation was started with.
    pub full_config: serde_json::Value,
    /// `[fileMap, destPath]`.
    pub args: (FileMap, String),
    /// Topic on which completion events must be published.
    pub ephemeral_topic: String,
}

impl PublishEnvelope {
    /// Creates a file-copy envelope.
    pub fn file_copy<C: Serialize>(
        target: TargetExpr,
        config: &C,
        files: FileMap,
        dest: impl Into<String>,
        ephemeral_topic: impl Into<String>,
    ) -> ProtocolResult<Self> {
        Ok(Self {
            operation_kind: OperationKind::FileCopy,
            target,
            full_config: serde_json::to_value(config)?,
            args: (files, dest.into()),
            ephemeral_topic: ephemeral_topic.into(),
        })
    }

    /// Returns the file map argument.
    pub fn files(&self) -> &FileMap {
        &self.args.0
    }

    /// Returns the destination argument.
    pub fn dest(&self) -> &str {
        &self.args.1
    }

    /// Encodes the envelope as JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
