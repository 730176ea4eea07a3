//! Error types for the node store and its update engine.

use crate::types::{NodeId, Pre, SourceInfo};
use crate::update::UpdateKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store and update operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The identifier no longer resolves to a position.
    #[error("Target {target} of {kind} no longer exists")]
    TargetGone { target: NodeId, kind: UpdateKind },

    /// Two primitives with incompatible kinds address the same node.
    #[error("Conflicting updates on node {target}: {first} ({first_info}) and {second} ({second_info})")]
    MergeConflict {
        target: NodeId,
        first: UpdateKind,
        first_info: SourceInfo,
        second: UpdateKind,
        second_info: SourceInfo,
    },

    /// A destination path of an external write could not be written.
    #[error("Could not write node {target} to {}: {source}", .path.display())]
    WriteFailure {
        target: NodeId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A structural primitive could not be applied.
    #[error("Cannot apply {kind} to node {target}: {reason}")]
    ApplyFailure {
        target: NodeId,
        kind: UpdateKind,
        reason: String,
    },

    #[error("No node at position {0}")]
    NodeNotFound(Pre),

    #[error("Invalid pending update list state: {0}")]
    InvalidState(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl StoreError {
    pub fn apply_failure(target: NodeId, kind: UpdateKind, reason: impl Into<String>) -> Self {
        Self::ApplyFailure {
            target,
            kind,
            reason: reason.into(),
        }
    }

    pub fn merge_conflict(
        target: NodeId,
        first: (UpdateKind, &SourceInfo),
        second: (UpdateKind, &SourceInfo),
    ) -> Self {
        Self::MergeConflict {
            target,
            first: first.0,
            first_info: first.1.clone(),
            second: second.0,
            second_info: second.1.clone(),
        }
    }

    /// Node the error refers to, if any.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::TargetGone { target, .. }
            | Self::MergeConflict { target, .. }
            | Self::WriteFailure { target, .. }
            | Self::ApplyFailure { target, .. } => Some(*target),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
