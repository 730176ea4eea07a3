//! External writes of nodes to files.

use super::primitive::ApplyOutcome;
use crate::error::{Result, StoreError};
use crate::serialize::{Serializer, SerializerOptions};
use crate::store::NodeStore;
use crate::types::NodeId;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Write of a node's serialization to one or more destination paths.
///
/// Writes to the same node are merged by uniting their paths; the first
/// write's serializer options are kept.
#[derive(Clone, Debug, PartialEq)]
pub struct Put {
    paths: Vec<PathBuf>,
    options: SerializerOptions,
}

impl Put {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, SerializerOptions::default())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: SerializerOptions) -> Self {
        Self {
            paths: vec![path.into()],
            options,
        }
    }

    /// Destination paths, in the order they were added.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// Number of destination paths.
    pub fn size(&self) -> usize {
        self.paths.len()
    }

    /// Add the destinations of another write. Known paths are not repeated.
    pub fn merge(&mut self, other: Put) {
        for path in other.paths {
            if !self.paths.contains(&path) {
                self.paths.push(path);
            }
        }
    }

    /// Serialize the target once and write it to every path.
    ///
    /// A target that no longer exists is skipped without error. A path that
    /// cannot be written is reported in the outcome; the remaining paths are
    /// still written.
    pub(crate) fn apply(self, target: NodeId, store: &NodeStore) -> Result<ApplyOutcome> {
        let Some(pre) = store.position_of(target) else {
            debug!(%target, "put target no longer exists, skipping");
            return Ok(ApplyOutcome::Skipped);
        };

        let snapshot = store.read_subtree(pre)?;
        let rendered = Serializer::for_store(&self.options, store.meta()).serialize(&snapshot);

        let mut written = 0;
        let mut failures = Vec::new();
        for path in self.paths {
            match write_file(&path, rendered.as_bytes()) {
                Ok(()) => {
                    debug!(%target, path = %path.display(), bytes = rendered.len(), "wrote node");
                    written += 1;
                }
                Err(source) => {
                    warn!(%target, path = %path.display(), error = %source, "failed to write node");
                    failures.push(StoreError::WriteFailure {
                        target,
                        path,
                        source,
                    });
                }
            }
        }

        Ok(ApplyOutcome::Written { written, failures })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
