//! On-disk database wrapping a node store.

use crate::error::{Result, StoreError};
use crate::store::{NodeSnapshot, NodeStore};
use crate::types::{Fragment, NodeId, NodeRecord, Pre, StoreMeta};
use crate::update::{ApplyReport, PendingUpdateList};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Directory holding the database files.
    pub path: PathBuf,

    /// Database name, stored in the metadata.
    pub name: String,

    /// Strip whitespace-only text when loading documents.
    pub chop: bool,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let meta = StoreMeta::default();
        Self {
            path: PathBuf::from("./db"),
            name: meta.name,
            chop: meta.chop,
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    fn meta(&self) -> StoreMeta {
        StoreMeta {
            name: self.name.clone(),
            chop: self.chop,
        }
    }
}

const MANIFEST_FILE: &str = "store.manifest";
const META_FILE: &str = "meta.json";
const TABLE_FILE: &str = "table.bin";
const LOCK_FILE: &str = "LOCK";

/// Magic bytes for the database manifest.
const DB_MAGIC: &[u8; 4] = b"TSD\0";

/// Magic bytes for the node table file.
const TABLE_MAGIC: &[u8; 4] = b"TBL\0";

/// Current format version of both files.
const DB_VERSION: u8 = 1;

/// Table file bytes around the payload: magic, version, id counter, length
/// and the trailing checksum.
const TABLE_FRAMING: u64 = 4 + 1 + 8 + 8 + 4;

/// A node store persisted in a directory.
///
/// Readers share the store; [`Database::apply`] takes the write lock for the
/// whole batch, so apply phases never overlap. Only one process can open a
/// database at a time.
pub struct Database {
    config: DatabaseConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    store: RwLock<NodeStore>,
}

impl Database {
    /// Open an existing database or create an empty one.
    pub fn open_or_create(config: DatabaseConfig) -> Result<Self> {
        if config.path.join(MANIFEST_FILE).exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a database holding an empty document.
    pub fn create(config: DatabaseConfig) -> Result<Self> {
        let store = NodeStore::new(config.meta());
        Self::init(config, store)
    }

    /// Create a database holding the given document content.
    pub fn create_with(config: DatabaseConfig, content: Vec<Fragment>) -> Result<Self> {
        let store = NodeStore::from_document(config.meta(), content)?;
        Self::init(config, store)
    }

    fn init(config: DatabaseConfig, store: NodeStore) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = acquire_lock(&config.path)?;

        write_manifest(&config.path)?;
        write_meta(&config.path, store.meta())?;
        write_table(&config.path, &store)?;

        info!(path = %config.path.display(), nodes = store.len(), "created database");
        Ok(Self {
            config,
            _lock_file: lock_file,
            store: RwLock::new(store),
        })
    }

    /// Open an existing database.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        verify_manifest(&config.path)?;
        let lock_file = acquire_lock(&config.path)?;

        let meta = read_meta(&config.path)?;
        let store = read_table(&config.path, meta)?;

        info!(path = %config.path.display(), nodes = store.len(), "opened database");
        Ok(Self {
            config,
            _lock_file: lock_file,
            store: RwLock::new(store),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn meta(&self) -> StoreMeta {
        self.store.read().meta().clone()
    }

    /// Number of rows, the document node included.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    pub fn position_of(&self, id: NodeId) -> Option<Pre> {
        self.store.read().position_of(id)
    }

    pub fn read_subtree(&self, pre: Pre) -> Result<NodeSnapshot> {
        self.store.read().read_subtree(pre)
    }

    /// Read a node by identifier; `None` if it no longer exists.
    pub fn read_node(&self, id: NodeId) -> Result<Option<NodeSnapshot>> {
        let store = self.store.read();
        match store.position_of(id) {
            Some(pre) => store.read_subtree(pre).map(Some),
            None => Ok(None),
        }
    }

    /// Run a closure against the store under the read lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&NodeStore) -> R) -> R {
        f(&self.store.read())
    }

    /// Apply a pending update list and persist the result.
    ///
    /// The table is written back whenever at least one structural primitive
    /// changed it, including batches that were aborted part way. Once the
    /// list has been applied the report is always returned; a failed write
    /// is carried in [`ApplyReport::persist_failure`] and the in-memory
    /// store keeps the changes until the next successful write or
    /// [`flush`](Self::flush).
    pub fn apply(&self, updates: &mut PendingUpdateList) -> Result<ApplyReport> {
        let mut store = self.store.write();
        let mut report = updates.apply_all(&mut store)?;

        if !report.applied.is_empty() {
            match write_table(&self.config.path, &store) {
                Ok(()) => debug!(
                    changes = report.applied.len(),
                    delta = report.delta(),
                    "persisted node table"
                ),
                Err(err) => {
                    warn!(error = %err, "failed to persist node table");
                    report.persist_failure = Some(err);
                }
            }
        }
        Ok(report)
    }

    /// Write the node table to disk.
    pub fn flush(&self) -> Result<()> {
        write_table(&self.config.path, &self.store.read())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best-effort flush on drop
        let _ = self.flush();
    }
}

fn write_manifest(path: &Path) -> Result<()> {
    let mut file = File::create(path.join(MANIFEST_FILE))?;
    file.write_all(DB_MAGIC)?;
    file.write_all(&[DB_VERSION])?;
    file.sync_all()?;
    Ok(())
}

fn verify_manifest(path: &Path) -> Result<()> {
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(StoreError::NotInitialized);
    }
    let mut file = File::open(manifest_path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != DB_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid database magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != DB_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported database version: {}",
            version[0]
        )));
    }
    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_file = File::create(path.join(LOCK_FILE))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| StoreError::Locked)?;
    Ok(lock_file)
}

fn write_meta(path: &Path, meta: &StoreMeta) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta)?;
    write_atomic(&path.join(META_FILE), &json)
}

fn read_meta(path: &Path) -> Result<StoreMeta> {
    let bytes = fs::read(path.join(META_FILE))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Table file: magic, version, id counter, payload length, MessagePack rows,
/// CRC32 of the payload.
fn write_table(path: &Path, store: &NodeStore) -> Result<()> {
    let payload = rmp_serde::to_vec(store.table().records())?;

    let mut bytes = Vec::with_capacity(payload.len() + TABLE_FRAMING as usize);
    bytes.extend_from_slice(TABLE_MAGIC);
    bytes.push(DB_VERSION);
    bytes.extend_from_slice(&store.next_id().0.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());

    write_atomic(&path.join(TABLE_FILE), &bytes)
}

fn read_table(path: &Path, meta: StoreMeta) -> Result<NodeStore> {
    let mut file = File::open(path.join(TABLE_FILE))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != TABLE_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid table magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != DB_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported table version: {}",
            version[0]
        )));
    }

    let mut next_id_bytes = [0u8; 8];
    file.read_exact(&mut next_id_bytes)?;
    let next_id = u64::from_le_bytes(next_id_bytes);

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes);
    let available = file.metadata()?.len().saturating_sub(TABLE_FRAMING);
    if len > available {
        return Err(StoreError::Corruption(format!(
            "table payload of {} bytes exceeds the {} bytes on disk",
            len, available
        )));
    }

    let mut payload = vec![0u8; len as usize];
    file.read_exact(&mut payload)?;

    let mut checksum_bytes = [0u8; 4];
    file.read_exact(&mut checksum_bytes)?;
    let stored_checksum = u32::from_le_bytes(checksum_bytes);
    let computed_checksum = crc32fast::hash(&payload);
    if stored_checksum != computed_checksum {
        return Err(StoreError::ChecksumMismatch {
            expected: stored_checksum,
            got: computed_checksum,
        });
    }

    let records: Vec<NodeRecord> = rmp_serde::from_slice(&payload)?;
    NodeStore::from_parts(meta, records, next_id)
}

/// Write to a temporary file, then rename it over `target`.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = target.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, target)?;
    Ok(())
}
