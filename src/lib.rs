//! # Tree Store
//!
//! Mutation engine of a positional XML-like node store.
//!
//! ## Core Concepts
//!
//! - **Node store**: nodes in a pre-ordered table; positions shift on every
//!   structural change, node identifiers never do
//! - **Update primitives**: requested changes addressed by identifier
//! - **Pending update list**: collects the primitives of one snapshot, merges
//!   them, detects conflicts and applies them in a safe order
//! - **Sequence builder**: growable buffer handed over to an immutable
//!   sequence when finalized
//!
//! ## Example
//!
//! ```ignore
//! use treestore::{Database, DatabaseConfig, Fragment, PendingUpdateList, SourceInfo, UpdatePrimitive};
//!
//! let db = Database::create_with(
//!     DatabaseConfig::new("./my-db"),
//!     vec![Fragment::element("list").with_child(Fragment::element("item"))],
//! )?;
//! let item = db.with_store(|s| s.id_at(2)).unwrap();
//!
//! let mut updates = PendingUpdateList::new();
//! updates.add(UpdatePrimitive::rename(item, "entry", SourceInfo::new(1, 1)))?;
//! updates.add(UpdatePrimitive::put(item, "entry.xml", SourceInfo::new(2, 1)))?;
//! let report = db.apply(&mut updates)?;
//! ```

pub mod database;
pub mod error;
pub mod sequence;
pub mod serialize;
pub mod store;
pub mod types;
pub mod update;

// Re-exports
pub use database::{Database, DatabaseConfig};
pub use error::{Result, StoreError};
pub use sequence::{Sequence, SequenceBuilder};
pub use serialize::{Serializer, SerializerOptions};
pub use store::{NodeSnapshot, NodeStore, DOCUMENT_ID};
pub use types::*;
pub use update::{
    AppliedUpdate, ApplyOutcome, ApplyReport, MergeSummary, PendingUpdateList, PulState, Put,
    UpdateKind, UpdateOp, UpdatePrimitive,
};
