//! Positionally addressed node storage.
//!
//! Nodes live in a pre-ordered table. A node's position shifts whenever
//! content before it is inserted or removed; its identifier stays fixed and
//! is translated to a position through the identifier index.

mod index;
mod node_store;
mod snapshot;
mod table;

pub use index::IdIndex;
pub use node_store::{NodeStore, DOCUMENT_ID};
pub use snapshot::NodeSnapshot;
pub use table::NodeTable;
