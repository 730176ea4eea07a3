//! Node store: table, identifier index and metadata.

use super::index::IdIndex;
use super::snapshot::NodeSnapshot;
use super::table::NodeTable;
use crate::error::{Result, StoreError};
use crate::types::{Fragment, NodeId, NodeKind, NodeRecord, Pre, StoreMeta};
use tracing::trace;

/// Identifier of the document node of every store.
pub const DOCUMENT_ID: NodeId = NodeId(0);

/// Positionally addressed node store.
///
/// Positions change whenever nodes are inserted or deleted; identifiers never
/// do. The store keeps the identifier index consistent after every
/// structural change it performs.
#[derive(Clone, Debug)]
pub struct NodeStore {
    /// Store metadata.
    meta: StoreMeta,

    /// Node rows in document order.
    table: NodeTable,

    /// Identifier to position.
    index: IdIndex,

    /// Next identifier to assign.
    next_id: u64,
}

impl NodeStore {
    /// Create a store holding an empty document.
    pub fn new(meta: StoreMeta) -> Self {
        let root = NodeRecord {
            id: DOCUMENT_ID,
            kind: NodeKind::Document,
            level: 0,
            name: None,
            value: None,
        };
        let table = NodeTable::from_records(vec![root]);
        let index = IdIndex::rebuild(table.records());

        Self {
            meta,
            table,
            index,
            next_id: DOCUMENT_ID.0 + 1,
        }
    }

    /// Create a store from document content.
    ///
    /// With `meta.chop` set, whitespace-only text nodes are dropped while
    /// loading.
    pub fn from_document(meta: StoreMeta, content: Vec<Fragment>) -> Result<Self> {
        if content.iter().any(|f| f.kind() == NodeKind::Attribute) {
            return Err(StoreError::InvalidOperation(
                "document content cannot contain attributes".into(),
            ));
        }

        let mut store = Self::new(meta);
        let content: Vec<Fragment> = if store.meta.chop {
            content.into_iter().filter_map(chop).collect()
        } else {
            content
        };
        store.insert_fragments(1, 1, &content)?;
        Ok(store)
    }

    /// Restore a store from persisted rows.
    pub(crate) fn from_parts(meta: StoreMeta, records: Vec<NodeRecord>, next_id: u64) -> Result<Self> {
        match records.first() {
            Some(root) if root.kind == NodeKind::Document && root.level == 0 => {}
            _ => {
                return Err(StoreError::Corruption(
                    "table does not start with a document node".into(),
                ))
            }
        }

        for pair in records.windows(2) {
            if pair[1].level == 0 || pair[1].level > pair[0].level + 1 {
                return Err(StoreError::Corruption(format!(
                    "invalid level {} after {} for node {}",
                    pair[1].level, pair[0].level, pair[1].id
                )));
            }
        }

        if let Some(row) = records.iter().find(|r| r.id.0 >= next_id) {
            return Err(StoreError::Corruption(format!(
                "node id {} not below id counter {}",
                row.id, next_id
            )));
        }

        let table = NodeTable::from_records(records);
        let index = IdIndex::rebuild(table.records());
        if index.len() != table.len() {
            return Err(StoreError::Corruption("duplicate node ids".into()));
        }

        Ok(Self {
            meta,
            table,
            index,
            next_id,
        })
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Number of rows, the document node included.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Identifier the next created node will receive.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next_id)
    }

    /// Current position of a node, or `None` if it was deleted or replaced.
    pub fn position_of(&self, id: NodeId) -> Option<Pre> {
        self.index.get(id)
    }

    pub fn id_at(&self, pre: Pre) -> Option<NodeId> {
        self.table.get(pre).map(|r| r.id)
    }

    pub fn record(&self, pre: Pre) -> Option<&NodeRecord> {
        self.table.get(pre)
    }

    pub fn kind_at(&self, pre: Pre) -> Option<NodeKind> {
        self.table.get(pre).map(|r| r.kind)
    }

    /// Rows occupied by the subtree at `pre`.
    pub fn size(&self, pre: Pre) -> usize {
        self.table.size(pre)
    }

    pub fn parent(&self, pre: Pre) -> Option<Pre> {
        self.table.parent(pre)
    }

    pub fn children(&self, pre: Pre) -> Vec<Pre> {
        self.table.children(pre)
    }

    /// Read the subtree at `pre` into an owned snapshot.
    pub fn read_subtree(&self, pre: Pre) -> Result<NodeSnapshot> {
        if pre >= self.table.len() {
            return Err(StoreError::NodeNotFound(pre));
        }
        let mut pos = pre;
        Ok(self.snapshot_from(&mut pos))
    }

    fn snapshot_from(&self, pos: &mut Pre) -> NodeSnapshot {
        let records = self.table.records();
        let record = &records[*pos];
        *pos += 1;

        let mut snapshot = NodeSnapshot {
            id: record.id,
            kind: record.kind,
            name: record.name.clone(),
            value: record.value.clone(),
            attributes: Vec::new(),
            children: Vec::new(),
        };

        while records.get(*pos).is_some_and(|next| next.level > record.level) {
            let child = self.snapshot_from(pos);
            if child.kind == NodeKind::Attribute {
                snapshot.attributes.push(child);
            } else {
                snapshot.children.push(child);
            }
        }
        snapshot
    }

    /// Move the indexed position of every node at or after `from` by `delta`.
    ///
    /// Runs once after each structural change and before the next target is
    /// resolved.
    pub(crate) fn shift(&mut self, from: Pre, delta: isize) {
        trace!(from, delta, "shifting node positions");
        self.index.shift(from, delta);
    }

    /// Insert content at `pre`, its top-level nodes at `level`.
    ///
    /// Returns the number of inserted rows.
    pub(crate) fn insert_fragments(
        &mut self,
        pre: Pre,
        level: u32,
        content: &[Fragment],
    ) -> Result<usize> {
        if pre == 0 || pre > self.table.len() || level == 0 {
            return Err(StoreError::InvalidOperation(format!(
                "cannot insert at position {} (level {})",
                pre, level
            )));
        }

        let rows = self.build_rows(content, level);
        let count = rows.len();
        if count == 0 {
            return Ok(0);
        }

        let ids: Vec<NodeId> = rows.iter().map(|r| r.id).collect();
        self.table.insert(pre, rows);
        self.shift(pre, count as isize);
        for (offset, id) in ids.into_iter().enumerate() {
            self.index.insert(id, pre + offset);
        }
        Ok(count)
    }

    /// Delete the subtree at `pre`. Returns the number of removed rows.
    pub(crate) fn delete_subtree(&mut self, pre: Pre) -> Result<usize> {
        let record = self.table.get(pre).ok_or(StoreError::NodeNotFound(pre))?;
        if record.kind == NodeKind::Document {
            return Err(StoreError::InvalidOperation(
                "the document node cannot be deleted".into(),
            ));
        }

        let count = self.table.size(pre);
        let removed = self.table.remove(pre, count);
        for row in &removed {
            self.index.remove(row.id);
        }
        self.shift(pre + count, -(count as isize));
        Ok(count)
    }

    pub(crate) fn set_name(&mut self, pre: Pre, name: &str) -> Result<()> {
        let record = self.table.get_mut(pre).ok_or(StoreError::NodeNotFound(pre))?;
        if !record.kind.is_named() {
            return Err(StoreError::InvalidOperation(format!(
                "{} nodes have no name",
                record.kind
            )));
        }
        record.name = Some(name.to_string());
        Ok(())
    }

    pub(crate) fn set_value(&mut self, pre: Pre, value: &str) -> Result<()> {
        let record = self.table.get_mut(pre).ok_or(StoreError::NodeNotFound(pre))?;
        if record.kind.is_container() {
            return Err(StoreError::InvalidOperation(format!(
                "{} nodes have no value of their own",
                record.kind
            )));
        }
        record.value = Some(value.to_string());
        Ok(())
    }

    fn build_rows(&mut self, content: &[Fragment], level: u32) -> Vec<NodeRecord> {
        let mut rows = Vec::with_capacity(content.iter().map(Fragment::node_count).sum());
        for fragment in content {
            self.push_rows(fragment, level, &mut rows);
        }
        rows
    }

    fn push_rows(&mut self, fragment: &Fragment, level: u32, rows: &mut Vec<NodeRecord>) {
        let id = self.allocate_id();
        match fragment {
            Fragment::Element {
                name,
                attributes,
                children,
            } => {
                rows.push(NodeRecord {
                    id,
                    kind: NodeKind::Element,
                    level,
                    name: Some(name.clone()),
                    value: None,
                });

                // attributes precede children, even when passed as child fragments
                for (name, value) in attributes {
                    let id = self.allocate_id();
                    rows.push(attribute_row(id, level + 1, name, value));
                }
                for child in children.iter().filter(|c| c.kind() == NodeKind::Attribute) {
                    self.push_rows(child, level + 1, rows);
                }
                for child in children.iter().filter(|c| c.kind() != NodeKind::Attribute) {
                    self.push_rows(child, level + 1, rows);
                }
            }
            Fragment::Attribute { name, value } => rows.push(attribute_row(id, level, name, value)),
            Fragment::Text(text) => rows.push(leaf_row(id, NodeKind::Text, level, None, text)),
            Fragment::Comment(text) => rows.push(leaf_row(id, NodeKind::Comment, level, None, text)),
            Fragment::ProcessingInstruction { target, data } => rows.push(leaf_row(
                id,
                NodeKind::ProcessingInstruction,
                level,
                Some(target.as_str()),
                data,
            )),
        }
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }
}

fn attribute_row(id: NodeId, level: u32, name: &str, value: &str) -> NodeRecord {
    leaf_row(id, NodeKind::Attribute, level, Some(name), value)
}

fn leaf_row(id: NodeId, kind: NodeKind, level: u32, name: Option<&str>, value: &str) -> NodeRecord {
    NodeRecord {
        id,
        kind,
        level,
        name: name.map(str::to_string),
        value: Some(value.to_string()),
    }
}

/// Drop whitespace-only text nodes, recursively.
fn chop(fragment: Fragment) -> Option<Fragment> {
    match fragment {
        f if f.is_whitespace_text() => None,
        Fragment::Element {
            name,
            attributes,
            children,
        } => Some(Fragment::Element {
            name,
            attributes,
            children: children.into_iter().filter_map(chop).collect(),
        }),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(chop: bool) -> NodeStore {
        let meta = StoreMeta {
            name: "library".into(),
            chop,
        };
        NodeStore::from_document(
            meta,
            vec![Fragment::element("library")
                .with_child(Fragment::text("\n  "))
                .with_child(
                    Fragment::element("book")
                        .with_attr("id", "b1")
                        .with_child(Fragment::text("Dune")),
                )
                .with_child(Fragment::text("\n  "))
                .with_child(Fragment::element("book").with_attr("id", "b2"))],
        )
        .unwrap()
    }

    #[test]
    fn test_chop_strips_whitespace_text() {
        let chopped = library(true);
        let kept = library(false);

        // doc, library, book, @id, text, book, @id
        assert_eq!(chopped.len(), 7);
        assert_eq!(kept.len(), 9);
    }

    #[test]
    fn test_read_subtree() {
        let store = library(true);
        let snapshot = store.read_subtree(1).unwrap();

        assert_eq!(snapshot.name.as_deref(), Some("library"));
        assert_eq!(snapshot.children.len(), 2);
        assert_eq!(snapshot.children[0].attribute("id"), Some("b1"));
        assert_eq!(snapshot.children[0].string_value(), "Dune");
        assert!(matches!(
            store.read_subtree(99),
            Err(StoreError::NodeNotFound(99))
        ));
    }

    #[test]
    fn test_delete_shifts_following_positions() {
        let mut store = library(true);
        let second = store.id_at(5).unwrap();
        let first_book = store.id_at(2).unwrap();
        let first_size = store.size(2);

        let removed = store.delete_subtree(2).unwrap();
        assert_eq!(removed, first_size);
        assert_eq!(store.position_of(first_book), None);
        assert_eq!(store.position_of(second), Some(5 - first_size));
    }

    #[test]
    fn test_insert_shifts_following_positions() {
        let mut store = library(true);
        let second = store.id_at(5).unwrap();

        let inserted = store
            .insert_fragments(2, 2, &[Fragment::element("book").with_attr("id", "b0")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.position_of(second), Some(7));
        assert_eq!(store.read_subtree(2).unwrap().attribute("id"), Some("b0"));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = library(true);
        let before = store.next_id();
        store.delete_subtree(2).unwrap();
        store.insert_fragments(2, 2, &[Fragment::comment("c")]).unwrap();

        let new_id = store.id_at(2).unwrap();
        assert_eq!(new_id, before);
        assert!(store.next_id() > before);
    }

    #[test]
    fn test_attribute_children_are_hoisted() {
        let store = NodeStore::from_document(
            StoreMeta::default(),
            vec![Fragment::element("a")
                .with_child(Fragment::text("t"))
                .with_child(Fragment::attribute("x", "1"))],
        )
        .unwrap();

        assert_eq!(store.kind_at(2), Some(NodeKind::Attribute));
        assert_eq!(store.kind_at(3), Some(NodeKind::Text));
    }

    #[test]
    fn test_document_cannot_be_deleted() {
        let mut store = library(true);
        assert!(matches!(
            store.delete_subtree(0),
            Err(StoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_from_parts_rejects_duplicate_ids() {
        let store = library(true);
        let mut rows = store.table().records().to_vec();
        rows[2].id = rows[1].id;
        let result = NodeStore::from_parts(store.meta().clone(), rows, store.next_id().0);
        assert!(matches!(result, Err(StoreError::Corruption(_))));
    }
}
