//! Pre-ordered node table.
//!
//! Rows are stored in document order. The subtree of a node is the run of
//! rows directly after it with a greater level; attributes come first in that
//! run, one level below their element.

use crate::types::{NodeKind, NodeRecord, Pre};
use std::ops::Range;

/// Dense, position-addressed node table.
#[derive(Clone, Debug, Default)]
pub struct NodeTable {
    records: Vec<NodeRecord>,
}

impl NodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap rows that are already in document order.
    pub fn from_records(records: Vec<NodeRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pre: Pre) -> Option<&NodeRecord> {
        self.records.get(pre)
    }

    pub(crate) fn get_mut(&mut self, pre: Pre) -> Option<&mut NodeRecord> {
        self.records.get_mut(pre)
    }

    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    /// Number of rows of the subtree rooted at `pre`, the node itself included.
    /// Returns 0 for positions outside the table.
    pub fn size(&self, pre: Pre) -> usize {
        let Some(root) = self.records.get(pre) else {
            return 0;
        };
        let level = root.level;
        1 + self.records[pre + 1..]
            .iter()
            .take_while(|r| r.level > level)
            .count()
    }

    /// Number of attributes of the element at `pre`.
    pub fn attribute_count(&self, pre: Pre) -> usize {
        match self.records.get(pre) {
            Some(root) if root.kind == NodeKind::Element => self.records[pre + 1..]
                .iter()
                .take_while(|r| r.kind == NodeKind::Attribute && r.level == root.level + 1)
                .count(),
            _ => 0,
        }
    }

    /// Positions of the attributes of the element at `pre`.
    pub fn attributes(&self, pre: Pre) -> Range<Pre> {
        let start = pre + 1;
        start..start + self.attribute_count(pre)
    }

    /// Position of the parent node.
    pub fn parent(&self, pre: Pre) -> Option<Pre> {
        let level = self.records.get(pre)?.level;
        if level == 0 {
            return None;
        }
        (0..pre).rev().find(|&p| self.records[p].level < level)
    }

    /// Positions of the child nodes (attributes excluded).
    pub fn children(&self, pre: Pre) -> Vec<Pre> {
        let end = pre + self.size(pre);
        let mut pos = self.attributes(pre).end;
        let mut children = Vec::new();
        while pos < end {
            children.push(pos);
            pos += self.size(pos);
        }
        children
    }

    /// Insert rows at `pre`; rows at and after `pre` move back.
    pub(crate) fn insert(&mut self, pre: Pre, rows: Vec<NodeRecord>) {
        self.records.splice(pre..pre, rows);
    }

    /// Remove `count` rows starting at `pre`.
    pub(crate) fn remove(&mut self, pre: Pre, count: usize) -> Vec<NodeRecord> {
        self.records.drain(pre..pre + count).collect()
    }
}
