//! Stable identifier to position index.

use crate::types::{NodeId, NodeRecord, Pre};
use std::collections::HashMap;

/// Maps node identifiers to their current table position.
///
/// Positions are derived data: every structural change must be followed by a
/// [`shift`](IdIndex::shift) so lookups stay consistent with the table.
#[derive(Clone, Debug, Default)]
pub struct IdIndex {
    positions: HashMap<NodeId, Pre>,
}

impl IdIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from table rows.
    pub fn rebuild(records: &[NodeRecord]) -> Self {
        let positions = records
            .iter()
            .enumerate()
            .map(|(pre, record)| (record.id, pre))
            .collect();
        Self { positions }
    }

    /// Current position of a node.
    pub fn get(&self, id: NodeId) -> Option<Pre> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn insert(&mut self, id: NodeId, pre: Pre) {
        self.positions.insert(id, pre);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Pre> {
        self.positions.remove(&id)
    }

    /// Move every position at or after `from` by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if `from + delta` is negative: the shifted range would start
    /// before the first position.
    pub fn shift(&mut self, from: Pre, delta: isize) {
        assert!(
            from.checked_add_signed(delta).is_some(),
            "cannot shift positions from {} by {}",
            from,
            delta
        );
        if delta == 0 {
            return;
        }
        for pre in self.positions.values_mut() {
            if *pre >= from {
                // at least `from + delta`
                *pre = pre.wrapping_add_signed(delta);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
