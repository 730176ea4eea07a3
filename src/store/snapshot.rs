//! Immutable subtree views.

use crate::error::Result;
use crate::types::{ContentHash, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

/// Owned copy of a subtree, detached from the table.
///
/// A snapshot reflects the table at the moment it was read; later updates do
/// not affect it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: Option<String>,
    pub value: Option<String>,
    pub attributes: Vec<NodeSnapshot>,
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Number of nodes in the snapshot, attributes included.
    pub fn node_count(&self) -> usize {
        1 + self.attributes.len()
            + self
                .children
                .iter()
                .map(NodeSnapshot::node_count)
                .sum::<usize>()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn string_value(&self) -> String {
        match self.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(&mut out);
                out
            }
            _ => self.value.clone().unwrap_or_default(),
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child.kind {
                NodeKind::Text => out.push_str(child.value.as_deref().unwrap_or_default()),
                NodeKind::Element => child.collect_text(out),
                _ => {}
            }
        }
    }

    /// Look up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .and_then(|a| a.value.as_deref())
    }

    /// SHA-256 over the MessagePack encoding of the snapshot.
    pub fn digest(&self) -> Result<ContentHash> {
        let bytes = rmp_serde::to_vec(self)?;
        Ok(ContentHash::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: u64, kind: NodeKind, name: Option<&str>, value: Option<&str>) -> NodeSnapshot {
        NodeSnapshot {
            id: NodeId(id),
            kind,
            name: name.map(str::to_string),
            value: value.map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_string_value_and_attribute() {
        let mut item = leaf(1, NodeKind::Element, Some("item"), None);
        item.attributes
            .push(leaf(2, NodeKind::Attribute, Some("id"), Some("i1")));
        item.children.push(leaf(3, NodeKind::Text, None, Some("a")));
        item.children.push(leaf(4, NodeKind::Comment, None, Some("skip")));
        item.children.push(leaf(5, NodeKind::Text, None, Some("b")));

        assert_eq!(item.string_value(), "ab");
        assert_eq!(item.attribute("id"), Some("i1"));
        assert_eq!(item.attribute("missing"), None);
        assert_eq!(item.node_count(), 5);
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = leaf(1, NodeKind::Text, None, Some("x"));
        let mut b = a.clone();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        b.value = Some("y".to_string());
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }
}
