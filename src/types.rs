//! Core types for the node store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable node identifier. Assigned once at creation and never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a node in the table (pre-order rank). Shifts under structural updates.
pub type Pre = usize;

/// Kind of a stored node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    /// Whether nodes of this kind carry a name.
    pub fn is_named(self) -> bool {
        matches!(
            self,
            NodeKind::Element | NodeKind::Attribute | NodeKind::ProcessingInstruction
        )
    }

    /// Whether nodes of this kind may have children.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Document => "document",
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
        };
        f.write_str(name)
    }
}

/// A single row of the node table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable identifier.
    pub id: NodeId,

    /// Node kind.
    pub kind: NodeKind,

    /// Depth in the tree (document node is 0). Attributes sit one level below
    /// their element, directly after it.
    pub level: u32,

    /// Element/attribute name or processing-instruction target.
    pub name: Option<String>,

    /// Text, attribute, comment or processing-instruction content.
    pub value: Option<String>,
}

/// Source location of the expression that requested an update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Module or file name, if known.
    pub module: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl SourceInfo {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            module: None,
            line,
            column,
        }
    }

    pub fn in_module(module: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            module: Some(module.into()),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}:{}:{}", module, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// New content that is not yet part of the table (inserted or loaded nodes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<Fragment>,
    },
    Attribute {
        name: String,
        value: String,
    },
    Text(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl Fragment {
    /// Create an empty element.
    pub fn element(name: impl Into<String>) -> Self {
        Fragment::Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Fragment::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Fragment::Text(text.into())
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Fragment::Comment(text.into())
    }

    pub fn pi(target: impl Into<String>, data: impl Into<String>) -> Self {
        Fragment::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
        }
    }

    /// Add an attribute (elements only; ignored otherwise).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Fragment::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    /// Add a child (elements only; ignored otherwise).
    pub fn with_child(mut self, child: Fragment) -> Self {
        if let Fragment::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Kind of the node this fragment turns into.
    pub fn kind(&self) -> NodeKind {
        match self {
            Fragment::Element { .. } => NodeKind::Element,
            Fragment::Attribute { .. } => NodeKind::Attribute,
            Fragment::Text(_) => NodeKind::Text,
            Fragment::Comment(_) => NodeKind::Comment,
            Fragment::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
        }
    }

    /// Number of table rows the fragment occupies.
    pub fn node_count(&self) -> usize {
        match self {
            Fragment::Element {
                attributes,
                children,
                ..
            } => 1 + attributes.len() + children.iter().map(Fragment::node_count).sum::<usize>(),
            _ => 1,
        }
    }

    pub(crate) fn is_whitespace_text(&self) -> bool {
        matches!(self, Fragment::Text(text) if text.trim().is_empty())
    }
}

/// Per-store metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Database name.
    pub name: String,

    /// Whitespace-only text was stripped when the document was loaded.
    /// Decides the default indentation when nodes are serialized again.
    pub chop: bool,
}

impl Default for StoreMeta {
    fn default() -> Self {
        Self {
            name: "db".to_string(),
            chop: true,
        }
    }
}

/// Content hash (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(ContentHash(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
