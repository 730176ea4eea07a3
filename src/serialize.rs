//! XML serialization of node snapshots.

use crate::store::NodeSnapshot;
use crate::types::{NodeKind, StoreMeta};
use std::io::{self, Write};

/// Formatting options recognized when nodes are written out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Indent element-only content. `None` uses the store's `chop` flag.
    pub indent: Option<bool>,

    /// Spaces per indentation level.
    pub indent_width: usize,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            indent: None,
            indent_width: 2,
        }
    }
}

impl SerializerOptions {
    /// Options with an explicit indentation setting.
    pub fn with_indent(indent: bool) -> Self {
        Self {
            indent: Some(indent),
            ..Default::default()
        }
    }

    /// Effective indentation for nodes of a store.
    ///
    /// Chopped documents lost their original whitespace, so they are indented
    /// on output; unchopped documents are written back as they were.
    pub fn resolve_indent(&self, meta: &StoreMeta) -> bool {
        self.indent.unwrap_or(meta.chop)
    }
}

/// Writes snapshots as XML text.
#[derive(Clone, Debug)]
pub struct Serializer {
    indent: bool,
    indent_width: usize,
}

impl Serializer {
    pub fn new(indent: bool) -> Self {
        Self {
            indent,
            indent_width: SerializerOptions::default().indent_width,
        }
    }

    /// Serializer for nodes of the given store.
    pub fn for_store(options: &SerializerOptions, meta: &StoreMeta) -> Self {
        Self {
            indent: options.resolve_indent(meta),
            indent_width: options.indent_width,
        }
    }

    pub fn indent(&self) -> bool {
        self.indent
    }

    /// Render a snapshot to a string.
    pub fn serialize(&self, node: &NodeSnapshot) -> String {
        let mut out = String::new();
        self.write_node(&mut out, node, 0, self.indent);
        out
    }

    /// Render a snapshot into a writer.
    pub fn write_to<W: Write>(&self, node: &NodeSnapshot, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.serialize(node).as_bytes())?;
        writer.flush()
    }

    fn write_node(&self, out: &mut String, node: &NodeSnapshot, depth: usize, indent: bool) {
        match node.kind {
            NodeKind::Document => {
                let indent = indent && !has_text(node);
                for (i, child) in node.children.iter().enumerate() {
                    if indent && i > 0 {
                        out.push('\n');
                    }
                    self.write_node(out, child, 0, indent);
                }
            }
            NodeKind::Element => {
                let name = node.name.as_deref().unwrap_or_default();
                out.push('<');
                out.push_str(name);
                for attribute in &node.attributes {
                    out.push(' ');
                    write_attribute(out, attribute);
                }

                if node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');

                // mixed content keeps its whitespace as is
                let pretty = indent && !has_text(node);
                for child in &node.children {
                    if pretty {
                        self.newline(out, depth + 1);
                    }
                    self.write_node(out, child, depth + 1, pretty);
                }
                if pretty {
                    self.newline(out, depth);
                }

                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Attribute => write_attribute(out, node),
            NodeKind::Text => escape_text(out, node.value.as_deref().unwrap_or_default()),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(node.value.as_deref().unwrap_or_default());
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction => {
                out.push_str("<?");
                out.push_str(node.name.as_deref().unwrap_or_default());
                match node.value.as_deref() {
                    Some(data) if !data.is_empty() => {
                        out.push(' ');
                        out.push_str(data);
                    }
                    _ => {}
                }
                out.push_str("?>");
            }
        }
    }

    fn newline(&self, out: &mut String, depth: usize) {
        out.push('\n');
        out.extend(std::iter::repeat(' ').take(depth * self.indent_width));
    }
}

/// Render a snapshot with default indentation width.
pub fn to_string(node: &NodeSnapshot, indent: bool) -> String {
    Serializer::new(indent).serialize(node)
}

fn has_text(node: &NodeSnapshot) -> bool {
    node.children.iter().any(|c| c.kind == NodeKind::Text)
}

fn write_attribute(out: &mut String, attribute: &NodeSnapshot) {
    out.push_str(attribute.name.as_deref().unwrap_or_default());
    out.push_str("=\"");
    escape_attribute(out, attribute.value.as_deref().unwrap_or_default());
    out.push('"');
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push_str("&#x9;"),
            _ => out.push(c),
        }
    }
}
