//! Update primitives.

use super::put::Put;
use crate::error::{Result, StoreError};
use crate::serialize::SerializerOptions;
use crate::store::NodeStore;
use crate::types::{Fragment, NodeId, NodeKind, Pre, SourceInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Kind of a requested update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateKind {
    InsertAttribute,
    InsertIntoFirst,
    InsertInto,
    InsertBefore,
    InsertAfter,
    Rename,
    ReplaceValue,
    ReplaceAttribute,
    ReplaceElement,
    Delete,
    Put,
}

impl UpdateKind {
    pub fn name(self) -> &'static str {
        match self {
            UpdateKind::InsertAttribute => "insert attribute",
            UpdateKind::InsertIntoFirst => "insert into as first",
            UpdateKind::InsertInto => "insert into",
            UpdateKind::InsertBefore => "insert before",
            UpdateKind::InsertAfter => "insert after",
            UpdateKind::Rename => "rename",
            UpdateKind::ReplaceValue => "replace value",
            UpdateKind::ReplaceAttribute => "replace attribute",
            UpdateKind::ReplaceElement => "replace element",
            UpdateKind::Delete => "delete",
            UpdateKind::Put => "put",
        }
    }

    /// Whether the update changes the node table.
    pub fn is_structural(self) -> bool {
        self != UpdateKind::Put
    }

    /// Whether two updates of this kind on one node combine their payloads.
    pub fn is_constructive(self) -> bool {
        matches!(
            self,
            UpdateKind::InsertAttribute
                | UpdateKind::InsertIntoFirst
                | UpdateKind::InsertInto
                | UpdateKind::InsertBefore
                | UpdateKind::InsertAfter
                | UpdateKind::Put
        )
    }

    /// Whether the update takes its target node out of the table.
    pub fn removes_target(self) -> bool {
        matches!(
            self,
            UpdateKind::Delete | UpdateKind::ReplaceElement | UpdateKind::ReplaceAttribute
        )
    }

    /// Whether updates of the two kinds may not share a target.
    ///
    /// Updates of the same kind are reconciled by merging instead.
    pub fn conflicts_with(self, other: UpdateKind) -> bool {
        if self == other || self == UpdateKind::Put || other == UpdateKind::Put {
            return false;
        }
        if self.removes_target() || other.removes_target() {
            return true;
        }
        matches!(
            (self, other),
            (
                UpdateKind::ReplaceValue,
                UpdateKind::InsertInto | UpdateKind::InsertIntoFirst
            ) | (
                UpdateKind::InsertInto | UpdateKind::InsertIntoFirst,
                UpdateKind::ReplaceValue
            )
        )
    }

    /// Application phase: 0 = inserts and renames, 1 = content removal,
    /// 2 = external writes.
    pub fn phase(self) -> u8 {
        match self {
            UpdateKind::Put => 2,
            UpdateKind::ReplaceValue | UpdateKind::ReplaceAttribute | UpdateKind::ReplaceElement
            | UpdateKind::Delete => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind-specific payload of an update.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOp {
    InsertBefore(Vec<Fragment>),
    InsertAfter(Vec<Fragment>),
    /// Insert as last children.
    InsertInto(Vec<Fragment>),
    /// Insert as first children, after the attributes.
    InsertIntoFirst(Vec<Fragment>),
    InsertAttribute(Vec<Fragment>),
    Delete,
    Rename(String),
    ReplaceValue(String),
    ReplaceElement(Vec<Fragment>),
    ReplaceAttribute(Vec<Fragment>),
    Put(Put),
}

/// Outcome of applying a single primitive.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The table changed at `pre`; `delta` rows were added (or removed, if negative).
    Changed { pre: Pre, delta: isize },
    /// External write whose target no longer exists.
    Skipped,
    /// External write; `failures` lists the paths that could not be written.
    Written {
        written: usize,
        failures: Vec<StoreError>,
    },
}

/// One requested update, addressed by node identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdatePrimitive {
    target: NodeId,
    info: SourceInfo,
    op: UpdateOp,
}

impl UpdatePrimitive {
    pub fn new(target: NodeId, op: UpdateOp, info: SourceInfo) -> Self {
        Self { target, info, op }
    }

    pub fn insert_before(target: NodeId, content: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::InsertBefore(content), info)
    }

    pub fn insert_after(target: NodeId, content: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::InsertAfter(content), info)
    }

    pub fn insert_into(target: NodeId, content: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::InsertInto(content), info)
    }

    pub fn insert_into_first(target: NodeId, content: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::InsertIntoFirst(content), info)
    }

    pub fn insert_attributes(target: NodeId, attributes: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::InsertAttribute(attributes), info)
    }

    pub fn delete(target: NodeId, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::Delete, info)
    }

    pub fn rename(target: NodeId, name: impl Into<String>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::Rename(name.into()), info)
    }

    pub fn replace_value(target: NodeId, value: impl Into<String>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::ReplaceValue(value.into()), info)
    }

    pub fn replace_element(target: NodeId, content: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::ReplaceElement(content), info)
    }

    pub fn replace_attribute(target: NodeId, attributes: Vec<Fragment>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::ReplaceAttribute(attributes), info)
    }

    /// Write the target node to `path` once the snapshot has been applied.
    pub fn put(target: NodeId, path: impl Into<PathBuf>, info: SourceInfo) -> Self {
        Self::new(target, UpdateOp::Put(Put::new(path)), info)
    }

    pub fn put_with_options(
        target: NodeId,
        path: impl Into<PathBuf>,
        options: SerializerOptions,
        info: SourceInfo,
    ) -> Self {
        Self::new(target, UpdateOp::Put(Put::with_options(path, options)), info)
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn op(&self) -> &UpdateOp {
        &self.op
    }

    pub fn kind(&self) -> UpdateKind {
        match &self.op {
            UpdateOp::InsertBefore(_) => UpdateKind::InsertBefore,
            UpdateOp::InsertAfter(_) => UpdateKind::InsertAfter,
            UpdateOp::InsertInto(_) => UpdateKind::InsertInto,
            UpdateOp::InsertIntoFirst(_) => UpdateKind::InsertIntoFirst,
            UpdateOp::InsertAttribute(_) => UpdateKind::InsertAttribute,
            UpdateOp::Delete => UpdateKind::Delete,
            UpdateOp::Rename(_) => UpdateKind::Rename,
            UpdateOp::ReplaceValue(_) => UpdateKind::ReplaceValue,
            UpdateOp::ReplaceElement(_) => UpdateKind::ReplaceElement,
            UpdateOp::ReplaceAttribute(_) => UpdateKind::ReplaceAttribute,
            UpdateOp::Put(_) => UpdateKind::Put,
        }
    }

    /// Effective cardinality: destination paths of a put, fragments of an
    /// insert, 1 otherwise.
    pub fn size(&self) -> usize {
        match &self.op {
            UpdateOp::Put(put) => put.size(),
            UpdateOp::InsertBefore(content)
            | UpdateOp::InsertAfter(content)
            | UpdateOp::InsertInto(content)
            | UpdateOp::InsertIntoFirst(content)
            | UpdateOp::InsertAttribute(content) => content.len(),
            _ => 1,
        }
    }

    /// Merge another primitive with the same target and kind into this one.
    ///
    /// Puts union their paths and inserts concatenate their content. Any
    /// other kind only absorbs an identical duplicate; differing payloads are
    /// a [`StoreError::MergeConflict`].
    pub fn merge(&mut self, other: UpdatePrimitive) -> Result<()> {
        let kind = self.kind();
        if self.target != other.target || kind != other.kind() {
            return Err(StoreError::InvalidOperation(format!(
                "cannot merge {} on {} with {} on {}",
                kind,
                self.target,
                other.kind(),
                other.target
            )));
        }

        match (&mut self.op, other.op) {
            (UpdateOp::Put(put), UpdateOp::Put(more)) => {
                put.merge(more);
                Ok(())
            }
            (UpdateOp::InsertBefore(content), UpdateOp::InsertBefore(more))
            | (UpdateOp::InsertAfter(content), UpdateOp::InsertAfter(more))
            | (UpdateOp::InsertInto(content), UpdateOp::InsertInto(more))
            | (UpdateOp::InsertIntoFirst(content), UpdateOp::InsertIntoFirst(more))
            | (UpdateOp::InsertAttribute(content), UpdateOp::InsertAttribute(more)) => {
                content.extend(more);
                Ok(())
            }
            (op, more) if *op == more => Ok(()),
            _ => Err(StoreError::merge_conflict(
                self.target,
                (kind, &self.info),
                (kind, &other.info),
            )),
        }
    }

    /// Apply the primitive to the store, consuming it.
    ///
    /// The target is resolved to its current position here, never earlier.
    /// Structural kinds fail with [`StoreError::TargetGone`] if it no longer
    /// resolves; a put silently does nothing.
    pub fn apply(self, store: &mut NodeStore) -> Result<ApplyOutcome> {
        self.apply_with(store, true)
    }

    /// Apply as part of a batch whose final attribute names have already
    /// been checked, so intermediate duplicates on an owner are allowed.
    pub(crate) fn apply_in_batch(self, store: &mut NodeStore) -> Result<ApplyOutcome> {
        self.apply_with(store, false)
    }

    fn apply_with(self, store: &mut NodeStore, check_owner: bool) -> Result<ApplyOutcome> {
        let kind = self.kind();
        match self.op {
            UpdateOp::Put(put) => put.apply(self.target, store),
            op => apply_structural(self.target, kind, op, store, check_owner),
        }
    }
}

impl fmt::Display for UpdatePrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            UpdateOp::Put(put) => write!(f, "{}[{}, {:?}]", self.kind(), self.target, put.paths()),
            _ => write!(f, "{}[{}]", self.kind(), self.target),
        }
    }
}

fn apply_structural(
    target: NodeId,
    kind: UpdateKind,
    op: UpdateOp,
    store: &mut NodeStore,
    check_owner: bool,
) -> Result<ApplyOutcome> {
    let pre = store
        .position_of(target)
        .ok_or(StoreError::TargetGone { target, kind })?;
    let (node_kind, level) = store
        .record(pre)
        .map(|r| (r.kind, r.level))
        .ok_or(StoreError::NodeNotFound(pre))?;

    let fail = move |reason: String| StoreError::apply_failure(target, kind, reason);
    let failed = move |e: StoreError| fail(e.to_string());

    let delta = match op {
        UpdateOp::InsertInto(content) => {
            if !node_kind.is_container() {
                return Err(fail(format!("cannot insert into a {} node", node_kind)));
            }
            check_children(&content).map_err(fail)?;
            let at = pre + store.size(pre);
            insert(store, at, level + 1, &content).map_err(failed)?
        }
        UpdateOp::InsertIntoFirst(content) => {
            if !node_kind.is_container() {
                return Err(fail(format!("cannot insert into a {} node", node_kind)));
            }
            check_children(&content).map_err(fail)?;
            let at = store.table().attributes(pre).end;
            insert(store, at, level + 1, &content).map_err(failed)?
        }
        UpdateOp::InsertBefore(content) => {
            check_sibling_target(node_kind).map_err(fail)?;
            check_children(&content).map_err(fail)?;
            insert(store, pre, level, &content).map_err(failed)?
        }
        UpdateOp::InsertAfter(content) => {
            check_sibling_target(node_kind).map_err(fail)?;
            check_children(&content).map_err(fail)?;
            let at = pre + store.size(pre);
            insert(store, at, level, &content).map_err(failed)?
        }
        UpdateOp::InsertAttribute(content) => {
            if node_kind != NodeKind::Element {
                return Err(fail(format!("cannot add attributes to a {} node", node_kind)));
            }
            check_attributes(&content).map_err(fail)?;
            if check_owner {
                check_unique(&attribute_names(store, pre, None), &content).map_err(fail)?;
            }
            let at = store.table().attributes(pre).end;
            insert(store, at, level + 1, &content).map_err(failed)?
        }
        UpdateOp::Delete => -(store.delete_subtree(pre).map_err(failed)? as isize),
        UpdateOp::Rename(name) => {
            if !node_kind.is_named() {
                return Err(fail(format!("cannot rename a {} node", node_kind)));
            }
            if !is_valid_name(&name) {
                return Err(fail(format!("invalid name {:?}", name)));
            }
            if check_owner && node_kind == NodeKind::Attribute {
                if let Some(owner) = store.parent(pre) {
                    if attribute_names(store, owner, Some(pre)).contains(&name) {
                        return Err(fail(format!("duplicate attribute {}", name)));
                    }
                }
            }
            store.set_name(pre, &name).map_err(failed)?;
            0
        }
        UpdateOp::ReplaceValue(value) => match node_kind {
            NodeKind::Document => {
                return Err(fail("cannot replace the value of the document node".into()))
            }
            NodeKind::Element => {
                let start = store.table().attributes(pre).end;
                let mut removed = 0;
                for _ in 0..store.children(pre).len() {
                    removed += store.delete_subtree(start).map_err(failed)?;
                }
                let inserted = if value.is_empty() {
                    0
                } else {
                    insert(store, start, level + 1, &[Fragment::text(value)]).map_err(failed)?
                };
                inserted - removed as isize
            }
            _ => {
                store.set_value(pre, &value).map_err(failed)?;
                0
            }
        },
        UpdateOp::ReplaceElement(content) => {
            check_sibling_target(node_kind).map_err(fail)?;
            check_children(&content).map_err(fail)?;
            let removed = store.delete_subtree(pre).map_err(failed)?;
            insert(store, pre, level, &content).map_err(failed)? - removed as isize
        }
        UpdateOp::ReplaceAttribute(content) => {
            if node_kind != NodeKind::Attribute {
                return Err(fail(format!("{} node is not an attribute", node_kind)));
            }
            check_attributes(&content).map_err(fail)?;
            let owner = store
                .parent(pre)
                .ok_or_else(|| fail("attribute has no owner element".into()))?;
            if check_owner {
                check_unique(&attribute_names(store, owner, Some(pre)), &content).map_err(fail)?;
            }
            let removed = store.delete_subtree(pre).map_err(failed)?;
            insert(store, pre, level, &content).map_err(failed)? - removed as isize
        }
        UpdateOp::Put(_) => {
            return Err(StoreError::InvalidOperation(
                "external writes do not change the table".into(),
            ))
        }
    };

    debug!(%target, %kind, pre, delta, "applied update");
    Ok(ApplyOutcome::Changed { pre, delta })
}

fn insert(store: &mut NodeStore, at: Pre, level: u32, content: &[Fragment]) -> Result<isize> {
    store
        .insert_fragments(at, level, content)
        .map(|count| count as isize)
}

fn check_sibling_target(node_kind: NodeKind) -> std::result::Result<(), String> {
    match node_kind {
        NodeKind::Document | NodeKind::Attribute => {
            Err(format!("a {} node has no siblings", node_kind))
        }
        _ => Ok(()),
    }
}

fn check_children(content: &[Fragment]) -> std::result::Result<(), String> {
    if content.iter().any(|f| f.kind() == NodeKind::Attribute) {
        return Err("attributes cannot be inserted as child nodes".into());
    }
    content.iter().try_for_each(check_fragment)
}

/// Names and attribute uniqueness of a fragment and everything below it.
fn check_fragment(fragment: &Fragment) -> std::result::Result<(), String> {
    match fragment {
        Fragment::Element {
            name,
            attributes,
            children,
        } => {
            check_name(name)?;
            let attribute_children = children.iter().filter_map(|child| match child {
                Fragment::Attribute { name, .. } => Some(name.as_str()),
                _ => None,
            });
            let mut seen = Vec::new();
            for name in attributes.iter().map(|(name, _)| name.as_str()).chain(attribute_children) {
                check_name(name)?;
                if seen.contains(&name) {
                    return Err(format!("duplicate attribute {}", name));
                }
                seen.push(name);
            }
            children
                .iter()
                .filter(|child| child.kind() != NodeKind::Attribute)
                .try_for_each(check_fragment)
        }
        Fragment::ProcessingInstruction { target, .. } => check_name(target),
        _ => Ok(()),
    }
}

fn check_name(name: &str) -> std::result::Result<(), String> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(format!("invalid name {:?}", name))
    }
}

fn check_attributes(content: &[Fragment]) -> std::result::Result<(), String> {
    let mut seen = Vec::with_capacity(content.len());
    for fragment in content {
        match fragment {
            Fragment::Attribute { name, .. } if is_valid_name(name) => {
                if seen.contains(&name) {
                    return Err(format!("duplicate attribute {}", name));
                }
                seen.push(name);
            }
            Fragment::Attribute { name, .. } => return Err(format!("invalid name {:?}", name)),
            other => return Err(format!("expected attributes, got a {} node", other.kind())),
        }
    }
    Ok(())
}

fn check_unique(existing: &[String], content: &[Fragment]) -> std::result::Result<(), String> {
    for fragment in content {
        if let Fragment::Attribute { name, .. } = fragment {
            if existing.contains(name) {
                return Err(format!("duplicate attribute {}", name));
            }
        }
    }
    Ok(())
}

/// Names of the attributes of `owner`, leaving out the one at `skip`.
fn attribute_names(store: &NodeStore, owner: Pre, skip: Option<Pre>) -> Vec<String> {
    store
        .table()
        .attributes(owner)
        .filter(|&pre| Some(pre) != skip)
        .filter_map(|pre| store.record(pre).and_then(|r| r.name.clone()))
        .collect()
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreMeta;

    fn info(line: u32) -> SourceInfo {
        SourceInfo::new(line, 1)
    }

    /// doc / <list a="1"> <item>one</item> <item>two</item> </list>
    fn store() -> NodeStore {
        NodeStore::from_document(
            StoreMeta::default(),
            vec![Fragment::element("list")
                .with_attr("a", "1")
                .with_child(Fragment::element("item").with_child(Fragment::text("one")))
                .with_child(Fragment::element("item").with_child(Fragment::text("two")))],
        )
        .unwrap()
    }

    fn id(store: &NodeStore, pre: Pre) -> NodeId {
        store.id_at(pre).unwrap()
    }

    #[test]
    fn test_conflict_matrix() {
        use UpdateKind::*;
        assert!(Delete.conflicts_with(Rename));
        assert!(Rename.conflicts_with(ReplaceElement));
        assert!(ReplaceValue.conflicts_with(InsertInto));
        assert!(!Rename.conflicts_with(InsertInto));
        assert!(!Put.conflicts_with(Delete));
        assert!(!Delete.conflicts_with(Delete));
    }

    #[test]
    fn test_insert_into_appends_last_child() {
        let mut store = store();
        let list = id(&store, 1);
        let outcome = UpdatePrimitive::insert_into(list, vec![Fragment::element("item")], info(1))
            .apply(&mut store)
            .unwrap();

        assert!(matches!(outcome, ApplyOutcome::Changed { pre: 1, delta: 1 }));
        let snapshot = store.read_subtree(1).unwrap();
        assert_eq!(snapshot.children.len(), 3);
        assert!(snapshot.children[2].children.is_empty());
    }

    #[test]
    fn test_insert_into_first_goes_after_attributes() {
        let mut store = store();
        let list = id(&store, 1);
        UpdatePrimitive::insert_into_first(list, vec![Fragment::comment("head")], info(1))
            .apply(&mut store)
            .unwrap();

        assert_eq!(store.kind_at(2), Some(NodeKind::Attribute));
        assert_eq!(store.kind_at(3), Some(NodeKind::Comment));
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut store = store();
        let first = id(&store, 3);
        let second = id(&store, 5);

        UpdatePrimitive::insert_before(first, vec![Fragment::text("<")], info(1))
            .apply(&mut store)
            .unwrap();
        UpdatePrimitive::insert_after(second, vec![Fragment::text(">")], info(2))
            .apply(&mut store)
            .unwrap();

        assert_eq!(store.read_subtree(1).unwrap().string_value(), "<onetwo>");
    }

    #[test]
    fn test_delete_reports_negative_delta() {
        let mut store = store();
        let first = id(&store, 3);
        let outcome = UpdatePrimitive::delete(first, info(1)).apply(&mut store).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Changed { pre: 3, delta: -2 }));
        assert_eq!(store.position_of(first), None);
    }

    #[test]
    fn test_rename_and_replace_value() {
        let mut store = store();
        let list = id(&store, 1);
        let attr = id(&store, 2);
        let text = id(&store, 4);

        UpdatePrimitive::rename(list, "entries", info(1)).apply(&mut store).unwrap();
        UpdatePrimitive::replace_value(attr, "2", info(2)).apply(&mut store).unwrap();
        UpdatePrimitive::replace_value(text, "uno", info(3)).apply(&mut store).unwrap();

        let snapshot = store.read_subtree(1).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("entries"));
        assert_eq!(snapshot.attribute("a"), Some("2"));
        assert_eq!(snapshot.string_value(), "unotwo");
    }

    #[test]
    fn test_replace_value_of_element_replaces_children() {
        let mut store = store();
        let list = id(&store, 1);
        let before = store.len();

        let outcome = UpdatePrimitive::replace_value(list, "flat", info(1))
            .apply(&mut store)
            .unwrap();

        // two items of two rows each became one text row
        assert!(matches!(outcome, ApplyOutcome::Changed { delta: -3, .. }));
        assert_eq!(store.len(), before - 3);
        let snapshot = store.read_subtree(1).unwrap();
        assert_eq!(snapshot.attribute("a"), Some("1"));
        assert_eq!(snapshot.string_value(), "flat");
    }

    #[test]
    fn test_replace_element_and_attribute() {
        let mut store = store();
        let first = id(&store, 3);
        let attr = id(&store, 2);

        UpdatePrimitive::replace_element(first, vec![Fragment::comment("gone")], info(1))
            .apply(&mut store)
            .unwrap();
        UpdatePrimitive::replace_attribute(
            attr,
            vec![Fragment::attribute("b", "x"), Fragment::attribute("c", "y")],
            info(2),
        )
        .apply(&mut store)
        .unwrap();

        let snapshot = store.read_subtree(1).unwrap();
        assert_eq!(snapshot.attribute("a"), None);
        assert_eq!(snapshot.attribute("b"), Some("x"));
        assert_eq!(snapshot.attribute("c"), Some("y"));
        assert_eq!(snapshot.children[0].kind, NodeKind::Comment);
        assert_eq!(store.position_of(first), None);
    }

    #[test]
    fn test_invalid_targets_fail() {
        let mut store = store();
        let text = id(&store, 4);
        let attr = id(&store, 2);
        let list = id(&store, 1);

        let result = UpdatePrimitive::insert_into(text, vec![Fragment::text("x")], info(1))
            .apply(&mut store);
        assert!(matches!(
            result,
            Err(StoreError::ApplyFailure { kind: UpdateKind::InsertInto, .. })
        ));

        let result = UpdatePrimitive::insert_before(attr, vec![Fragment::text("x")], info(2))
            .apply(&mut store);
        assert!(matches!(result, Err(StoreError::ApplyFailure { .. })));

        let result = UpdatePrimitive::insert_attributes(
            list,
            vec![Fragment::attribute("a", "dup")],
            info(3),
        )
        .apply(&mut store);
        assert!(matches!(result, Err(StoreError::ApplyFailure { .. })));

        let result = UpdatePrimitive::rename(list, "1bad", info(4)).apply(&mut store);
        assert!(matches!(result, Err(StoreError::ApplyFailure { .. })));
    }

    #[test]
    fn test_inserted_fragments_are_validated() {
        let mut store = store();
        let list = id(&store, 1);
        let before = store.len();

        let bad_name = Fragment::element("item").with_child(Fragment::element("1 bad"));
        let result = UpdatePrimitive::insert_into(list, vec![bad_name], info(1)).apply(&mut store);
        match result {
            Err(StoreError::ApplyFailure { reason, .. }) => assert_eq!(reason, "invalid name \"1 bad\""),
            other => panic!("expected failure, got {:?}", other),
        }

        let repeated = Fragment::element("item")
            .with_attr("k", "1")
            .with_child(Fragment::attribute("k", "2"));
        let result = UpdatePrimitive::replace_element(id(&store, 3), vec![repeated], info(2))
            .apply(&mut store);
        match result {
            Err(StoreError::ApplyFailure { reason, .. }) => assert_eq!(reason, "duplicate attribute k"),
            other => panic!("expected failure, got {:?}", other),
        }

        let result = UpdatePrimitive::insert_after(id(&store, 3), vec![Fragment::pi("9", "x")], info(3))
            .apply(&mut store);
        assert!(matches!(result, Err(StoreError::ApplyFailure { .. })));
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_vanished_structural_target_is_an_error() {
        let mut store = store();
        let first = id(&store, 3);
        UpdatePrimitive::delete(first, info(1)).apply(&mut store).unwrap();

        let result = UpdatePrimitive::rename(first, "x", info(2)).apply(&mut store);
        assert!(matches!(
            result,
            Err(StoreError::TargetGone { kind: UpdateKind::Rename, .. })
        ));
    }

    #[test]
    fn test_merge_rules() {
        let target = NodeId(3);

        let mut insert = UpdatePrimitive::insert_into(target, vec![Fragment::text("a")], info(1));
        insert
            .merge(UpdatePrimitive::insert_into(target, vec![Fragment::text("b")], info(2)))
            .unwrap();
        assert_eq!(insert.size(), 2);

        let mut delete = UpdatePrimitive::delete(target, info(1));
        delete.merge(UpdatePrimitive::delete(target, info(2))).unwrap();
        assert_eq!(delete.size(), 1);

        let mut rename = UpdatePrimitive::rename(target, "a", info(1));
        let result = rename.merge(UpdatePrimitive::rename(target, "b", info(7)));
        match result {
            Err(StoreError::MergeConflict {
                first_info,
                second_info,
                ..
            }) => {
                assert_eq!(first_info.line, 1);
                assert_eq!(second_info.line, 7);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let result = rename.merge(UpdatePrimitive::delete(target, info(3)));
        assert!(matches!(result, Err(StoreError::InvalidOperation(_))));
    }

    #[test]
    fn test_display() {
        let put = UpdatePrimitive::put(NodeId(4), "out.xml", info(1));
        assert_eq!(put.to_string(), "put[4, [\"out.xml\"]]");
        assert_eq!(UpdatePrimitive::delete(NodeId(2), info(1)).to_string(), "delete[2]");
    }
}
