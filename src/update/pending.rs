//! Pending update list.
//!
//! Updates requested while evaluating against one snapshot are collected
//! here and applied together at the end. Collection never changes the store;
//! [`PendingUpdateList::apply_all`] does, in three phases:
//!
//! 1. inserts and renames,
//! 2. deletes and replaces, targets with the highest current position first,
//! 3. external writes.
//!
//! Every target is resolved to its position right before its own primitive
//! is applied, so earlier changes in the batch are always accounted for.
//! Attribute names are checked once per touched element, for the state the
//! whole batch leaves behind, before anything is applied.

use super::primitive::{ApplyOutcome, UpdateKind, UpdateOp, UpdatePrimitive};
use crate::error::{Result, StoreError};
use crate::store::NodeStore;
use crate::types::{Fragment, NodeId, NodeKind, Pre};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Lifecycle of a pending update list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulState {
    Empty,
    Accumulating,
    /// Merged and not yet applied.
    Merging,
    Applying,
    Applied,
    /// Applied with conflicts or an aborted structural phase.
    Failed,
}

impl fmt::Display for PulState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PulState::Empty => "empty",
            PulState::Accumulating => "accumulating",
            PulState::Merging => "merged",
            PulState::Applying => "applying",
            PulState::Applied => "applied",
            PulState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of merging the collected primitives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Primitives added before the merge.
    pub primitives: usize,
    /// Effective primitives left to apply.
    pub effective: usize,
    /// Targets whose structural updates were dropped because of a conflict.
    pub conflicted_targets: Vec<NodeId>,
}

/// A structural primitive that changed the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedUpdate {
    pub kind: UpdateKind,
    pub target: NodeId,
    /// Position of the target when it was applied.
    pub pre: Pre,
    pub delta: isize,
}

/// Everything that happened during [`PendingUpdateList::apply_all`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Structural primitives in the order they were applied.
    pub applied: Vec<AppliedUpdate>,
    /// Structural primitives not attempted after the phase was aborted.
    pub skipped: usize,
    /// External writes whose target still existed.
    pub puts_applied: usize,
    /// External writes whose target no longer existed.
    pub puts_skipped: usize,
    /// Files written by external writes.
    pub paths_written: usize,
    pub conflicts: Vec<StoreError>,
    pub write_failures: Vec<StoreError>,
    /// Error that aborted the structural phase.
    pub failure: Option<StoreError>,
    /// Error that kept the applied changes from reaching disk. Only set by
    /// [`Database::apply`](crate::Database::apply).
    pub persist_failure: Option<StoreError>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
            && self.persist_failure.is_none()
            && self.conflicts.is_empty()
            && self.write_failures.is_empty()
    }

    /// Net change in the number of table rows.
    pub fn delta(&self) -> isize {
        self.applied.iter().map(|u| u.delta).sum()
    }

    /// First error of the batch, if any: the abort cause, the persistence
    /// error, conflicts, then write failures.
    pub fn into_result(mut self) -> Result<Self> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        if let Some(err) = self.persist_failure.take() {
            return Err(err);
        }
        if !self.conflicts.is_empty() {
            return Err(self.conflicts.remove(0));
        }
        if !self.write_failures.is_empty() {
            return Err(self.write_failures.remove(0));
        }
        Ok(self)
    }
}

/// Primitives collected for one target and kind, in arrival order.
#[derive(Debug)]
struct Group {
    target: NodeId,
    primitives: Vec<UpdatePrimitive>,
}

/// Batch of update primitives collected against one snapshot.
#[derive(Debug)]
pub struct PendingUpdateList {
    state: PulState,
    groups: Vec<Group>,
    lookup: HashMap<(NodeId, UpdateKind), usize>,
    merged: Vec<UpdatePrimitive>,
    conflicts: Vec<StoreError>,
    added: usize,
}

impl Default for PendingUpdateList {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingUpdateList {
    pub fn new() -> Self {
        Self {
            state: PulState::Empty,
            groups: Vec::new(),
            lookup: HashMap::new(),
            merged: Vec::new(),
            conflicts: Vec::new(),
            added: 0,
        }
    }

    pub fn state(&self) -> PulState {
        self.state
    }

    /// Number of primitives added.
    pub fn len(&self) -> usize {
        self.added
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0
    }

    /// Combined size of the primitives still waiting to be applied.
    pub fn size(&self) -> usize {
        let pending: usize = self
            .groups
            .iter()
            .flat_map(|g| g.primitives.iter())
            .map(UpdatePrimitive::size)
            .sum();
        pending + self.merged.iter().map(UpdatePrimitive::size).sum::<usize>()
    }

    /// Effective primitives after [`merge_all`](Self::merge_all).
    pub fn effective(&self) -> &[UpdatePrimitive] {
        &self.merged
    }

    /// Conflicts found by the last merge.
    pub fn conflicts(&self) -> &[StoreError] {
        &self.conflicts
    }

    /// Queue a primitive. The store is not touched.
    pub fn add(&mut self, primitive: UpdatePrimitive) -> Result<()> {
        match self.state {
            PulState::Empty | PulState::Accumulating => {}
            state => {
                return Err(StoreError::InvalidState(format!(
                    "cannot add updates in state {}",
                    state
                )))
            }
        }

        let key = (primitive.target(), primitive.kind());
        match self.lookup.get(&key) {
            Some(&slot) => self.groups[slot].primitives.push(primitive),
            None => {
                self.lookup.insert(key, self.groups.len());
                self.groups.push(Group {
                    target: key.0,
                    primitives: vec![primitive],
                });
            }
        }

        self.added += 1;
        self.state = PulState::Accumulating;
        Ok(())
    }

    /// Reduce the collected primitives to at most one per target and kind,
    /// and check that the kinds addressing each target are compatible.
    ///
    /// Conflicts drop every structural primitive of the involved target; they
    /// are kept in [`conflicts`](Self::conflicts) and reported again by
    /// [`apply_all`](Self::apply_all). Other targets are unaffected.
    pub fn merge_all(&mut self) -> Result<MergeSummary> {
        match self.state {
            PulState::Empty | PulState::Accumulating => {}
            state => {
                return Err(StoreError::InvalidState(format!(
                    "cannot merge in state {}",
                    state
                )))
            }
        }
        self.state = PulState::Merging;

        let mut conflicted: HashSet<NodeId> = HashSet::new();
        let mut conflicted_targets = Vec::new();
        let mut mark = |target: NodeId| {
            if conflicted.insert(target) {
                conflicted_targets.push(target);
            }
        };

        let mut merged = Vec::with_capacity(self.groups.len());
        for group in self.groups.drain(..) {
            let mut primitives = group.primitives.into_iter();
            let Some(mut first) = primitives.next() else {
                continue;
            };
            for next in primitives {
                if let Err(err) = first.merge(next) {
                    self.conflicts.push(err);
                    mark(group.target);
                }
            }
            merged.push(first);
        }
        self.lookup.clear();

        // kinds on one target, in first-seen target order
        let mut order: Vec<NodeId> = Vec::new();
        let mut by_target: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, primitive) in merged.iter().enumerate() {
            if !primitive.kind().is_structural() {
                continue;
            }
            by_target
                .entry(primitive.target())
                .or_insert_with(|| {
                    order.push(primitive.target());
                    Vec::new()
                })
                .push(i);
        }
        for target in order {
            let slots = &by_target[&target];
            for (n, &a) in slots.iter().enumerate() {
                for &b in &slots[n + 1..] {
                    let (first, second) = (&merged[a], &merged[b]);
                    if first.kind().conflicts_with(second.kind()) {
                        self.conflicts.push(StoreError::merge_conflict(
                            target,
                            (first.kind(), first.info()),
                            (second.kind(), second.info()),
                        ));
                        mark(target);
                    }
                }
            }
        }

        merged.retain(|p| !p.kind().is_structural() || !conflicted.contains(&p.target()));
        for err in &self.conflicts {
            warn!(error = %err, "dropping conflicting updates");
        }

        let summary = MergeSummary {
            primitives: self.added,
            effective: merged.len(),
            conflicted_targets,
        };
        debug!(
            primitives = summary.primitives,
            effective = summary.effective,
            conflicts = self.conflicts.len(),
            "merged pending updates"
        );
        self.merged = merged;
        Ok(summary)
    }

    /// Apply the batch to the store. Merges first if that has not happened.
    ///
    /// A failing structural primitive aborts the remaining structural ones;
    /// primitives already applied stay applied. External writes run in every
    /// case, against whatever state the store was left in.
    pub fn apply_all(&mut self, store: &mut NodeStore) -> Result<ApplyReport> {
        if matches!(self.state, PulState::Empty | PulState::Accumulating) {
            self.merge_all()?;
        }
        if self.state != PulState::Merging {
            return Err(StoreError::InvalidState(format!(
                "cannot apply in state {}",
                self.state
            )));
        }
        self.state = PulState::Applying;

        let mut report = ApplyReport {
            conflicts: std::mem::take(&mut self.conflicts),
            ..Default::default()
        };

        let (puts, structural): (Vec<_>, Vec<_>) = self
            .merged
            .drain(..)
            .partition(|p| p.kind() == UpdateKind::Put);
        if let Err(err) = check_final_attributes(&structural, store) {
            warn!(error = %err, "batch leaves duplicate attributes, skipping structural phase");
            report.failure = Some(err);
        }
        let (inserts, mut removals): (Vec<_>, Vec<_>) =
            structural.into_iter().partition(|p| p.kind().phase() == 0);

        // removals from the back of the table leave earlier positions intact;
        // ordering only, each target is resolved again when applied
        removals.sort_by_key(|p| Reverse(store.position_of(p.target())));

        for primitive in inserts.into_iter().chain(removals) {
            if report.failure.is_some() {
                report.skipped += 1;
                continue;
            }

            let (target, kind) = (primitive.target(), primitive.kind());
            match primitive.apply_in_batch(store) {
                Ok(ApplyOutcome::Changed { pre, delta }) => report.applied.push(AppliedUpdate {
                    kind,
                    target,
                    pre,
                    delta,
                }),
                Ok(_) => {}
                Err(err) => {
                    warn!(%target, %kind, error = %err, "update failed, aborting structural phase");
                    report.failure = Some(err);
                }
            }
        }

        for primitive in puts {
            match primitive.apply(store) {
                Ok(ApplyOutcome::Written { written, failures }) => {
                    report.puts_applied += 1;
                    report.paths_written += written;
                    report.write_failures.extend(failures);
                }
                Ok(ApplyOutcome::Skipped) => report.puts_skipped += 1,
                Ok(ApplyOutcome::Changed { .. }) => {}
                Err(err) => report.write_failures.push(err),
            }
        }

        self.state = if report.failure.is_some() || !report.conflicts.is_empty() {
            PulState::Failed
        } else {
            PulState::Applied
        };

        info!(
            applied = report.applied.len(),
            skipped = report.skipped,
            puts = report.puts_applied,
            paths = report.paths_written,
            state = %self.state,
            "applied pending updates"
        );
        Ok(report)
    }
}

/// Attribute name contributed by a primitive of the batch.
type Contribution<'a> = (&'a str, Option<(UpdateKind, NodeId)>);

/// Check that every element whose attributes the batch touches ends up with
/// unique attribute names.
///
/// Evaluated against the store before anything is applied, so removals and
/// renames later in the batch are already accounted for.
fn check_final_attributes(structural: &[UpdatePrimitive], store: &NodeStore) -> Result<()> {
    let mut owners: Vec<Pre> = Vec::new();
    let mut removed: HashSet<Pre> = HashSet::new();
    let mut renamed: HashMap<Pre, (&str, NodeId)> = HashMap::new();
    let mut added: HashMap<Pre, Vec<Contribution<'_>>> = HashMap::new();
    let mut dropped: Vec<Range<Pre>> = Vec::new();

    for primitive in structural {
        let target = primitive.target();
        let Some(pre) = store.position_of(target) else {
            continue;
        };
        let on_attribute = store.kind_at(pre) == Some(NodeKind::Attribute);
        match primitive.op() {
            UpdateOp::InsertAttribute(content) => {
                owners.push(pre);
                added
                    .entry(pre)
                    .or_default()
                    .extend(fragment_names(content, UpdateKind::InsertAttribute, target));
            }
            UpdateOp::Rename(name) if on_attribute => {
                renamed.insert(pre, (name.as_str(), target));
                owners.extend(store.parent(pre));
            }
            UpdateOp::ReplaceAttribute(content) if on_attribute => {
                removed.insert(pre);
                if let Some(owner) = store.parent(pre) {
                    owners.push(owner);
                    added
                        .entry(owner)
                        .or_default()
                        .extend(fragment_names(content, UpdateKind::ReplaceAttribute, target));
                }
            }
            UpdateOp::Delete | UpdateOp::ReplaceElement(_) => {
                removed.insert(pre);
                dropped.push(pre..pre + store.size(pre));
            }
            UpdateOp::ReplaceValue(_) if store.kind_at(pre) == Some(NodeKind::Element) => {
                dropped.push(store.table().attributes(pre).end..pre + store.size(pre));
            }
            _ => {}
        }
    }

    owners.sort_unstable();
    owners.dedup();
    for owner in owners {
        // owner removed by the batch
        if dropped.iter().any(|range| range.contains(&owner)) {
            continue;
        }

        let existing = store
            .table()
            .attributes(owner)
            .filter(|pre| !removed.contains(pre))
            .filter_map(|pre| match renamed.get(&pre) {
                Some(&(name, id)) => Some((name, Some((UpdateKind::Rename, id)))),
                None => store
                    .record(pre)
                    .and_then(|r| r.name.as_deref())
                    .map(|name| (name, None)),
            });
        let inserted = added.get(&owner).into_iter().flatten().copied();

        let mut seen: Vec<Contribution<'_>> = Vec::new();
        for (name, source) in existing.chain(inserted) {
            if let Some(&(_, earlier)) = seen.iter().find(|(other, _)| *other == name) {
                if let Some((kind, target)) = source.or(earlier) {
                    return Err(StoreError::apply_failure(
                        target,
                        kind,
                        format!("duplicate attribute {}", name),
                    ));
                }
            }
            seen.push((name, source));
        }
    }
    Ok(())
}

fn fragment_names(
    content: &[Fragment],
    kind: UpdateKind,
    target: NodeId,
) -> impl Iterator<Item = Contribution<'_>> {
    content.iter().filter_map(move |fragment| match fragment {
        Fragment::Attribute { name, .. } => Some((name.as_str(), Some((kind, target)))),
        _ => None,
    })
}
