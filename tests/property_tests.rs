//! Property-based tests for merging, position shifting and sequence building.

use proptest::prelude::*;
use std::collections::BTreeSet;
use treestore::{
    Fragment, NodeId, NodeStore, PendingUpdateList, SequenceBuilder, SourceInfo, StoreMeta,
    UpdateKind, UpdateOp, UpdatePrimitive,
};

/// doc / <root> <e0/> ... <eN-1/> </root>
fn flat_store(n: usize) -> NodeStore {
    let root = (0..n).fold(Fragment::element("root"), |root, i| {
        root.with_child(Fragment::element(format!("e{}", i)))
    });
    NodeStore::from_document(StoreMeta::default(), vec![root]).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn merged_put_paths_are_the_union(path_sets in prop::collection::vec(
        prop::collection::vec(0u8..8, 1..4),
        1..6,
    )) {
        let target = NodeId(1);
        let mut pul = PendingUpdateList::new();
        for (line, paths) in path_sets.iter().enumerate() {
            for p in paths {
                pul.add(UpdatePrimitive::put(target, format!("out-{}.xml", p), SourceInfo::new(line as u32, 1)))
                    .unwrap();
            }
        }

        let summary = pul.merge_all().unwrap();
        prop_assert_eq!(summary.effective, 1);

        let expected: BTreeSet<String> = path_sets
            .iter()
            .flatten()
            .map(|p| format!("out-{}.xml", p))
            .collect();
        let merged = match pul.effective()[0].op() {
            UpdateOp::Put(put) => put
                .paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            other => panic!("unexpected op {:?}", other),
        };
        prop_assert_eq!(merged.len(), expected.len());
        prop_assert_eq!(merged.into_iter().collect::<BTreeSet<_>>(), expected);
    }

    #[test]
    fn positions_stay_consistent_under_inserts_and_deletes(
        n in 2usize..12,
        ops in prop::collection::vec((0usize..12, any::<bool>()), 1..8),
    ) {
        let mut store = flat_store(n);
        let mut pul = PendingUpdateList::new();

        for (i, (slot, delete)) in ops.into_iter().enumerate() {
            let pre = 2 + slot % n;
            let target = store.id_at(pre).unwrap();
            let info = SourceInfo::new(i as u32, 1);
            if delete {
                pul.add(UpdatePrimitive::delete(target, info)).unwrap();
            } else {
                pul.add(UpdatePrimitive::insert_before(target, vec![Fragment::comment("c")], info))
                    .unwrap();
            }
        }

        let report = pul.apply_all(&mut store).unwrap();
        prop_assert!(report.failure.is_none());

        // every live node's indexed position points back at it
        for pre in 0..store.len() {
            let id = store.id_at(pre).unwrap();
            prop_assert_eq!(store.position_of(id), Some(pre));
        }
        // deletes that met an insert on the same node were dropped as conflicts
        for update in report.applied.iter().filter(|u| u.kind == UpdateKind::Delete) {
            prop_assert_eq!(store.position_of(update.target), None);
        }
    }

    #[test]
    fn builder_length_matches_appends(
        items in prop::collection::vec(any::<u16>(), 0..200),
        capacity in 0usize..16,
    ) {
        let mut builder = SequenceBuilder::new(capacity);
        for item in &items {
            builder.append(*item);
        }
        prop_assert!(builder.capacity() >= builder.len());

        let sequence = builder.finalize();
        prop_assert_eq!(sequence.len(), items.len());
        prop_assert_eq!(sequence.as_slice(), items.as_slice());
    }

    #[test]
    fn builder_set_extends_to_highest_position(
        positions in prop::collection::vec(0usize..64, 1..10),
    ) {
        let mut builder = SequenceBuilder::<u32>::with_default_capacity();
        for &pos in &positions {
            builder.set(pos, pos as u32 + 1);
        }

        let highest = positions.iter().copied().max().unwrap();
        let sequence = builder.finalize();
        prop_assert_eq!(sequence.len(), highest + 1);
        for &pos in &positions {
            prop_assert_eq!(sequence[pos], pos as u32 + 1);
        }
    }
}
