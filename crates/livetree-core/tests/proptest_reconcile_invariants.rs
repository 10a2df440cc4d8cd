//! Property-based invariant tests for the sibling reconciler.
//!
//! 1. Every origin index is classified exactly once; every target slot too
//! 2. Replaying the edit operations yields the target order
//! 3. Kept nodes are moved, never recreated
//! 4. Removals precede every insert and move
//! 5. Identical inputs produce identical output
//! 6. Reconciling a list against itself is a no-op

use livetree_core::{
    EditOp, Instruction, KeyModel, ReuseHint, apply_edit_ops, interpret, reconcile, to_edit_ops,
    transform::validate_ops,
};
use proptest::prelude::*;
use std::collections::HashSet;

// ── Strategies ──────────────────────────────────────────────────────────

/// Origin siblings: distinct keys with the occasional untagged node.
fn origin_strategy() -> impl Strategy<Value = Vec<Option<u32>>> {
    proptest::collection::vec((0u32..40, any::<bool>()), 0..24).prop_map(|raw| {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|(k, _)| seen.insert(*k))
            .map(|(k, tagged)| tagged.then_some(k))
            .collect()
    })
}

/// Target siblings: reuse requests may repeat or name absent keys.
fn target_strategy() -> impl Strategy<Value = Vec<ReuseHint<u32>>> {
    proptest::collection::vec(
        (100u32..200, proptest::option::of(0u32..60)),
        0..24,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(key, reuse_from)| ReuseHint {
                key: Some(key),
                reuse_from,
            })
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Kept(usize),
    Created(usize),
}

fn expected_slots(target_len: usize, instructions: &[Instruction]) -> Vec<Slot> {
    let slots: Vec<Slot> = instructions
        .iter()
        .filter_map(|inst| match *inst {
            Instruction::Reuse(o) => Some(Slot::Kept(o)),
            Instruction::Append(t) => Some(Slot::Created(t)),
            Instruction::Remove(_) => None,
        })
        .collect();
    assert_eq!(slots.len(), target_len);
    slots
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Classification covers each index exactly once
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn every_origin_and_target_classified_once(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let interp = interpret(&origin, &target, &KeyModel);
        let mut origin_seen = vec![0usize; origin.len()];
        let mut target_slots = 0usize;
        for inst in &interp.instructions {
            match *inst {
                Instruction::Reuse(o) => {
                    origin_seen[o] += 1;
                    target_slots += 1;
                }
                Instruction::Remove(o) => origin_seen[o] += 1,
                Instruction::Append(_) => target_slots += 1,
            }
        }
        prop_assert!(origin_seen.iter().all(|&n| n == 1));
        prop_assert_eq!(target_slots, target.len());
        prop_assert_eq!(interp.reused() + interp.removed(), origin.len());
    }

    #[test]
    fn untagged_origin_is_always_removed(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let interp = interpret(&origin, &target, &KeyModel);
        for pair in &interp.patch_pairs {
            prop_assert!(origin[pair.origin].is_some());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2–3. Replay reaches target order; kept nodes are moved
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn replay_reaches_target_order(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let (interp, ops) = reconcile(&origin, &target, &KeyModel).unwrap();
        let mut live: Vec<Slot> = (0..origin.len()).map(Slot::Kept).collect();
        apply_edit_ops(&mut live, &ops, Slot::Created).unwrap();
        prop_assert_eq!(live, expected_slots(target.len(), &interp.instructions));
    }

    #[test]
    fn inserts_match_appends_exactly(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let (interp, ops) = reconcile(&origin, &target, &KeyModel).unwrap();
        let inserts = ops.iter().filter(|op| matches!(op, EditOp::Insert { .. })).count();
        let removes = ops.iter().filter(|op| matches!(op, EditOp::RemoveAt(_))).count();
        prop_assert_eq!(inserts, interp.appended());
        prop_assert_eq!(removes, interp.removed());
    }

    #[test]
    fn ops_stay_in_bounds(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let (_, ops) = reconcile(&origin, &target, &KeyModel).unwrap();
        prop_assert_eq!(validate_ops(origin.len(), &ops).unwrap(), target.len());
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Removals first
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn removals_precede_inserts_and_moves(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let (_, ops) = reconcile(&origin, &target, &KeyModel).unwrap();
        let first_other = ops
            .iter()
            .position(|op| !matches!(op, EditOp::RemoveAt(_)))
            .unwrap_or(ops.len());
        prop_assert!(ops[first_other..].iter().all(|op| !matches!(op, EditOp::RemoveAt(_))));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 5–6. Determinism and idempotence
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reconcile_is_deterministic(
        origin in origin_strategy(),
        target in target_strategy(),
    ) {
        let a = reconcile(&origin, &target, &KeyModel).unwrap();
        let b = reconcile(&origin, &target, &KeyModel).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn self_reconcile_is_noop(origin in origin_strategy()) {
        let tagged: Vec<Option<u32>> = origin.into_iter().flatten().map(Some).collect();
        let target: Vec<ReuseHint<u32>> = tagged
            .iter()
            .flatten()
            .map(|&k| ReuseHint::reusing(k))
            .collect();
        let interp = interpret(&tagged, &target, &KeyModel);
        prop_assert_eq!(interp.reused(), tagged.len());
        let ops = to_edit_ops(tagged.len(), &interp.instructions).unwrap();
        prop_assert!(ops.is_empty());
    }
}
