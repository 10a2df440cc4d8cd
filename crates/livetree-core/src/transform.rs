#![forbid(unsafe_code)]

//! View-perspective transformer.
//!
//! Instructions describe the final sibling order; a live tree can only be
//! mutated through its current order. This module re-grounds the former in
//! the latter:
//!
//! 1. Removals come first, in ascending origin order. Each position accounts
//!    for the removals already emitted, because the live collection renumbers
//!    itself after every removal.
//! 2. The surviving origin nodes are simulated in their current order. Walking
//!    the target slots with a cursor `i`, an `Append` becomes
//!    [`EditOp::Insert`] at `i`; a `Reuse` whose node sits further right
//!    becomes [`EditOp::SwapIn`] so the node is relocated, not recreated.
//!
//! Positions left of the cursor are final, so a kept node is always found at
//! or right of it.
//!
//! Any inconsistency in the instruction set is fatal and reported before a
//! single operation is handed out.

use crate::error::{InstructionFault, ReconcileError};
use crate::instruction::{EditOp, Instruction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Unseen,
    Kept,
    Removed,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Keep(usize),
    Create(usize),
}

/// Convert target-ordered instructions into live-ordered edit operations.
pub fn to_edit_ops(
    origin_len: usize,
    instructions: &[Instruction],
) -> Result<Vec<EditOp>, ReconcileError> {
    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!(
        "reconcile.transform",
        origin = origin_len,
        instructions = instructions.len()
    )
    .entered();

    let mut fate = vec![Fate::Unseen; origin_len];
    let mut removals = Vec::new();
    let mut slots = Vec::with_capacity(instructions.len());

    for instruction in instructions {
        match *instruction {
            Instruction::Remove(index) => {
                claim(&mut fate, index, Fate::Removed)?;
                removals.push(index);
            }
            Instruction::Reuse(index) => {
                claim(&mut fate, index, Fate::Kept)?;
                slots.push(Slot::Keep(index));
            }
            Instruction::Append(target) => {
                if target != slots.len() {
                    return Err(InstructionFault::TargetOutOfSequence {
                        expected: slots.len(),
                        found: target,
                    }
                    .into());
                }
                slots.push(Slot::Create(target));
            }
        }
    }

    if let Some(index) = fate.iter().position(|f| *f == Fate::Unseen) {
        return Err(InstructionFault::OriginUncovered(index).into());
    }

    let mut ops = Vec::with_capacity(instructions.len());

    removals.sort_unstable();
    for (already_removed, index) in removals.iter().enumerate() {
        ops.push(EditOp::RemoveAt(index - already_removed));
    }

    // Simulated live order: `Some(origin)` for kept nodes, `None` for inserts.
    let mut live: Vec<Option<usize>> = (0..origin_len)
        .filter(|&index| fate[index] == Fate::Kept)
        .map(Some)
        .collect();

    for (cursor, slot) in slots.iter().enumerate() {
        match *slot {
            Slot::Create(target) => {
                live.insert(cursor, None);
                ops.push(EditOp::Insert { at: cursor, target });
            }
            Slot::Keep(origin) => {
                let offset = live[cursor..]
                    .iter()
                    .position(|entry| *entry == Some(origin))
                    .ok_or(InstructionFault::ReuseLost(origin))?;
                if offset != 0 {
                    let from = cursor + offset;
                    let entry = live.remove(from);
                    live.insert(cursor, entry);
                    ops.push(EditOp::SwapIn { at: cursor, from });
                }
            }
        }
    }

    if live.len() != slots.len() {
        return Err(ReconcileError::EditCountMismatch {
            expected: slots.len(),
            actual: live.len(),
        });
    }

    Ok(ops)
}

fn claim(fate: &mut [Fate], index: usize, next: Fate) -> Result<(), ReconcileError> {
    let len = fate.len();
    let slot = fate
        .get_mut(index)
        .ok_or(InstructionFault::OriginOutOfRange { index, len })?;
    if *slot != Fate::Unseen {
        return Err(InstructionFault::OriginRepeated(index).into());
    }
    *slot = next;
    Ok(())
}

/// Replay edit operations over a plain sequence.
///
/// `create` builds the element for an `Insert`'s target index. Every
/// operation is bounds-checked against a dry run before the sequence is
/// touched, so a malformed list leaves `seq` unchanged.
pub fn apply_edit_ops<T>(
    seq: &mut Vec<T>,
    ops: &[EditOp],
    mut create: impl FnMut(usize) -> T,
) -> Result<(), ReconcileError> {
    validate_ops(seq.len(), ops)?;
    for op in ops {
        match *op {
            EditOp::RemoveAt(at) => {
                seq.remove(at);
            }
            EditOp::Insert { at, target } => seq.insert(at, create(target)),
            EditOp::SwapIn { at, from } => {
                let item = seq.remove(from);
                seq.insert(at, item);
            }
        }
    }
    Ok(())
}

/// Check that `ops` stay within bounds of a sibling list of length `len`.
///
/// Returns the sibling count after all operations.
pub fn validate_ops(len: usize, ops: &[EditOp]) -> Result<usize, ReconcileError> {
    let mut len = len;
    for op in ops {
        let in_bounds = match *op {
            EditOp::RemoveAt(at) => at < len,
            EditOp::Insert { at, .. } => at <= len,
            EditOp::SwapIn { at, from } => at < from && from < len,
        };
        if !in_bounds {
            return Err(ReconcileError::EditOutOfBounds { op: *op, len });
        }
        match op {
            EditOp::RemoveAt(_) => len -= 1,
            EditOp::Insert { .. } => len += 1,
            EditOp::SwapIn { .. } => {}
        }
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{KeyModel, ReuseHint};
    use crate::instruction::Instruction::{Append, Remove, Reuse};
    use crate::interpret::interpret;

    fn run(origin: &[&'static str], target: &[ReuseHint<&'static str>]) -> Vec<EditOp> {
        let origin: Vec<_> = origin.iter().map(|k| Some(*k)).collect();
        let interp = interpret(&origin, target, &KeyModel);
        to_edit_ops(origin.len(), &interp.instructions).unwrap()
    }

    #[test]
    fn replace_single_node() {
        let ops = run(&["o0"], &[ReuseHint::fresh("t0")]);
        assert_eq!(
            ops,
            vec![EditOp::RemoveAt(0), EditOp::Insert { at: 0, target: 0 }]
        );
    }

    #[test]
    fn keep_single_node_is_noop() {
        assert!(run(&["o0"], &[ReuseHint::reusing("o0")]).is_empty());
    }

    #[test]
    fn duplicate_request_inserts_after_kept() {
        let ops = run(&["o0"], &[ReuseHint::reusing("o0"), ReuseHint::reusing("o0")]);
        assert_eq!(ops, vec![EditOp::Insert { at: 1, target: 1 }]);
    }

    #[test]
    fn drop_leading_node() {
        let ops = run(&["o0", "o1"], &[ReuseHint::reusing("o1")]);
        assert_eq!(ops, vec![EditOp::RemoveAt(0)]);
    }

    #[test]
    fn reorder_with_holes() {
        let ops = run(
            &["o0", "o1", "o2", "o3", "o4"],
            &[
                ReuseHint::reusing("o2"),
                ReuseHint::reusing("o1"),
                ReuseHint::reusing("o4"),
            ],
        );
        assert_eq!(
            ops,
            vec![
                EditOp::RemoveAt(0),
                EditOp::RemoveAt(2),
                EditOp::SwapIn { at: 0, from: 1 }
            ]
        );
    }

    #[test]
    fn rotation_moves_without_recreating() {
        let ops = run(
            &["a", "b", "c"],
            &[
                ReuseHint::reusing("c"),
                ReuseHint::reusing("a"),
                ReuseHint::reusing("b"),
            ],
        );
        assert_eq!(ops, vec![EditOp::SwapIn { at: 0, from: 2 }]);
        assert!(ops.iter().all(|op| matches!(op, EditOp::SwapIn { .. })));
    }

    #[test]
    fn replay_reaches_target_order() {
        let origin = ["a", "b", "c", "d"];
        let target = [
            ReuseHint::reusing("d"),
            ReuseHint::fresh("x"),
            ReuseHint::reusing("b"),
            ReuseHint::fresh("y"),
        ];
        let ops = run(&origin, &target);
        let mut live: Vec<&str> = origin.to_vec();
        apply_edit_ops(&mut live, &ops, |t| target[t].key.unwrap()).unwrap();
        assert_eq!(live, vec!["d", "x", "b", "y"]);
    }

    #[test]
    fn empty_instruction_set_on_empty_origin() {
        assert!(to_edit_ops(0, &[]).unwrap().is_empty());
    }

    #[test]
    fn uncovered_origin_is_fatal() {
        let err = to_edit_ops(2, &[Reuse(0)]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MalformedInstructions(InstructionFault::OriginUncovered(1))
        );
    }

    #[test]
    fn repeated_origin_is_fatal() {
        let err = to_edit_ops(1, &[Reuse(0), Remove(0)]).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MalformedInstructions(InstructionFault::OriginRepeated(0))
        );
    }

    #[test]
    fn out_of_range_origin_is_fatal() {
        let err = to_edit_ops(1, &[Reuse(3)]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MalformedInstructions(InstructionFault::OriginOutOfRange {
                index: 3,
                len: 1
            })
        ));
    }

    #[test]
    fn skipped_target_slot_is_fatal() {
        let err = to_edit_ops(0, &[Append(1)]).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MalformedInstructions(InstructionFault::TargetOutOfSequence {
                expected: 0,
                found: 1
            })
        ));
    }

    #[test]
    fn out_of_bounds_ops_leave_sequence_untouched() {
        let mut seq = vec![1, 2];
        let err = apply_edit_ops(
            &mut seq,
            &[EditOp::RemoveAt(0), EditOp::RemoveAt(1)],
            |_| 0,
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::EditOutOfBounds { len: 1, .. }));
        assert_eq!(seq, vec![1, 2]);
    }

    #[test]
    fn swap_in_must_pull_from_the_right() {
        assert!(validate_ops(3, &[EditOp::SwapIn { at: 2, from: 1 }]).is_err());
        assert_eq!(validate_ops(3, &[EditOp::SwapIn { at: 0, from: 2 }]).unwrap(), 3);
    }
}
