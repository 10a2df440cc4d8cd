#![forbid(unsafe_code)]

//! Target-view interpreter.
//!
//! Scans the target list left to right and decides, per slot, whether an
//! origin node is kept (`Reuse`) or a fresh node is created (`Append`).
//! Origin nodes nobody claimed are dropped (`Remove`) after the scan.
//!
//! # Tie-breaking
//!
//! When several target nodes ask for the same origin identity the first one
//! in target order wins; the rest are downgraded to `Append`. A reuse request
//! naming an identity absent from the origin list is also an `Append`. Both
//! cases are silent: a stale reference only means there is nothing to reuse.

use ahash::AHashMap;

use crate::identity::IdentityModel;
use crate::instruction::{Instruction, Interpretation, PatchPair};

/// Classify every origin and target slot.
///
/// Every origin index appears in exactly one `Reuse` or `Remove`; every target
/// index in exactly one `Reuse` or `Append`. No instruction carries a live
/// position yet; see [`crate::to_edit_ops`].
pub fn interpret<O, T, M>(origin: &[O], target: &[T], model: &M) -> Interpretation
where
    M: IdentityModel<O, T>,
{
    #[cfg(feature = "tracing")]
    let _span = tracing::trace_span!(
        "reconcile.interpret",
        origin = origin.len(),
        target = target.len()
    )
    .entered();

    // First occurrence of a key is the reuse candidate; later duplicates can
    // only be removed.
    let mut available: AHashMap<M::Key, usize> = AHashMap::with_capacity(origin.len());
    for (index, node) in origin.iter().enumerate() {
        if !model.is_matchable_origin(node) {
            continue;
        }
        if let Some(key) = model.origin_identity(node) {
            available.entry(key).or_insert(index);
        }
    }

    let mut out = Interpretation::with_capacity(origin.len(), target.len());
    let mut kept = vec![false; origin.len()];

    for (index, node) in target.iter().enumerate() {
        let claimed = if model.is_matchable_target(node) {
            model
                .reuse_request(node)
                .and_then(|key| available.remove(&key))
        } else {
            None
        };

        match claimed {
            Some(origin_index) => {
                kept[origin_index] = true;
                out.instructions.push(Instruction::Reuse(origin_index));
                out.patch_pairs.push(PatchPair {
                    origin: origin_index,
                    target: index,
                });
            }
            None => out.instructions.push(Instruction::Append(index)),
        }
    }

    out.instructions.extend(
        kept.iter()
            .enumerate()
            .filter(|(_, kept)| !**kept)
            .map(|(index, _)| Instruction::Remove(index)),
    );

    #[cfg(feature = "tracing")]
    tracing::trace!(
        reused = out.reused(),
        removed = origin.len() - out.reused(),
        "interpreted sibling level"
    );

    out
}
