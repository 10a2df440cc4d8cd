#![forbid(unsafe_code)]

//! Instruction and edit-operation vocabularies.
//!
//! Two orderings exist and must not be mixed:
//!
//! - [`Instruction`]s are expressed against the **target** order and only
//!   classify each slot's fate.
//! - [`EditOp`]s are expressed against the **live** order as it evolves while
//!   the operations are applied one by one.

use std::fmt;

/// Per-slot fate, expressed in target order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Keep the origin node at this index in the next target slot.
    Reuse(usize),
    /// Create the target node at this index in the next target slot.
    Append(usize),
    /// Drop the origin node at this index.
    Remove(usize),
}

/// An origin node kept for a target node; attributes flow target → origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchPair {
    pub origin: usize,
    pub target: usize,
}

/// Output of the target-view interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// `Reuse`/`Append` in target order, followed by every `Remove`.
    pub instructions: Vec<Instruction>,
    /// One pair per `Reuse`, in target order.
    pub patch_pairs: Vec<PatchPair>,
}

impl Interpretation {
    pub(crate) fn with_capacity(origin: usize, target: usize) -> Self {
        Self {
            instructions: Vec::with_capacity(origin.max(target)),
            patch_pairs: Vec::with_capacity(origin.min(target)),
        }
    }

    /// Number of kept origin nodes.
    pub fn reused(&self) -> usize {
        self.patch_pairs.len()
    }

    /// Number of freshly created target nodes.
    pub fn appended(&self) -> usize {
        self.count(|inst| matches!(inst, Instruction::Append(_)))
    }

    /// Number of dropped origin nodes.
    pub fn removed(&self) -> usize {
        self.count(|inst| matches!(inst, Instruction::Remove(_)))
    }

    fn count(&self, pred: impl Fn(&Instruction) -> bool) -> usize {
        self.instructions.iter().filter(|inst| pred(inst)).count()
    }
}

/// A live-tree edit, positioned against the sibling list at the moment the
/// operation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOp {
    /// Mount target node `target` so that it lands at position `at`.
    Insert { at: usize, target: usize },
    /// Remove the node currently at `at`.
    RemoveAt(usize),
    /// Relocate the node currently at `from` to position `at` (`at < from`).
    ///
    /// The node is moved, never recreated.
    SwapIn { at: usize, from: usize },
}

impl EditOp {
    /// Short label for logs and metrics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::RemoveAt(_) => "remove",
            Self::SwapIn { .. } => "swap_in",
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { at, target } => write!(f, "insert({at}, t{target})"),
            Self::RemoveAt(at) => write!(f, "removeAt({at})"),
            Self::SwapIn { at, from } => write!(f, "swapIn({at}, {from})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let interp = Interpretation {
            instructions: vec![
                Instruction::Reuse(1),
                Instruction::Append(1),
                Instruction::Append(2),
                Instruction::Remove(0),
            ],
            patch_pairs: vec![PatchPair {
                origin: 1,
                target: 0,
            }],
        };
        assert_eq!(interp.reused(), 1);
        assert_eq!(interp.appended(), 2);
        assert_eq!(interp.removed(), 1);
    }

    #[test]
    fn edit_ops_display_like_scenarios() {
        assert_eq!(EditOp::RemoveAt(2).to_string(), "removeAt(2)");
        assert_eq!(EditOp::SwapIn { at: 0, from: 1 }.to_string(), "swapIn(0, 1)");
        assert_eq!(EditOp::Insert { at: 1, target: 1 }.to_string(), "insert(1, t1)");
        assert_eq!(EditOp::SwapIn { at: 0, from: 1 }.label(), "swap_in");
    }
}
