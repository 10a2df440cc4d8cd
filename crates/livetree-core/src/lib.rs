#![forbid(unsafe_code)]

//! Reconciliation kernel: identities, instructions, and edit operations.
//!
//! # Role in livetree
//! `livetree-core` is the algorithmic heart of the workspace. It knows nothing
//! about live trees, canvases, or scheduling. Given an origin sibling list and
//! a freshly produced target sibling list it decides, per slot, whether a node
//! is kept, appended, or dropped, and then re-expresses that decision as edit
//! operations against the *current* live order.
//!
//! # Primary responsibilities
//! - **Identity model**: [`IdentityModel`] predicates injected by callers.
//! - **Interpreter**: [`interpret`] classifies every slot in target order.
//! - **Transformer**: [`to_edit_ops`] converts the classification into
//!   [`EditOp`]s that can be applied to an auto-renumbering sibling list.
//! - **Replay**: [`apply_edit_ops`] applies edit operations to a plain `Vec`.
//!
//! # How it fits in the system
//! `livetree-render` calls the interpreter and transformer once per tree
//! level while walking a live tree. `livetree-runtime` schedules those walks.

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod instruction;
pub mod interpret;
pub mod transform;

pub use cancel::{CancellationSource, CancellationToken};
pub use error::{InstructionFault, ReconcileError};
pub use geometry::{Point, Rect};
pub use identity::{Fingerprint, Identity, IdentityModel, KeyModel, ReuseHint};
pub use instruction::{EditOp, Instruction, Interpretation, PatchPair};
pub use interpret::interpret;
pub use transform::{apply_edit_ops, to_edit_ops};

/// Result alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Interpret and transform in one call.
///
/// Convenience for callers that do not need to inspect the intermediate
/// instruction list.
pub fn reconcile<O, T, M>(
    origin: &[O],
    target: &[T],
    model: &M,
) -> Result<(Interpretation, Vec<EditOp>)>
where
    M: IdentityModel<O, T>,
{
    let interpretation = interpret(origin, target, model);
    let ops = to_edit_ops(origin.len(), &interpretation.instructions)?;
    Ok((interpretation, ops))
}
