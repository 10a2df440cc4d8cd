#![forbid(unsafe_code)]

//! Reconciliation errors.
//!
//! Every variant is fatal for the level being reconciled: the caller must not
//! apply a partial edit list. Stale-reference conditions (a reuse request
//! naming an identity that no longer exists) are *not* errors; they degrade to
//! fresh creation inside the interpreter.

use thiserror::Error;

use crate::instruction::EditOp;

/// Structural defect in an instruction list handed to the transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InstructionFault {
    #[error("origin index {index} out of range for {len} origin nodes")]
    OriginOutOfRange { index: usize, len: usize },
    #[error("origin index {0} appears in more than one instruction")]
    OriginRepeated(usize),
    #[error("origin index {0} is neither reused nor removed")]
    OriginUncovered(usize),
    #[error("append for target slot {found}, expected slot {expected}")]
    TargetOutOfSequence { expected: usize, found: usize },
    #[error("kept origin node {0} is missing from the simulated live order")]
    ReuseLost(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("malformed instructions: {0}")]
    MalformedInstructions(#[from] InstructionFault),
    #[error("edit operations yield {actual} siblings, target has {expected}")]
    EditCountMismatch { expected: usize, actual: usize },
    #[error("edit operation {op} out of bounds for {len} siblings")]
    EditOutOfBounds { op: EditOp, len: usize },
    #[error("patch recursion exceeded depth limit {limit}")]
    DepthLimit { limit: usize },
    #[error("live node no longer exists")]
    StaleNode,
}

impl ReconcileError {
    /// Whether retrying the same pass with a full render may succeed.
    ///
    /// Malformed input is a defect in the producer and will repeat.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleNode | Self::DepthLimit { .. })
    }
}
