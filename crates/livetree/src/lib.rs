#![forbid(unsafe_code)]

//! livetree public facade crate.
//!
//! Re-exports the stable surface of the workspace crates and offers a
//! prelude for hosts that drive a live view:
//!
//! ```
//! use livetree::prelude::*;
//!
//! let mut tree = LiveTree::new();
//! let root = tree.root();
//! let doc = TargetNode::new(NodeKind::Root)
//!     .with_children([TargetNode::group("a"), TargetNode::group("b")]);
//! let report = Patcher::graphics().patch(&mut tree, root, &doc)?;
//! assert_eq!(report.inserted, 2);
//! # Ok::<(), livetree::Error>(())
//! ```

pub mod error;

pub use error::{Error, Recovery, Result};

// --- Kernel re-exports -----------------------------------------------------

pub use livetree_core::cancel::{CancelReason, Cancelled};
pub use livetree_core::{
    CancellationSource, CancellationToken, EditOp, Fingerprint, Identity, IdentityModel,
    Instruction, Interpretation, KeyModel, Point, Rect, ReconcileError, ReuseHint,
    apply_edit_ops, interpret, reconcile, to_edit_ops,
};

// --- Render re-exports -----------------------------------------------------

pub use livetree_render::{
    Attrs, Bitmap, CanvasBridge, CanvasPageSpec, ElementPath, ElementPoint, GraphicsPatcher,
    Heading, LiveNode, LiveTree, MatchPolicy, NodeFlags, NodeId, NodeKind, OutlineEntry,
    OutlinePatcher, PatchMode, PatchReport, Patcher, Payload, RasterizedPage, TargetNode,
    TextRun, build_outline, highlight_path, outline_target, resolve_element, resolve_path,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use livetree_runtime::{
    BlankRasterizer, FrameReport, PassReport, RasterOutcome, Rasterizer, ReconcileScheduler,
    RenderKind, RenderRequest, RuntimeConfig, ViewChange,
};

pub mod prelude {
    pub use crate::{
        CanvasPageSpec, Error, Identity, LiveTree, NodeId, NodeKind, Patcher, Point, Rect,
        Recovery, Result, TargetNode,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{ReconcileScheduler, RenderKind, RenderRequest, RuntimeConfig, ViewChange};

    pub use crate::{core, render};

    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use livetree_core as core;
pub use livetree_render as render;
#[cfg(feature = "runtime")]
pub use livetree_runtime as runtime;
