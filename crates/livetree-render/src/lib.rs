#![forbid(unsafe_code)]

//! Live render tree: arena, structural patch drivers, and canvas bridge.
//!
//! # Role in livetree
//! `livetree-render` owns the on-screen tree. It applies the kernel's edit
//! operations to a slot-map arena, recursing level by level, and keeps
//! rasterized page containers alive across passes.
//!
//! # Primary responsibilities
//! - **LiveTree**: arena of [`LiveNode`]s addressed by [`NodeId`].
//! - **Patcher**: depth-first driver parameterized by a [`MatchPolicy`]
//!   ([`GraphicsPatcher`], [`OutlinePatcher`]).
//! - **CanvasBridge**: placeholder/container handoff for page canvases.
//! - **Hit paths**: point → [`ElementPath`] → node, and highlighting.
//! - **Outline**: heading nesting and the outline target tree.
//!
//! # How it fits in the system
//! The document backend produces [`TargetNode`] trees. `livetree-runtime`
//! hands them to a patcher on each frame, then settles canvases and feeds
//! raster results back through [`CanvasBridge::update_canvas_pages`].

pub mod canvas;
pub mod hit;
pub mod node;
pub mod outline;
pub mod patch;
pub mod tree;

pub use canvas::{
    Attachment, Bitmap, CanvasBridge, CanvasPage, CanvasPageSpec, Placement, RasterizedPage,
    SettleReport, UpdateReport,
};
pub use hit::{ElementPath, ElementPoint, clear_highlights, highlight_path, resolve_element, resolve_path};
pub use node::{AttrDelta, Attrs, NodeFlags, NodeKind, Payload, TargetNode, TextRun};
pub use outline::{Heading, OutlineEntry, build_outline, outline_target};
pub use patch::{
    GraphicsPatcher, GraphicsPolicy, MatchPolicy, OutlinePatcher, OutlinePolicy, PatchMode,
    PatchReport, Patcher,
};
pub use tree::{LiveNode, LiveTree, NodeId, TreeStats};
