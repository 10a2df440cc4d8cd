#![forbid(unsafe_code)]

//! Canvas identity bridge.
//!
//! Rasterized pages live in canvas containers that are expensive to rebuild.
//! The producer cannot reference a container directly, so every page is
//! emitted as a [`NodeKind::CanvasStub`] placeholder carrying the page
//! identity. The patch driver then treats stubs and containers alike:
//!
//! - a stub whose identity matches a live container is patched onto the
//!   container (the container keeps its kind and surface);
//! - a stub mounted fresh is resolved by [`CanvasBridge::settle`], which
//!   either swaps in the page's parked container or records the stub as
//!   pending until the raster pass delivers a surface.
//!
//! A container is only ever moved or attribute-merged while its page is in
//! the document. It is destroyed when the page leaves the document.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use livetree_core::cancel::Cancelled;
use livetree_core::{CancellationToken, Fingerprint, Identity, ReconcileError, Rect};

use crate::node::{NodeKind, Payload, TargetNode};
use crate::tree::{LiveTree, NodeId};

/// RGBA8 raster of one page.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: rgba.iter().copied().cycle().take(len * 4).collect(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A page the document currently contains.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasPageSpec {
    pub identity: Identity,
    pub index: usize,
    pub width: f32,
    pub height: f32,
}

impl CanvasPageSpec {
    pub fn new(identity: impl Into<Identity>, index: usize, width: f32, height: f32) -> Self {
        Self {
            identity: identity.into(),
            index,
            width,
            height,
        }
    }

    /// Placeholder the producer mounts where this page's canvas belongs.
    pub fn placeholder(&self) -> TargetNode {
        let fingerprint = Fingerprint::of(&(
            self.identity.as_str(),
            self.index,
            self.width.to_bits(),
            self.height.to_bits(),
        ));
        TargetNode::new(NodeKind::CanvasStub)
            .keyed(self.identity.clone())
            .with_attr("data-page", self.index.to_string())
            .with_attr("width", self.width.to_string())
            .with_attr("height", self.height.to_string())
            .with_bounds(Rect::from_size(self.width, self.height))
            .with_fingerprint(fingerprint)
    }

    fn same_size(&self, other: &Self) -> bool {
        self.width.to_bits() == other.width.to_bits() && self.height.to_bits() == other.height.to_bits()
    }
}

/// Registry entry for one page.
#[derive(Debug, Clone)]
pub struct CanvasPage {
    pub spec: CanvasPageSpec,
    container: Option<NodeId>,
    stub: Option<NodeId>,
    dirty: bool,
}

impl CanvasPage {
    /// The live container, attached or parked.
    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    /// The placeholder awaiting a surface.
    pub fn pending_stub(&self) -> Option<NodeId> {
        self.stub
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// How a page's placeholder was resolved by [`CanvasBridge::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The page's parked container replaced the placeholder.
    Adopted(NodeId),
    /// The container was already in place.
    Retained(NodeId),
    /// No container yet; the placeholder waits for a surface.
    Pending(NodeId),
    /// The placeholder names a page the bridge does not know, or a page
    /// already placed elsewhere in the tree. It stays an inert placeholder.
    Unplaced(NodeId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettleReport {
    pub placements: Vec<(Identity, Placement)>,
    /// Containers destroyed because their page left the document.
    pub destroyed: usize,
}

impl SettleReport {
    pub fn adopted(&self) -> usize {
        self.count(|p| matches!(p, Placement::Adopted(_)))
    }

    pub fn pending(&self) -> usize {
        self.count(|p| matches!(p, Placement::Pending(_)))
    }

    pub fn retained(&self) -> usize {
        self.count(|p| matches!(p, Placement::Retained(_)))
    }

    fn count(&self, pred: impl Fn(&Placement) -> bool) -> usize {
        self.placements.iter().filter(|(_, p)| pred(p)).count()
    }
}

/// A surface delivered by a raster pass.
#[derive(Debug, Clone)]
pub struct RasterizedPage {
    pub identity: Identity,
    pub bitmap: Arc<Bitmap>,
}

/// Result of attaching one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Surface installed on this container.
    Attached(NodeId),
    /// The page exists but has neither container nor pending placeholder.
    Stale,
    UnknownPage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub attached: usize,
    pub stale: usize,
}

/// Keeps canvas containers alive across reconciliation passes.
#[derive(Debug, Clone, Default)]
pub struct CanvasBridge {
    pages: AHashMap<Identity, CanvasPage>,
}

impl CanvasBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, identity: &Identity) -> Option<&CanvasPage> {
        self.pages.get(identity)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Sync the registry with the document's pages, then [`settle`](Self::settle).
    ///
    /// Call after the structural patch. Pages absent from `pages` are dropped
    /// and their containers destroyed; new or resized pages are marked dirty.
    pub fn create_canvas_pages(
        &mut self,
        tree: &mut LiveTree,
        pages: &[CanvasPageSpec],
    ) -> Result<SettleReport, ReconcileError> {
        let present: AHashSet<&Identity> = pages.iter().map(|p| &p.identity).collect();
        let vanished: Vec<Identity> = self
            .pages
            .keys()
            .filter(|id| !present.contains(id))
            .cloned()
            .collect();

        let mut destroyed = 0;
        for identity in vanished {
            let Some(page) = self.pages.remove(&identity) else {
                continue;
            };
            if let Some(container) = page.container.filter(|&c| tree.contains(c)) {
                tree.destroy(container)?;
                destroyed += 1;
            }
        }

        for spec in pages {
            match self.pages.get_mut(&spec.identity) {
                Some(page) => {
                    if !page.spec.same_size(spec) {
                        page.dirty = true;
                    }
                    page.spec = spec.clone();
                }
                None => {
                    self.pages.insert(
                        spec.identity.clone(),
                        CanvasPage {
                            spec: spec.clone(),
                            container: None,
                            stub: None,
                            dirty: true,
                        },
                    );
                }
            }
        }

        let mut report = self.settle(tree)?;
        report.destroyed += destroyed;
        Ok(report)
    }

    /// Resolve every canvas placeholder attached to the tree.
    ///
    /// Each page is placed once. Live containers claim their page before
    /// placeholders do; later occurrences of a placed page are reported as
    /// [`Placement::Unplaced`].
    pub fn settle(&mut self, tree: &mut LiveTree) -> Result<SettleReport, ReconcileError> {
        let mut report = SettleReport::default();
        let mut found: Vec<(NodeId, NodeKind, Identity)> = tree
            .descendants(tree.root())
            .into_iter()
            .filter_map(|id| {
                let node = tree.get(id)?;
                node.kind
                    .is_canvas()
                    .then(|| node.identity.clone().map(|i| (id, node.kind, i)))
                    .flatten()
            })
            .collect();
        found.sort_by_key(|(_, kind, _)| *kind != NodeKind::Canvas);

        let mut placed: AHashSet<Identity> = AHashSet::new();
        for (id, kind, identity) in found {
            let page = match self.pages.get_mut(&identity) {
                Some(page) if placed.insert(identity.clone()) => page,
                _ => {
                    report.placements.push((identity, Placement::Unplaced(id)));
                    continue;
                }
            };
            let placement = if kind == NodeKind::Canvas {
                page.container = Some(id);
                page.stub = None;
                Placement::Retained(id)
            } else {
                let parked = page
                    .container
                    .filter(|&c| tree.contains(c) && !tree.is_attached(c));
                match parked {
                    Some(container) => {
                        let stub = tree.get(id).cloned().ok_or(ReconcileError::StaleNode)?;
                        tree.replace(id, container)?;
                        if let Some(node) = tree.get_mut(container) {
                            node.attrs.merge_from(&stub.attrs);
                            node.bounds = stub.bounds;
                            node.fingerprint = stub.fingerprint;
                        }
                        page.stub = None;
                        Placement::Adopted(container)
                    }
                    None => {
                        page.stub = Some(id);
                        page.dirty = true;
                        Placement::Pending(id)
                    }
                }
            };
            report.placements.push((identity, placement));
        }

        let owned: AHashSet<NodeId> = self.pages.values().filter_map(|p| p.container).collect();
        let orphans: Vec<NodeId> = tree
            .parked()
            .iter()
            .copied()
            .filter(|id| !owned.contains(id))
            .collect();
        for id in orphans {
            tree.destroy(id)?;
            report.destroyed += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            adopted = report.adopted(),
            pending = report.pending(),
            destroyed = report.destroyed,
            "canvas pages settled"
        );

        Ok(report)
    }

    /// Pages whose surface must be (re)painted, in document order.
    pub fn pages_needing_paint(&self) -> Vec<CanvasPageSpec> {
        let mut specs: Vec<CanvasPageSpec> = self
            .pages
            .values()
            .filter(|p| p.dirty)
            .map(|p| p.spec.clone())
            .collect();
        specs.sort_by_key(|s| s.index);
        specs
    }

    /// Force every page to be repainted.
    pub fn invalidate_all(&mut self) {
        for page in self.pages.values_mut() {
            page.dirty = true;
        }
    }

    /// Install a surface for `identity`, turning a pending placeholder into
    /// the page's container if needed.
    pub fn attach_surface(
        &mut self,
        tree: &mut LiveTree,
        identity: &Identity,
        bitmap: Arc<Bitmap>,
    ) -> Attachment {
        let Some(page) = self.pages.get_mut(identity) else {
            return Attachment::UnknownPage;
        };

        if let Some(container) = page.container.filter(|&c| tree.contains(c)) {
            if let Some(node) = tree.get_mut(container) {
                node.payload = Payload::Surface(bitmap);
            }
            page.dirty = false;
            return Attachment::Attached(container);
        }

        let stub = page
            .stub
            .filter(|&s| tree.get(s).is_some_and(|n| n.kind == NodeKind::CanvasStub));
        match stub.and_then(|s| tree.get_mut(s).map(|node| (s, node))) {
            Some((id, node)) => {
                node.kind = NodeKind::Canvas;
                node.payload = Payload::Surface(bitmap);
                page.container = Some(id);
                page.stub = None;
                page.dirty = false;
                Attachment::Attached(id)
            }
            None => Attachment::Stale,
        }
    }

    /// Attach the surfaces of a finished raster pass.
    ///
    /// If `token` was cancelled nothing is attached and every surface is
    /// discarded.
    pub fn update_canvas_pages(
        &mut self,
        tree: &mut LiveTree,
        surfaces: Vec<RasterizedPage>,
        token: &CancellationToken,
    ) -> Result<UpdateReport, Cancelled> {
        token.checkpoint()?;
        let mut report = UpdateReport::default();
        for page in surfaces {
            match self.attach_surface(tree, &page.identity, page.bitmap) {
                Attachment::Attached(_) => report.attached += 1,
                Attachment::Stale | Attachment::UnknownPage => report.stale += 1,
            }
        }
        Ok(report)
    }
}
