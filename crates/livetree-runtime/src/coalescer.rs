#![forbid(unsafe_code)]

//! Pending-change coalescing between frames.
//!
//! Render requests can arrive much faster than frames. Between two frames
//! [`ChangeCoalescer`] keeps only what the next pass needs:
//! - Render requests: the latest target wins. If any request in the batch
//!   was [`RenderKind::Full`], the surviving one is upgraded to full, since
//!   an earlier full request may have been for a state the latest target
//!   no longer repeats.
//! - View changes: one slot per [`ViewConcern`]. The latest highlight or
//!   clear replaces any pending one, and the latest scroll target replaces
//!   any pending scroll, so a frame applies at most one of each.
//!
//! ```
//! use livetree_render::{NodeKind, TargetNode};
//! use livetree_runtime::coalescer::{ChangeCoalescer, RenderKind, RenderRequest};
//!
//! let mut coalescer = ChangeCoalescer::new();
//! let doc = || TargetNode::new(NodeKind::Root);
//! coalescer.push_render(RenderRequest::new(doc(), RenderKind::Full));
//! coalescer.push_render(RenderRequest::new(doc(), RenderKind::Incremental));
//!
//! let batch = coalescer.take().unwrap();
//! assert_eq!(batch.render.unwrap().kind, RenderKind::Full);
//! assert_eq!(coalescer.coalesced(), 1);
//! ```

use std::mem;

use livetree_core::Point;
use livetree_render::{CanvasPageSpec, Heading, TargetNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderKind {
    #[default]
    Incremental,
    /// Rebuild every page surface and walk every kept node.
    Full,
}

impl RenderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

/// One document state to reconcile the live views against.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub target: TargetNode,
    /// Page canvases in page order.
    pub pages: Vec<CanvasPageSpec>,
    /// Flat heading list; `None` leaves the outline view untouched.
    pub headings: Option<Vec<Heading>>,
    pub kind: RenderKind,
}

impl RenderRequest {
    pub fn new(target: TargetNode, kind: RenderKind) -> Self {
        Self {
            target,
            pages: Vec::new(),
            headings: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_pages(mut self, pages: Vec<CanvasPageSpec>) -> Self {
        self.pages = pages;
        self
    }

    #[must_use]
    pub fn with_headings(mut self, headings: Vec<Heading>) -> Self {
        self.headings = Some(headings);
        self
    }
}

/// Viewer-side change applied after the structural pass of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewChange {
    /// Highlight the element under a document point.
    Highlight(Point),
    ClearHighlight,
    /// Mark the element under a document point as the scroll anchor.
    ScrollTo(Point),
}

/// What a [`ViewChange`] is about. Pending changes are kept per concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewConcern {
    Highlight,
    Scroll,
}

impl ViewChange {
    pub const fn concern(&self) -> ViewConcern {
        match self {
            Self::Highlight(_) | Self::ClearHighlight => ViewConcern::Highlight,
            Self::ScrollTo(_) => ViewConcern::Scroll,
        }
    }
}

/// What one frame should process.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    pub render: Option<RenderRequest>,
    /// Highlight change first, then scroll; at most one of each.
    pub views: Vec<ViewChange>,
}

/// Collects render requests and view changes until the next frame.
///
/// Not thread-safe; owned by the scheduling thread.
#[derive(Debug, Default)]
pub struct ChangeCoalescer {
    render: Option<RenderRequest>,
    full: bool,
    highlight: Option<ViewChange>,
    scroll: Option<ViewChange>,
    coalesced: u64,
}

impl ChangeCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a render request, replacing any pending one.
    pub fn push_render(&mut self, request: RenderRequest) {
        self.full |= request.kind == RenderKind::Full;
        if self.render.replace(request).is_some() {
            self.coalesced += 1;
        }
    }

    /// Queue a view change, replacing any pending change of the same concern.
    pub fn push_view(&mut self, change: ViewChange) {
        let slot = match change.concern() {
            ViewConcern::Highlight => &mut self.highlight,
            ViewConcern::Scroll => &mut self.scroll,
        };
        if slot.replace(change).is_some() {
            self.coalesced += 1;
        }
    }

    /// Take the pending render and view changes. `None` when nothing is
    /// pending.
    pub fn take(&mut self) -> Option<PendingBatch> {
        if !self.has_pending() {
            return None;
        }
        let render = self.render.take().map(|mut request| {
            if mem::take(&mut self.full) {
                request.kind = RenderKind::Full;
            }
            request
        });
        let views = self.highlight.take().into_iter().chain(self.scroll.take()).collect();
        Some(PendingBatch { render, views })
    }

    pub fn has_pending(&self) -> bool {
        self.render.is_some() || self.pending_views() > 0
    }

    pub fn has_pending_render(&self) -> bool {
        self.render.is_some()
    }

    pub fn pending_views(&self) -> usize {
        usize::from(self.highlight.is_some()) + usize::from(self.scroll.is_some())
    }

    /// Requests and view changes dropped because a later one replaced them.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    pub fn clear(&mut self) {
        self.render = None;
        self.full = false;
        self.highlight = None;
        self.scroll = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetree_render::NodeKind;

    fn request(tag: &str, kind: RenderKind) -> RenderRequest {
        RenderRequest::new(TargetNode::new(NodeKind::Root).with_attr("tag", tag), kind)
    }

    fn tag(batch: &PendingBatch) -> Option<&str> {
        batch.render.as_ref()?.target.attrs.get("tag")
    }

    #[test]
    fn empty_take_is_none() {
        let mut coalescer = ChangeCoalescer::new();
        assert!(!coalescer.has_pending());
        assert!(coalescer.take().is_none());
    }

    #[test]
    fn latest_render_wins() {
        let mut coalescer = ChangeCoalescer::new();
        coalescer.push_render(request("a", RenderKind::Incremental));
        coalescer.push_render(request("b", RenderKind::Incremental));
        coalescer.push_render(request("c", RenderKind::Incremental));
        let batch = coalescer.take().unwrap();
        assert_eq!(tag(&batch), Some("c"));
        assert_eq!(batch.render.unwrap().kind, RenderKind::Incremental);
        assert_eq!(coalescer.coalesced(), 2);
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn full_anywhere_upgrades_the_batch() {
        let mut coalescer = ChangeCoalescer::new();
        coalescer.push_render(request("a", RenderKind::Full));
        coalescer.push_render(request("b", RenderKind::Incremental));
        let batch = coalescer.take().unwrap();
        assert_eq!(tag(&batch), Some("b"));
        assert_eq!(batch.render.unwrap().kind, RenderKind::Full);

        coalescer.push_render(request("c", RenderKind::Incremental));
        let next = coalescer.take().unwrap();
        assert_eq!(next.render.unwrap().kind, RenderKind::Incremental);
    }

    #[test]
    fn latest_view_change_per_concern_wins() {
        let mut coalescer = ChangeCoalescer::new();
        coalescer.push_view(ViewChange::Highlight(Point::new(1.0, 1.0)));
        coalescer.push_view(ViewChange::ClearHighlight);
        coalescer.push_view(ViewChange::Highlight(Point::new(2.0, 2.0)));
        coalescer.push_view(ViewChange::ScrollTo(Point::new(0.0, 50.0)));
        coalescer.push_view(ViewChange::ScrollTo(Point::new(0.0, 60.0)));
        coalescer.push_view(ViewChange::Highlight(Point::new(3.0, 3.0)));
        assert_eq!(coalescer.pending_views(), 2);
        assert_eq!(coalescer.coalesced(), 4);

        let batch = coalescer.take().unwrap();
        assert!(batch.render.is_none());
        assert_eq!(
            batch.views,
            vec![
                ViewChange::Highlight(Point::new(3.0, 3.0)),
                ViewChange::ScrollTo(Point::new(0.0, 60.0)),
            ]
        );
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn clear_replaces_a_pending_highlight() {
        let mut coalescer = ChangeCoalescer::new();
        coalescer.push_view(ViewChange::Highlight(Point::new(1.0, 1.0)));
        coalescer.push_view(ViewChange::ClearHighlight);
        assert_eq!(coalescer.take().unwrap().views, vec![ViewChange::ClearHighlight]);
    }

    #[test]
    fn clear_drops_the_full_flag() {
        let mut coalescer = ChangeCoalescer::new();
        coalescer.push_render(request("a", RenderKind::Full));
        coalescer.clear();
        coalescer.push_render(request("b", RenderKind::Incremental));
        assert_eq!(coalescer.take().unwrap().render.unwrap().kind, RenderKind::Incremental);
    }
}
