#![forbid(unsafe_code)]

//! Frame-scheduled reconciliation.
//!
//! [`ReconcileScheduler`] owns two live views of one document: the graphics
//! tree (page groups and canvases) and the outline tree (heading sections
//! interleaved with the same page canvases). Producers call
//! [`request_render`](ReconcileScheduler::request_render) and
//! [`request_view_change`](ReconcileScheduler::request_view_change) as often
//! as they like; the host calls [`on_frame`](ReconcileScheduler::on_frame)
//! whenever [`needs_frame`](ReconcileScheduler::needs_frame) says so.
//!
//! # One frame
//!
//! 1. Collect a finished raster pass, attaching its surfaces.
//! 2. Take the coalesced batch. If it carries a render:
//!    cancel and join the in-flight raster pass, patch both views,
//!    settle page canvases, then start a raster pass for dirty pages.
//! 3. Apply pending view changes (highlight, scroll anchor).
//!
//! Each pass runs inside a `reconcile.pass` span on the `livetree.runtime`
//! target carrying `pass`, `kind`, `mode`, `inserted`, `removed`, `moved`
//! and `duration_us`.

use std::sync::Arc;

use livetree_core::cancel::CancelReason;
use livetree_core::{Point, ReconcileError};
use livetree_render::{
    CanvasBridge, ElementPath, GraphicsPatcher, LiveTree, NodeFlags, NodeId, OutlinePatcher,
    PatchMode, PatchReport, Patcher, SettleReport, UpdateReport, build_outline,
    clear_highlights, highlight_path, outline_target, resolve_element, resolve_path,
};
use tracing::field;
use web_time::{Duration, Instant};

use crate::coalescer::{ChangeCoalescer, RenderKind, RenderRequest, ViewChange};
use crate::config::RuntimeConfig;
use crate::raster::{BlankRasterizer, RasterError, RasterOutcome, RasterPass, Rasterizer};

const TARGET: &str = "livetree.runtime";

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub pass: u64,
    /// `None` when the pass only applied view changes.
    pub kind: Option<RenderKind>,
    pub mode: PatchMode,
    pub graphics: PatchReport,
    pub outline: Option<PatchReport>,
    pub canvases: SettleReport,
    /// An unfinished raster pass was cancelled to make way for this one.
    pub superseded_raster: bool,
    /// Pages handed to the raster pass started by this pass.
    pub raster_pages: usize,
    pub views_applied: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub pass: Option<PassReport>,
    pub surfaces: Option<UpdateReport>,
}

impl FrameReport {
    pub fn is_idle(&self) -> bool {
        self.pass.is_none() && self.surfaces.is_none()
    }
}

#[derive(Debug, Default)]
struct View {
    tree: LiveTree,
    bridge: CanvasBridge,
}

pub struct ReconcileScheduler {
    config: RuntimeConfig,
    graphics: View,
    outline: View,
    graphics_patcher: GraphicsPatcher,
    outline_patcher: OutlinePatcher,
    coalescer: ChangeCoalescer,
    rasterizer: Arc<dyn Rasterizer>,
    raster: Option<RasterPass>,
    raster_seq: u64,
    passes: u64,
    highlight: Option<ElementPath>,
    scroll_anchor: Option<ElementPath>,
}

impl ReconcileScheduler {
    /// Scheduler painting blank surfaces.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_rasterizer(config, Arc::new(BlankRasterizer))
    }

    pub fn with_rasterizer(config: RuntimeConfig, rasterizer: Arc<dyn Rasterizer>) -> Self {
        let max_depth = config.patch.max_depth;
        Self {
            config,
            graphics: View::default(),
            outline: View::default(),
            graphics_patcher: Patcher::graphics().with_max_depth(max_depth),
            outline_patcher: Patcher::outline().with_max_depth(max_depth),
            coalescer: ChangeCoalescer::new(),
            rasterizer,
            raster: None,
            raster_seq: 0,
            passes: 0,
            highlight: None,
            scroll_anchor: None,
        }
    }

    pub fn request_render(&mut self, request: RenderRequest) {
        self.coalescer.push_render(request);
    }

    pub fn request_view_change(&mut self, change: ViewChange) {
        self.coalescer.push_view(change);
    }

    /// Whether the host should schedule a frame.
    pub fn needs_frame(&self) -> bool {
        self.coalescer.has_pending() || self.raster.as_ref().is_some_and(RasterPass::is_finished)
    }

    /// Run one frame. Reconcile errors leave the previous tree in place;
    /// view changes of the batch are applied either way.
    pub fn on_frame(&mut self) -> Result<FrameReport, PassError> {
        let mut frame = FrameReport::default();
        match self.poll_raster() {
            Ok(surfaces) => frame.surfaces = surfaces,
            Err(err) => tracing::warn!(target: TARGET, error = %err, "raster pass failed; surfaces discarded"),
        }

        let Some(batch) = self.coalescer.take() else {
            return Ok(frame);
        };
        self.passes += 1;
        let pass = self.passes;
        let span = tracing::info_span!(
            target: TARGET,
            "reconcile.pass",
            pass,
            kind = field::Empty,
            mode = field::Empty,
            inserted = field::Empty,
            removed = field::Empty,
            moved = field::Empty,
            duration_us = field::Empty,
        );
        let _guard = span.enter();
        let started = Instant::now();
        let mut report = PassReport {
            pass,
            ..PassReport::default()
        };

        let rendered = match batch.render {
            Some(request) => self.render(request, &mut report),
            None => Ok(()),
        };
        if rendered.is_ok() && report.kind.is_some() {
            self.restore_view_state();
        }
        for change in batch.views {
            self.apply_view(change);
            report.views_applied += 1;
        }
        report.duration = started.elapsed();

        span.record("kind", report.kind.map_or("view", RenderKind::as_str));
        span.record("mode", report.mode.as_str());
        span.record("inserted", report.graphics.inserted as u64);
        span.record("removed", report.graphics.removed as u64);
        span.record("moved", report.graphics.moved as u64);
        span.record("duration_us", report.duration.as_micros() as u64);

        if let Err(err) = rendered {
            tracing::error!(target: TARGET, error = %err, "reconcile pass failed; keeping previous tree");
            return Err(err);
        }
        tracing::debug!(
            target: TARGET,
            patched = report.graphics.patched,
            skipped = report.graphics.skipped,
            adopted = report.canvases.adopted(),
            raster_pages = report.raster_pages,
            views = report.views_applied,
            "reconcile pass complete"
        );
        frame.pass = Some(report);
        Ok(frame)
    }

    fn render(&mut self, request: RenderRequest, report: &mut PassReport) -> Result<(), PassError> {
        // Both views are checked before either is touched, and before the
        // in-flight raster pass is given up.
        let outline = request
            .headings
            .as_ref()
            .map(|headings| outline_target(&build_outline(headings), &request.pages));
        self.graphics_patcher.check_depth(&request.target)?;
        if let Some(target) = &outline {
            self.outline_patcher.check_depth(target)?;
        }

        // Collecting may chain a pass for the old tree; that one is superseded too.
        while let Some(raster) = self.raster.take() {
            if raster.is_finished() {
                if let Err(err) = self.collect(raster) {
                    tracing::warn!(target: TARGET, error = %err, "raster pass failed; surfaces discarded");
                }
            } else {
                let id = raster.id();
                let outcome = raster.cancel_and_join(CancelReason::Superseded);
                tracing::warn!(
                    target: TARGET,
                    raster_pass = id,
                    outcome = outcome.label(),
                    "raster pass superseded; surfaces discarded"
                );
                report.superseded_raster = true;
            }
        }

        let full = request.kind == RenderKind::Full;
        let mode = if full && self.config.patch.deep_on_full_render {
            PatchMode::Deep
        } else {
            PatchMode::Incremental
        };
        report.kind = Some(request.kind);
        report.mode = mode;

        if full {
            self.graphics.bridge.invalidate_all();
            self.outline.bridge.invalidate_all();
        }

        self.graphics_patcher.set_mode(mode);
        let root = self.graphics.tree.root();
        report.graphics = self
            .graphics_patcher
            .patch(&mut self.graphics.tree, root, &request.target)?;
        report.canvases = self
            .graphics
            .bridge
            .create_canvas_pages(&mut self.graphics.tree, &request.pages)?;

        if let Some(target) = outline {
            self.outline_patcher.set_mode(mode);
            let root = self.outline.tree.root();
            report.outline = Some(self.outline_patcher.patch(&mut self.outline.tree, root, &target)?);
            self.outline
                .bridge
                .create_canvas_pages(&mut self.outline.tree, &request.pages)?;
        }

        report.raster_pages = self.start_raster()?;
        Ok(())
    }

    /// Start a raster pass for dirty pages of either view. Returns how many
    /// pages it was given.
    fn start_raster(&mut self) -> Result<usize, RasterError> {
        if !self.config.raster.enabled || self.raster.is_some() {
            return Ok(0);
        }
        let mut pages = self.graphics.bridge.pages_needing_paint();
        for page in self.outline.bridge.pages_needing_paint() {
            if !pages.iter().any(|p| p.identity == page.identity) {
                pages.push(page);
            }
        }
        pages.sort_by_key(|p| p.index);
        pages.truncate(self.config.raster.max_pages_per_pass);
        if pages.is_empty() {
            return Ok(0);
        }

        self.raster_seq += 1;
        let pass = RasterPass::spawn(
            self.raster_seq,
            pages,
            self.config.raster.scale,
            Arc::clone(&self.rasterizer),
        )?;
        let count = pass.page_count();
        tracing::debug!(target: TARGET, raster_pass = pass.id(), pages = count, "raster pass started");
        self.raster = Some(pass);
        Ok(count)
    }

    /// Attach the surfaces of a finished raster pass without blocking.
    pub fn poll_raster(&mut self) -> Result<Option<UpdateReport>, RasterError> {
        match self.raster.take() {
            Some(pass) if pass.is_finished() => self.collect(pass),
            other => {
                self.raster = other;
                Ok(None)
            }
        }
    }

    /// Block until the in-flight raster pass finishes, then attach it.
    pub fn wait_raster(&mut self) -> Result<Option<UpdateReport>, RasterError> {
        match self.raster.take() {
            Some(pass) => self.collect(pass),
            None => Ok(None),
        }
    }

    fn collect(&mut self, pass: RasterPass) -> Result<Option<UpdateReport>, RasterError> {
        let id = pass.id();
        let token = pass.token();
        let elapsed = pass.elapsed();
        let surfaces = match pass.join() {
            RasterOutcome::Completed(surfaces) => surfaces,
            RasterOutcome::Cancelled(reason) => {
                tracing::debug!(target: TARGET, raster_pass = id, ?reason, "cancelled raster pass collected");
                return Ok(None);
            }
            RasterOutcome::Failed(err) => return Err(err),
        };

        let Ok(outline) =
            self.outline
                .bridge
                .update_canvas_pages(&mut self.outline.tree, surfaces.clone(), &token)
        else {
            return Ok(None);
        };
        let Ok(report) = self
            .graphics
            .bridge
            .update_canvas_pages(&mut self.graphics.tree, surfaces, &token)
        else {
            return Ok(None);
        };
        tracing::debug!(
            target: TARGET,
            raster_pass = id,
            attached = report.attached,
            outline_attached = outline.attached,
            stale = report.stale,
            elapsed_us = elapsed.as_micros() as u64,
            "raster surfaces attached"
        );

        // Pages beyond max_pages_per_pass are still dirty.
        if report.attached + outline.attached > 0 {
            self.start_raster()?;
        }
        Ok(Some(report))
    }

    /// Cancel and join any raster pass and drop pending changes.
    pub fn shutdown(&mut self) {
        if let Some(pass) = self.raster.take() {
            let outcome = pass.cancel_and_join(CancelReason::Shutdown);
            tracing::debug!(target: TARGET, outcome = outcome.label(), "raster pass stopped for shutdown");
        }
        self.coalescer.clear();
    }

    fn apply_view(&mut self, change: ViewChange) -> bool {
        let root = self.graphics.tree.root();
        match change {
            ViewChange::Highlight(point) => {
                self.highlight = resolve_path(&self.graphics.tree, root, point);
                match &self.highlight {
                    Some(path) => highlight_path(&mut self.graphics.tree, root, path).is_some(),
                    None => {
                        clear_highlights(&mut self.graphics.tree, root);
                        false
                    }
                }
            }
            ViewChange::ClearHighlight => {
                self.highlight = None;
                clear_highlights(&mut self.graphics.tree, root) > 0
            }
            ViewChange::ScrollTo(point) => {
                self.scroll_anchor = resolve_path(&self.graphics.tree, root, point);
                self.mark_scroll_anchor()
            }
        }
    }

    /// Re-resolve the highlight and scroll anchor against a patched tree.
    fn restore_view_state(&mut self) {
        let root = self.graphics.tree.root();
        if let Some(path) = &self.highlight {
            if highlight_path(&mut self.graphics.tree, root, path).is_none() {
                clear_highlights(&mut self.graphics.tree, root);
                self.highlight = None;
            }
        }
        if self.scroll_anchor.is_some() && !self.mark_scroll_anchor() {
            self.scroll_anchor = None;
        }
    }

    fn mark_scroll_anchor(&mut self) -> bool {
        let root = self.graphics.tree.root();
        let anchor = self
            .scroll_anchor
            .as_ref()
            .and_then(|path| resolve_element(&self.graphics.tree, root, path));
        for id in self.graphics.tree.descendants(root) {
            if let Some(node) = self.graphics.tree.get_mut(id) {
                node.flags.set(NodeFlags::SCROLL_ANCHOR, Some(id) == anchor);
            }
        }
        anchor.is_some()
    }

    /// Node currently marked as the scroll anchor.
    pub fn scroll_anchor(&self) -> Option<NodeId> {
        let root = self.graphics.tree.root();
        resolve_element(&self.graphics.tree, root, self.scroll_anchor.as_ref()?)
    }

    pub fn highlighted(&self) -> Option<&ElementPath> {
        self.highlight.as_ref()
    }

    /// Hit-test the graphics view.
    pub fn element_at(&self, point: Point) -> Option<ElementPath> {
        resolve_path(&self.graphics.tree, self.graphics.tree.root(), point)
    }

    pub fn graphics_tree(&self) -> &LiveTree {
        &self.graphics.tree
    }

    pub fn graphics_bridge(&self) -> &CanvasBridge {
        &self.graphics.bridge
    }

    pub fn outline_tree(&self) -> &LiveTree {
        &self.outline.tree
    }

    pub fn outline_bridge(&self) -> &CanvasBridge {
        &self.outline.bridge
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Requests and view changes absorbed by coalescing.
    pub fn coalesced(&self) -> u64 {
        self.coalescer.coalesced()
    }

    pub fn raster_in_flight(&self) -> bool {
        self.raster.is_some()
    }
}

impl std::fmt::Debug for ReconcileScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileScheduler")
            .field("passes", &self.passes)
            .field("graphics", &self.graphics.tree.stats())
            .field("outline", &self.outline.tree.stats())
            .field("raster", &self.raster)
            .field("coalescer", &self.coalescer)
            .finish_non_exhaustive()
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
