#![forbid(unsafe_code)]

//! Background raster passes.
//!
//! A [`RasterPass`] paints a batch of pages on its own named thread. The
//! scheduler owns the pass's [`CancellationSource`]; the worker checks the
//! token between pages (and a [`Rasterizer`] may check it inside a page).
//! Cancelling and then [`join`](RasterPass::join)ing is the acknowledgement:
//! once `join` returns, the worker will not touch anything again.
//!
//! Dropping a pass cancels it with [`CancelReason::Shutdown`] and joins.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use livetree_core::cancel::{CancelReason, CancellationSource, CancellationToken};
use livetree_core::Identity;
use livetree_render::{Bitmap, CanvasPageSpec, RasterizedPage};
use web_time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("page {page} has unpaintable size {width}x{height}")]
    InvalidSize {
        page: Identity,
        width: f32,
        height: f32,
    },
    #[error("rasterizer failed on page {page}: {message}")]
    Backend { page: Identity, message: String },
    #[error("raster worker panicked")]
    WorkerPanicked,
    #[error("failed to spawn raster worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Paints one page.
///
/// Long-running implementations should poll `token` and bail out early; the
/// pass discards whatever they return once it is cancelled.
pub trait Rasterizer: Send + Sync + 'static {
    fn rasterize(
        &self,
        page: &CanvasPageSpec,
        scale: f32,
        token: &CancellationToken,
    ) -> Result<Bitmap, RasterError>;
}

impl<F> Rasterizer for F
where
    F: Fn(&CanvasPageSpec, f32, &CancellationToken) -> Result<Bitmap, RasterError>
        + Send
        + Sync
        + 'static,
{
    fn rasterize(
        &self,
        page: &CanvasPageSpec,
        scale: f32,
        token: &CancellationToken,
    ) -> Result<Bitmap, RasterError> {
        self(page, scale, token)
    }
}

/// Transparent surfaces sized to the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRasterizer;

impl Rasterizer for BlankRasterizer {
    fn rasterize(
        &self,
        page: &CanvasPageSpec,
        scale: f32,
        _token: &CancellationToken,
    ) -> Result<Bitmap, RasterError> {
        let (width, height) = pixel_size(page, scale)?;
        Ok(Bitmap::blank(width, height))
    }
}

/// Device size of `page` at `scale`, rounded up.
pub fn pixel_size(page: &CanvasPageSpec, scale: f32) -> Result<(u32, u32), RasterError> {
    let width = (page.width * scale).ceil();
    let height = (page.height * scale).ceil();
    let paintable = |v: f32| v.is_finite() && v >= 1.0 && v <= u32::MAX as f32;
    if !(paintable(width) && paintable(height)) {
        return Err(RasterError::InvalidSize {
            page: page.identity.clone(),
            width: page.width,
            height: page.height,
        });
    }
    Ok((width as u32, height as u32))
}

#[derive(Debug)]
pub enum RasterOutcome {
    Completed(Vec<RasterizedPage>),
    /// Any surfaces painted before cancellation were dropped.
    Cancelled(CancelReason),
    Failed(RasterError),
}

impl RasterOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Cancelled(_) => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

pub struct RasterPass {
    id: u64,
    pages: usize,
    source: CancellationSource,
    handle: Option<JoinHandle<RasterOutcome>>,
    started: Instant,
}

impl RasterPass {
    /// Start painting `pages` on a thread named `livetree-raster-{id}`.
    pub fn spawn(
        id: u64,
        pages: Vec<CanvasPageSpec>,
        scale: f32,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self, RasterError> {
        let source = CancellationSource::new();
        let token = source.token();
        let count = pages.len();
        let handle = thread::Builder::new()
            .name(format!("livetree-raster-{id}"))
            .spawn(move || paint(&pages, scale, rasterizer.as_ref(), &token))
            .map_err(RasterError::Spawn)?;
        Ok(Self {
            id,
            pages: count,
            source,
            handle: Some(handle),
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn token(&self) -> CancellationToken {
        self.source.token()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.source.cancel(reason)
    }

    /// Wait for the worker. A pass cancelled before the worker returned
    /// reports [`RasterOutcome::Cancelled`] even if every page was painted.
    pub fn join(mut self) -> RasterOutcome {
        let outcome = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) | None => RasterOutcome::Failed(RasterError::WorkerPanicked),
        };
        match (outcome, self.token().reason()) {
            (RasterOutcome::Completed(_), Some(reason)) => RasterOutcome::Cancelled(reason),
            (outcome, _) => outcome,
        }
    }

    pub fn cancel_and_join(self, reason: CancelReason) -> RasterOutcome {
        self.cancel(reason);
        self.join()
    }
}

impl std::fmt::Debug for RasterPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterPass")
            .field("id", &self.id)
            .field("pages", &self.pages)
            .field("cancelled", &self.source.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for RasterPass {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.source.cancel(CancelReason::Shutdown);
            let _ = handle.join();
        }
    }
}

fn paint(
    pages: &[CanvasPageSpec],
    scale: f32,
    rasterizer: &dyn Rasterizer,
    token: &CancellationToken,
) -> RasterOutcome {
    let mut painted = Vec::with_capacity(pages.len());
    for page in pages {
        if let Err(cancelled) = token.checkpoint() {
            return RasterOutcome::Cancelled(cancelled.reason);
        }
        match rasterizer.rasterize(page, scale, token) {
            Ok(bitmap) => painted.push(RasterizedPage {
                identity: page.identity.clone(),
                bitmap: Arc::new(bitmap),
            }),
            Err(err) => return RasterOutcome::Failed(err),
        }
    }
    match token.checkpoint() {
        Ok(()) => RasterOutcome::Completed(painted),
        Err(cancelled) => RasterOutcome::Cancelled(cancelled.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn pages(n: usize) -> Vec<CanvasPageSpec> {
        (0..n)
            .map(|i| CanvasPageSpec::new(format!("page-{i}"), i, 10.0, 20.0))
            .collect()
    }

    #[test]
    fn blank_rasterizer_scales_and_rounds_up() {
        let spec = CanvasPageSpec::new("p", 0, 10.2, 5.0);
        let bitmap = BlankRasterizer
            .rasterize(&spec, 2.0, &CancellationToken::never())
            .unwrap();
        assert_eq!((bitmap.width, bitmap.height), (21, 10));
    }

    #[test]
    fn degenerate_pages_are_rejected() {
        let spec = CanvasPageSpec::new("p", 0, 0.0, 5.0);
        assert!(matches!(pixel_size(&spec, 1.0), Err(RasterError::InvalidSize { .. })));
        let spec = CanvasPageSpec::new("p", 0, f32::INFINITY, 5.0);
        assert!(pixel_size(&spec, 1.0).is_err());
    }

    #[test]
    fn completed_pass_returns_pages_in_order() {
        let pass = RasterPass::spawn(1, pages(3), 1.0, Arc::new(BlankRasterizer)).unwrap();
        match pass.join() {
            RasterOutcome::Completed(painted) => {
                let ids: Vec<_> = painted.iter().map(|p| p.identity.to_string()).collect();
                assert_eq!(ids, ["page-0", "page-1", "page-2"]);
                assert_eq!(painted[0].bitmap.width, 10);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn cancel_stops_a_blocked_rasterizer() {
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = std::sync::Mutex::new(started_tx);
        let slow = move |_: &CanvasPageSpec, _: f32, token: &CancellationToken| -> Result<Bitmap, RasterError> {
            let _ = started_tx.lock().map(|tx| tx.send(()));
            token.wait_timeout(Duration::from_secs(10));
            Ok(Bitmap::blank(1, 1))
        };
        let pass = RasterPass::spawn(2, pages(4), 1.0, Arc::new(slow)).unwrap();
        started_rx.recv().unwrap();
        assert!(!pass.is_finished());
        let outcome = pass.cancel_and_join(CancelReason::Superseded);
        assert!(matches!(outcome, RasterOutcome::Cancelled(CancelReason::Superseded)));
    }

    #[test]
    fn cancellation_after_completion_still_discards() {
        let pass = RasterPass::spawn(3, pages(1), 1.0, Arc::new(BlankRasterizer)).unwrap();
        while !pass.is_finished() {
            thread::yield_now();
        }
        let outcome = pass.cancel_and_join(CancelReason::Superseded);
        assert_eq!(outcome.label(), "cancelled");
    }

    #[test]
    fn rasterizer_error_fails_the_pass() {
        let failing = |page: &CanvasPageSpec, _: f32, _: &CancellationToken| -> Result<Bitmap, RasterError> {
            Err(RasterError::Backend {
                page: page.identity.clone(),
                message: "font missing".into(),
            })
        };
        let pass = RasterPass::spawn(4, pages(2), 1.0, Arc::new(failing)).unwrap();
        match pass.join() {
            RasterOutcome::Failed(err) => assert!(err.to_string().contains("font missing")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn panicking_worker_is_reported() {
        let panicking = |_: &CanvasPageSpec, _: f32, _: &CancellationToken| -> Result<Bitmap, RasterError> {
            panic!("boom")
        };
        let pass = RasterPass::spawn(5, pages(1), 1.0, Arc::new(panicking)).unwrap();
        assert!(matches!(pass.join(), RasterOutcome::Failed(RasterError::WorkerPanicked)));
    }

    #[test]
    fn worker_thread_is_named() {
        let named = |_: &CanvasPageSpec, _: f32, _: &CancellationToken| -> Result<Bitmap, RasterError> {
            assert_eq!(thread::current().name(), Some("livetree-raster-9"));
            Ok(Bitmap::blank(1, 1))
        };
        let pass = RasterPass::spawn(9, pages(1), 1.0, Arc::new(named)).unwrap();
        assert_eq!(pass.join().label(), "completed");
    }
}
