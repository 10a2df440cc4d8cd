#![forbid(unsafe_code)]

//! Tracing contract of the reconcile scheduler.
//!
//! Captures spans and events through a `tracing-subscriber` layer and checks:
//! 1. Every pass opens one `reconcile.pass` span with the documented fields
//! 2. Late-recorded fields carry the pass's actual counts
//! 3. Superseding an unfinished raster pass logs a WARN
//! 4. Normal operation logs nothing at ERROR
//!
//! Run:
//!   cargo test -p livetree-runtime --test reconcile_pass_tracing

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};

use livetree_core::cancel::CancellationToken;
use livetree_core::Rect;
use livetree_render::{Bitmap, CanvasPageSpec, NodeKind, TargetNode};
use livetree_runtime::{
    RasterError, ReconcileScheduler, RenderKind, RenderRequest, RuntimeConfig,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use web_time::Duration;

// ============================================================================
// Tracing capture infrastructure
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: String,
    target: String,
    fields: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    target: String,
    span: Option<String>,
    fields: HashMap<String, String>,
}

#[derive(Default)]
struct Captured {
    spans: Vec<CapturedSpan>,
    by_id: HashMap<u64, usize>,
    events: Vec<CapturedEvent>,
}

#[derive(Clone, Default)]
struct SpanCapture(Arc<Mutex<Captured>>);

impl SpanCapture {
    fn spans(&self, name: &str) -> Vec<CapturedSpan> {
        let captured = self.0.lock().unwrap();
        captured.spans.iter().filter(|s| s.name == name).cloned().collect()
    }

    fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().events.clone()
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

impl<S> tracing_subscriber::Layer<S> for SpanCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        for field in attrs.metadata().fields() {
            fields.entry(field.name().to_string()).or_default();
        }
        let mut captured = self.0.lock().unwrap();
        let index = captured.spans.len();
        captured.spans.push(CapturedSpan {
            name: attrs.metadata().name().to_string(),
            target: attrs.metadata().target().to_string(),
            fields,
        });
        captured.by_id.insert(id.into_u64(), index);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut captured = self.0.lock().unwrap();
        let Some(&index) = captured.by_id.get(&id.into_u64()) else {
            return;
        };
        values.record(&mut FieldVisitor(&mut captured.spans[index].fields));
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let span = ctx.lookup_current().map(|s| s.name().to_string());
        self.0.lock().unwrap().events.push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            span,
            fields,
        });
    }
}

fn with_captured_tracing<F, R>(f: F) -> (R, SpanCapture)
where
    F: FnOnce() -> R,
{
    let capture = SpanCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, capture)
}

// ============================================================================
// Helpers
// ============================================================================

fn document(pages: usize, kind: RenderKind) -> RenderRequest {
    let specs: Vec<_> = (0..pages)
        .map(|i| CanvasPageSpec::new(format!("page-{i}"), i, 50.0, 50.0))
        .collect();
    let groups = specs.iter().map(|spec| {
        TargetNode::group(format!("g-{}", spec.index))
            .with_bounds(Rect::new(0.0, spec.index as f32 * 50.0, 50.0, 50.0))
            .with_child(spec.placeholder())
    });
    RenderRequest::new(TargetNode::new(NodeKind::Root).with_children(groups), kind)
        .with_pages(specs)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn pass_span_carries_counts() {
    let (_, capture) = with_captured_tracing(|| {
        let mut scheduler = ReconcileScheduler::new(RuntimeConfig::default());
        scheduler.request_render(document(3, RenderKind::Incremental));
        scheduler.on_frame().unwrap();
        scheduler.wait_raster().unwrap();
        scheduler.request_render(document(2, RenderKind::Full));
        scheduler.on_frame().unwrap();
    });

    let passes = capture.spans("reconcile.pass");
    assert_eq!(passes.len(), 2, "{passes:#?}");
    for span in &passes {
        assert_eq!(span.target, "livetree.runtime");
        for field in ["pass", "kind", "mode", "inserted", "removed", "moved", "duration_us"] {
            assert!(span.fields.contains_key(field), "missing {field} in {span:?}");
        }
    }

    let first = &passes[0].fields;
    assert_eq!(first["pass"], "1");
    assert_eq!(first["kind"], "incremental");
    assert_eq!(first["inserted"], "3");
    assert_eq!(first["removed"], "0");

    let second = &passes[1].fields;
    assert_eq!(second["pass"], "2");
    assert_eq!(second["kind"], "full");
    assert_eq!(second["mode"], "deep");
    assert_eq!(second["removed"], "1");
}

#[test]
fn superseded_raster_warns() {
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let slow = move |_: &CanvasPageSpec, _: f32, token: &CancellationToken| -> Result<Bitmap, RasterError> {
        let _ = started_tx.lock().map(|tx| tx.send(()));
        token.wait_timeout(Duration::from_secs(10));
        Ok(Bitmap::blank(1, 1))
    };

    let (_, capture) = with_captured_tracing(|| {
        let mut scheduler = ReconcileScheduler::with_rasterizer(RuntimeConfig::default(), Arc::new(slow));
        scheduler.request_render(document(1, RenderKind::Incremental));
        scheduler.on_frame().unwrap();
        started_rx.recv().unwrap();
        scheduler.request_render(document(1, RenderKind::Incremental));
        scheduler.on_frame().unwrap();
        scheduler.shutdown();
    });

    let warnings: Vec<_> = capture
        .events()
        .into_iter()
        .filter(|e| e.level == tracing::Level::WARN)
        .collect();
    assert_eq!(warnings.len(), 1, "{warnings:#?}");
    let warning = &warnings[0];
    assert_eq!(warning.target, "livetree.runtime");
    assert_eq!(warning.span.as_deref(), Some("reconcile.pass"));
    assert_eq!(warning.fields["outcome"], "cancelled");
    assert_eq!(warning.fields["raster_pass"], "1");
}

#[test]
fn normal_operation_logs_no_errors() {
    let (_, capture) = with_captured_tracing(|| {
        let mut scheduler = ReconcileScheduler::new(RuntimeConfig::default());
        for pages in [1, 3, 2, 2] {
            scheduler.request_render(document(pages, RenderKind::Incremental));
            scheduler.on_frame().unwrap();
            scheduler.wait_raster().unwrap();
        }
        scheduler.passes()
    });

    assert_eq!(capture.spans("reconcile.pass").len(), 4);
    let errors: Vec<_> = capture
        .events()
        .into_iter()
        .filter(|e| e.level == tracing::Level::ERROR)
        .collect();
    assert!(errors.is_empty(), "{errors:#?}");
}
