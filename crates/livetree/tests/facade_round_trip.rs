#![forbid(unsafe_code)]

//! End-to-end use of the facade: schedule renders, paint pages, and map
//! failures to recovery actions.

use livetree::prelude::*;
use livetree::{Bitmap, NodeFlags, Payload, ReconcileError, Recovery};

fn page(i: usize, words: &[&str]) -> (TargetNode, CanvasPageSpec) {
    let spec = CanvasPageSpec::new(format!("page-{i}"), i, 200.0, 100.0);
    let y = i as f32 * 100.0;
    let lines = words.iter().enumerate().map(|(line, word)| {
        TargetNode::text(*word, vec![8.0; word.len()])
            .with_bounds(Rect::new(0.0, y + line as f32 * 10.0, 200.0, 10.0))
    });
    let group = TargetNode::group(format!("g-{i}"))
        .with_bounds(Rect::new(0.0, y, 200.0, 100.0))
        .with_child(spec.placeholder())
        .with_children(lines);
    (group, spec)
}

fn request(pages: &[&[&str]]) -> RenderRequest {
    let (groups, specs): (Vec<_>, Vec<_>) = pages.iter().enumerate().map(|(i, w)| page(i, w)).unzip();
    RenderRequest::new(TargetNode::new(NodeKind::Root).with_children(groups), RenderKind::Incremental)
        .with_pages(specs)
}

#[test]
fn edit_session_keeps_page_canvases() -> livetree::Result<()> {
    let mut scheduler = ReconcileScheduler::new(RuntimeConfig::default());
    scheduler.request_render(request(&[&["hello", "world"], &["second"]]));
    scheduler.on_frame()?;
    scheduler.wait_raster()?;

    let canvas = |s: &ReconcileScheduler, id: &str| {
        s.graphics_bridge()
            .page(&Identity::from(id))
            .and_then(|p| p.container())
    };
    let first = canvas(&scheduler, "page-0");
    assert!(first.is_some());

    // Typing on page 0 and inserting a page in front of page 1.
    scheduler.request_render(request(&[&["hello", "world!"], &["inserted"], &["second"]]));
    scheduler.request_view_change(ViewChange::Highlight(Point::new(4.0, 12.0)));
    let report = scheduler.on_frame()?.pass.expect("a pass ran");
    assert_eq!(report.canvases.adopted() + report.canvases.retained(), 2);
    assert_eq!(canvas(&scheduler, "page-0"), first);

    let tree = scheduler.graphics_tree();
    let lit = scheduler.highlighted().and_then(|path| {
        livetree::resolve_element(tree, tree.root(), path)
    });
    let node = lit.and_then(|id| tree.get(id)).expect("highlighted node");
    assert!(node.flags.contains(NodeFlags::HIGHLIGHTED));
    assert_eq!(node.payload.text().map(|run| run.text.as_str()), Some("world!"));

    scheduler.wait_raster()?;
    let painted = tree_surfaces(&scheduler);
    assert_eq!(painted, 3);
    Ok(())
}

fn tree_surfaces(scheduler: &ReconcileScheduler) -> usize {
    let tree = scheduler.graphics_tree();
    tree.descendants(tree.root())
        .into_iter()
        .filter_map(|id| tree.get(id))
        .filter(|node| matches!(&node.payload, Payload::Surface(bitmap) if **bitmap == Bitmap::blank(200, 100)))
        .count()
}

#[test]
fn failures_map_to_recovery() {
    let mut config = RuntimeConfig::default();
    config.patch.max_depth = 1;
    let mut scheduler = ReconcileScheduler::new(config);
    // Page groups hold their lines one level further down.
    scheduler.request_render(request(&[&["a"]]));

    let err = livetree::Error::from(scheduler.on_frame().unwrap_err());
    assert!(matches!(err, Error::Reconcile(ReconcileError::DepthLimit { limit: 1 })));
    assert_eq!(err.recovery(), Recovery::KeepStaleTree);
    let tree = scheduler.graphics_tree();
    assert!(tree.children(tree.root()).is_empty());

    let config_err = RuntimeConfig::from_toml_str("[raster]\nscale = 0.0\n")
        .map_err(Error::from)
        .and_then(|config| config.validated().map_err(Error::from))
        .unwrap_err();
    assert_eq!(config_err.recovery(), Recovery::UseDefaults);
}
