#![forbid(unsafe_code)]

//! Node vocabulary shared by the producer and the live tree.
//!
//! A [`TargetNode`] tree is what the document backend produces for every
//! recompilation. It is never attached; the patch drivers read it and mutate
//! the live tree towards it.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use livetree_core::{Fingerprint, Identity, Rect};

use crate::canvas::Bitmap;

/// What a node draws or groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Group,
    Path,
    Image,
    Text,
    Defs,
    /// Opaque markup the producer wants mounted verbatim.
    Raw,
    /// Outline entry.
    Section,
    /// Placeholder for a page whose canvas container is not attached yet.
    CanvasStub,
    /// Live canvas container holding a rasterized page.
    Canvas,
}

impl NodeKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Group => "g",
            Self::Path => "path",
            Self::Image => "image",
            Self::Text => "text",
            Self::Defs => "defs",
            Self::Raw => "raw",
            Self::Section => "section",
            Self::CanvasStub => "canvas-stub",
            Self::Canvas => "canvas",
        }
    }

    /// Stubs and containers stand for the same page.
    pub const fn is_canvas(self) -> bool {
        matches!(self, Self::Canvas | Self::CanvasStub)
    }

    /// Whether a live node of kind `self` can stand in for a target of kind `target`.
    pub const fn accepts(self, target: NodeKind) -> bool {
        match (self, target) {
            (Self::Canvas, Self::CanvasStub) => true,
            _ => self as u8 == target as u8,
        }
    }

    const fn family(self) -> &'static str {
        if self.is_canvas() { "canvas" } else { self.label() }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Attribute map. Ordered so descriptions and comparisons are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Attrs(BTreeMap<String, String>);

/// Counts from an attribute merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrDelta {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl AttrDelta {
    pub const fn total(&self) -> usize {
        self.added + self.updated + self.removed
    }

    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Make `self` equal to `source`, touching only keys that differ.
    pub fn merge_from(&mut self, source: &Attrs) -> AttrDelta {
        let mut delta = AttrDelta::default();
        let before = self.0.len();
        self.0.retain(|key, _| source.0.contains_key(key));
        delta.removed = before - self.0.len();
        for (key, value) in &source.0 {
            match self.0.get_mut(key) {
                Some(current) if current == value => {}
                Some(current) => {
                    current.clone_from(value);
                    delta.updated += 1;
                }
                None => {
                    self.0.insert(key.clone(), value.clone());
                    delta.added += 1;
                }
            }
        }
        delta
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A run of glyphs with per-character advances in points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub advances: Vec<f32>,
}

impl TextRun {
    pub fn new(text: impl Into<String>, advances: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            advances,
        }
    }

    /// Character offset nearest to `dx` points from the run's start.
    ///
    /// A hit past a glyph's midpoint lands after it.
    pub fn offset_at(&self, dx: f32) -> usize {
        let mut pen = 0.0;
        for (index, advance) in self.advances.iter().enumerate() {
            if dx < pen + advance / 2.0 {
                return index;
            }
            pen += advance;
        }
        self.advances.len().min(self.text.chars().count())
    }
}

/// Content carried by a leaf.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    None,
    Text(TextRun),
    /// Rasterized page; only canvas containers hold one.
    Surface(Arc<Bitmap>),
}

impl Payload {
    pub fn text(&self) -> Option<&TextRun> {
        match self {
            Self::Text(run) => Some(run),
            _ => None,
        }
    }

    pub fn surface(&self) -> Option<&Arc<Bitmap>> {
        match self {
            Self::Surface(bitmap) => Some(bitmap),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Interaction state owned by the live tree. Never produced by the
    /// backend, so it only survives on nodes that are kept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        const HIGHLIGHTED = 1 << 0;
        const LISTENING = 1 << 1;
        const SCROLL_ANCHOR = 1 << 2;
    }
}

/// A freshly produced node, not attached to any live tree.
#[derive(Debug, Clone)]
pub struct TargetNode {
    pub kind: NodeKind,
    pub identity: Option<Identity>,
    /// Origin identity this node asks to adopt.
    pub reuse_from: Option<Identity>,
    pub fingerprint: Option<Fingerprint>,
    pub attrs: Attrs,
    pub bounds: Rect,
    pub payload: Payload,
    pub children: Vec<TargetNode>,
}

impl TargetNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            identity: None,
            reuse_from: None,
            fingerprint: None,
            attrs: Attrs::new(),
            bounds: Rect::default(),
            payload: Payload::None,
            children: Vec::new(),
        }
    }

    /// Group tagged `id` that asks to keep the live node with the same tag.
    pub fn group(id: impl Into<Identity>) -> Self {
        Self::new(NodeKind::Group).keyed(id)
    }

    /// Text leaf without identity.
    pub fn text(text: impl Into<String>, advances: Vec<f32>) -> Self {
        Self::new(NodeKind::Text).with_payload(Payload::Text(TextRun::new(text, advances)))
    }

    /// Tag the node and request reuse of the live node carrying the same tag.
    #[must_use]
    pub fn keyed(mut self, id: impl Into<Identity>) -> Self {
        let id = id.into();
        self.reuse_from = Some(id.clone());
        self.identity = Some(id);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, id: impl Into<Identity>) -> Self {
        self.identity = Some(id.into());
        self
    }

    #[must_use]
    pub fn reusing(mut self, id: impl Into<Identity>) -> Self {
        self.reuse_from = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(key, value);
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: TargetNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = TargetNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(TargetNode::subtree_len).sum::<usize>()
    }

    /// S-expression rendering comparable with [`crate::LiveTree::describe`].
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out);
        out
    }

    fn describe_into(&self, out: &mut String) {
        write_head(out, self.kind, self.identity.as_ref(), &self.attrs, &self.payload);
        for child in &self.children {
            out.push(' ');
            child.describe_into(out);
        }
        out.push(')');
    }
}

/// Shared head of a description: `(kind #id [k=v ...] "text"`.
pub(crate) fn write_head(
    out: &mut String,
    kind: NodeKind,
    identity: Option<&Identity>,
    attrs: &Attrs,
    payload: &Payload,
) {
    out.push('(');
    out.push_str(kind.family());
    if let Some(id) = identity {
        let _ = write!(out, " #{id}");
    }
    if !attrs.is_empty() {
        out.push_str(" [");
        for (i, (k, v)) in attrs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{k}={v}");
        }
        out.push(']');
    }
    if let Some(run) = payload.text() {
        let _ = write!(out, " {:?}", run.text);
    }
}
