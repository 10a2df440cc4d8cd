#![forbid(unsafe_code)]

//! Document outline.
//!
//! Headings arrive flat, in document order. [`build_outline`] nests them by
//! level; [`outline_target`] turns the nesting into a target tree for the
//! outline patch driver, interleaved with the pages' canvas placeholders so
//! the same page containers can be kept in the outline view.
//!
//! # Unbookmarked headings
//!
//! A heading that is not bookmarked is left out, but it still bounds how deep
//! the next bookmarked heading may nest: that heading is placed no deeper than
//! its topmost skipped ancestor. Given a bookmarked level-1 heading, a skipped
//! level-1, a skipped level-2 and then a bookmarked level-3 heading, the
//! level-3 heading becomes a sibling of the first one, not its child.

use std::num::NonZeroUsize;

use livetree_core::{Fingerprint, Identity, Point};

use crate::canvas::CanvasPageSpec;
use crate::node::{NodeKind, TargetNode};

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub title: String,
    pub level: NonZeroUsize,
    pub bookmarked: bool,
    pub identity: Identity,
    /// Zero-based page index.
    pub page: usize,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub title: String,
    pub level: NonZeroUsize,
    pub identity: Identity,
    pub page: usize,
    pub position: Point,
    pub children: Vec<OutlineEntry>,
}

impl OutlineEntry {
    fn leaf(heading: &Heading) -> Self {
        Self {
            title: heading.title.trim().to_owned(),
            level: heading.level,
            identity: heading.identity.clone(),
            page: heading.page,
            position: heading.position,
            children: Vec::new(),
        }
    }

    /// Entries in this subtree, including `self`.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(OutlineEntry::len).sum::<usize>()
    }

    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&(
            self.title.as_str(),
            self.level.get(),
            self.page,
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.children
                .iter()
                .map(|c| c.fingerprint().0)
                .collect::<Vec<_>>(),
        ))
    }
}

/// Nest `headings` by level. Empty when nothing is bookmarked.
pub fn build_outline(headings: &[Heading]) -> Vec<OutlineEntry> {
    let mut roots: Vec<OutlineEntry> = Vec::new();
    // Open chain of most recent entries, outermost first.
    let mut open: Vec<OutlineEntry> = Vec::new();
    let mut last_skipped: Option<NonZeroUsize> = None;

    for heading in headings {
        if heading.bookmarked {
            let depth = open
                .iter()
                .take_while(|entry| {
                    last_skipped.is_none_or(|skipped| entry.level < skipped)
                        && entry.level < heading.level
                })
                .count();
            close_to(&mut roots, &mut open, depth);
            open.push(OutlineEntry::leaf(heading));
            last_skipped = None;
        } else if last_skipped.is_none_or(|skipped| heading.level < skipped) {
            last_skipped = Some(heading.level);
        }
    }

    close_to(&mut roots, &mut open, 0);
    roots
}

/// Fold open entries deeper than `depth` into their parents.
fn close_to(roots: &mut Vec<OutlineEntry>, open: &mut Vec<OutlineEntry>, depth: usize) {
    while open.len() > depth {
        let Some(entry) = open.pop() else {
            break;
        };
        match open.last_mut() {
            Some(parent) => parent.children.push(entry),
            None => roots.push(entry),
        }
    }
}

/// Outline target tree: each page's placeholder followed by the top-level
/// entries starting on that page. Entries past the last page trail at the end.
pub fn outline_target(entries: &[OutlineEntry], pages: &[CanvasPageSpec]) -> TargetNode {
    let mut root = TargetNode::new(NodeKind::Root);
    let mut rest = entries.iter().peekable();
    for page in pages {
        root.children.push(page.placeholder());
        while let Some(entry) = rest.next_if(|e| e.page <= page.index) {
            root.children.push(section(entry));
        }
    }
    root.children.extend(rest.map(section));
    root
}

fn section(entry: &OutlineEntry) -> TargetNode {
    let label = TargetNode::new(NodeKind::Raw).with_attr("text", entry.title.clone());
    TargetNode::new(NodeKind::Section)
        .keyed(entry.identity.clone())
        .with_attr("level", entry.level.to_string())
        .with_attr("page", entry.page.to_string())
        .with_fingerprint(entry.fingerprint())
        .with_child(label)
        .with_children(entry.children.iter().map(section))
}
