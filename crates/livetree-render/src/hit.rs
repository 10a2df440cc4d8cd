#![forbid(unsafe_code)]

//! Coordinate-to-element resolution.
//!
//! An [`ElementPath`] names a node by the chain of `(kind, index, identity)`
//! steps from a root. Paths survive incremental patches as long as the nodes
//! they name are kept; [`resolve_element`] falls back to an identity search
//! among siblings when a kept node moved.

use std::fmt;

use livetree_core::{Identity, Point};

use crate::node::{NodeFlags, NodeKind};
use crate::tree::{LiveTree, NodeId};

/// One step of an [`ElementPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementPoint {
    pub kind: NodeKind,
    /// Position among the parent's children when the path was taken.
    pub index: usize,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementPath {
    pub points: Vec<ElementPoint>,
    pub leaf: NodeId,
    /// Character offset inside a text leaf.
    pub char_offset: Option<usize>,
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, point) in self.points.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}[{}]", point.kind, point.index)?;
            if let Some(id) = &point.identity {
                write!(f, "#{id}")?;
            }
        }
        if let Some(offset) = self.char_offset {
            write!(f, "@{offset}")?;
        }
        Ok(())
    }
}

/// Deepest node under `point`, searched topmost (last painted) first.
///
/// Nodes with empty bounds are transparent: they are searched through but
/// never hit themselves.
pub fn resolve_path(tree: &LiveTree, root: NodeId, point: Point) -> Option<ElementPath> {
    let mut points = Vec::new();
    let leaf = descend(tree, root, point, &mut points)?;
    let char_offset = tree.get(leaf).and_then(|node| {
        node.payload
            .text()
            .map(|run| run.offset_at(point.x - node.bounds.x))
    });
    Some(ElementPath {
        points,
        leaf,
        char_offset,
    })
}

fn descend(
    tree: &LiveTree,
    id: NodeId,
    point: Point,
    points: &mut Vec<ElementPoint>,
) -> Option<NodeId> {
    for (index, &child) in tree.children(id).iter().enumerate().rev() {
        let Some(node) = tree.get(child) else {
            continue;
        };
        let hit = node.bounds.contains(point);
        let transparent = node.bounds.is_empty() && !node.children().is_empty();
        if !hit && !transparent {
            continue;
        }
        points.push(ElementPoint {
            kind: node.kind,
            index,
            identity: node.identity.clone(),
        });
        if let Some(leaf) = descend(tree, child, point, points) {
            return Some(leaf);
        }
        if hit {
            return Some(child);
        }
        points.pop();
    }
    None
}

/// Follow `path` from `root`. `None` if any step no longer exists.
pub fn resolve_element(tree: &LiveTree, root: NodeId, path: &ElementPath) -> Option<NodeId> {
    let mut cursor = root;
    for step in &path.points {
        let children = tree.children(cursor);
        let matches = |id: &NodeId| {
            tree.get(*id).is_some_and(|node| {
                node.identity == step.identity && node.kind.is_canvas() == step.kind.is_canvas()
            })
        };
        cursor = match children.get(step.index).filter(|id| matches(id)) {
            Some(&id) => id,
            None if step.identity.is_some() => *children.iter().find(|id| matches(id))?,
            None => return None,
        };
    }
    Some(cursor)
}

/// Highlight the node named by `path`, clearing any previous highlight.
pub fn highlight_path(tree: &mut LiveTree, root: NodeId, path: &ElementPath) -> Option<NodeId> {
    let target = resolve_element(tree, root, path)?;
    clear_highlights(tree, root);
    tree.get_mut(target)?.flags.insert(NodeFlags::HIGHLIGHTED);
    Some(target)
}

/// Remove every highlight under `root`. Returns how many were cleared.
pub fn clear_highlights(tree: &mut LiveTree, root: NodeId) -> usize {
    let mut cleared = 0;
    for id in tree.descendants(root) {
        if let Some(node) = tree.get_mut(id) {
            if node.flags.contains(NodeFlags::HIGHLIGHTED) {
                node.flags.remove(NodeFlags::HIGHLIGHTED);
                cleared += 1;
            }
        }
    }
    cleared
}
