#![forbid(unsafe_code)]

//! Live tree arena.
//!
//! Nodes live in a [`SlotMap`] and are addressed by [`NodeId`]. A removed id
//! is never reused for a different node, so stale handles held by callers
//! (hit paths, canvas records) fail lookups instead of aliasing.
//!
//! # Parking
//!
//! Removing a subtree destroys it, except for canvas containers carrying an
//! identity: those are detached and *parked* so the canvas bridge can move
//! them to wherever their page reappears. Parked nodes are destroyed only by
//! [`LiveTree::destroy`].

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use livetree_core::transform::validate_ops;
use livetree_core::{EditOp, Fingerprint, Identity, ReconcileError, Rect};

use crate::node::{AttrDelta, Attrs, NodeFlags, NodeKind, Payload, TargetNode, write_head};

new_key_type! {
    /// Handle to a node in a [`LiveTree`].
    pub struct NodeId;
}

/// A node attached to (or parked beside) the live tree.
#[derive(Debug, Clone)]
pub struct LiveNode {
    pub kind: NodeKind,
    pub identity: Option<Identity>,
    pub fingerprint: Option<Fingerprint>,
    pub attrs: Attrs,
    pub bounds: Rect,
    pub payload: Payload,
    pub flags: NodeFlags,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
}

impl LiveNode {
    fn from_target(target: &TargetNode) -> Self {
        Self {
            kind: target.kind,
            identity: target.identity.clone(),
            fingerprint: target.fingerprint,
            attrs: target.attrs.clone(),
            bounds: target.bounds,
            payload: target.payload.clone(),
            flags: NodeFlags::empty(),
            parent: None,
            children: SmallVec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Counters for nodes created and destroyed over the tree's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub live: usize,
    pub parked: usize,
    pub created: u64,
    pub destroyed: u64,
}

#[derive(Debug, Clone)]
pub struct LiveTree {
    nodes: SlotMap<NodeId, LiveNode>,
    root: NodeId,
    parked: Vec<NodeId>,
    created: u64,
    destroyed: u64,
}

impl Default for LiveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveTree {
    /// A tree holding only an empty root.
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(LiveNode::from_target(&TargetNode::new(NodeKind::Root)));
        Self {
            nodes,
            root,
            parked: Vec::new(),
            created: 0,
            destroyed: 0,
        }
    }

    /// A tree whose root carries `target` and its whole subtree.
    pub fn from_target(target: &TargetNode) -> Self {
        let mut tree = Self::new();
        let root = tree.root;
        if let Some(node) = tree.nodes.get_mut(root) {
            *node = LiveNode::from_target(target);
        }
        for child in &target.children {
            let id = tree.build(child);
            tree.link(root, usize::MAX, id);
        }
        tree
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&LiveNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut LiveNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Children of `id`; empty for a stale id.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(LiveNode::children).unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(LiveNode::parent)
    }

    /// Position of `id` among its siblings.
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            if cursor == self.root {
                return true;
            }
            match self.parent(cursor) {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    /// Parked canvas containers, in parking order.
    pub fn parked(&self) -> &[NodeId] {
        &self.parked
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            live: self.nodes.len() - self.parked_subtree_len(),
            parked: self.parked.len(),
            created: self.created,
            destroyed: self.destroyed,
        }
    }

    fn parked_subtree_len(&self) -> usize {
        self.parked
            .iter()
            .map(|&id| self.descendants(id).len())
            .sum()
    }

    /// Pre-order walk of `id`'s subtree, `id` included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// First node in `id`'s subtree (pre-order) matching `pred`.
    pub fn find(&self, id: NodeId, mut pred: impl FnMut(&LiveNode) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&n| self.nodes.get(n).is_some_and(&mut pred))
    }

    // ── Construction ────────────────────────────────────────────────────

    /// Build `target` as a detached subtree.
    fn build(&mut self, target: &TargetNode) -> NodeId {
        let id = self.nodes.insert(LiveNode::from_target(target));
        self.created += 1;
        for child in &target.children {
            let child_id = self.build(child);
            self.link(id, usize::MAX, child_id);
        }
        id
    }

    fn link(&mut self, parent: NodeId, at: usize, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            let at = at.min(node.children.len());
            node.children.insert(at, child);
        }
    }

    /// Build `target` and attach it as the `at`-th child of `parent`.
    pub fn mount(
        &mut self,
        parent: NodeId,
        at: usize,
        target: &TargetNode,
    ) -> Result<NodeId, ReconcileError> {
        let len = self.nodes.get(parent).ok_or(ReconcileError::StaleNode)?.children.len();
        if at > len {
            return Err(ReconcileError::EditOutOfBounds {
                op: EditOp::Insert { at, target: 0 },
                len,
            });
        }
        let id = self.build(target);
        self.link(parent, at, id);
        Ok(id)
    }

    /// Attach a detached node as the `at`-th child of `parent`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        at: usize,
        child: NodeId,
    ) -> Result<(), ReconcileError> {
        let len = self.nodes.get(parent).ok_or(ReconcileError::StaleNode)?.children.len();
        let detached = self.nodes.get(child).ok_or(ReconcileError::StaleNode)?.parent.is_none();
        if at > len || !detached || child == self.root {
            return Err(ReconcileError::EditOutOfBounds {
                op: EditOp::Insert { at, target: 0 },
                len,
            });
        }
        self.parked.retain(|&p| p != child);
        self.link(parent, at, child);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), ReconcileError> {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    /// Unlink `id` from its parent. The node and its subtree stay allocated.
    pub fn detach(&mut self, id: NodeId) -> Result<(), ReconcileError> {
        let parent = self.nodes.get_mut(id).ok_or(ReconcileError::StaleNode)?.parent.take();
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        Ok(())
    }

    // ── Removal ─────────────────────────────────────────────────────────

    /// Remove `id` from the tree, parking any canvas containers inside it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), ReconcileError> {
        if id == self.root {
            return Err(ReconcileError::StaleNode);
        }
        self.detach(id)?;
        self.discard(id);
        Ok(())
    }

    fn discard(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.kind == NodeKind::Canvas && node.identity.is_some() {
            node.parent = None;
            node.flags = NodeFlags::empty();
            if !self.parked.contains(&id) {
                self.parked.push(id);
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(identity = ?node.identity, "parked canvas container");
            return;
        }
        let children = std::mem::take(&mut node.children);
        for child in children {
            self.discard(child);
        }
        self.nodes.remove(id);
        self.destroyed += 1;
    }

    /// Remove `id` and its whole subtree, canvas containers included.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), ReconcileError> {
        if id == self.root {
            return Err(ReconcileError::StaleNode);
        }
        self.detach(id)?;
        for node in self.descendants(id) {
            self.parked.retain(|&p| p != node);
            self.nodes.remove(node);
            self.destroyed += 1;
        }
        Ok(())
    }

    /// Put detached `new` where `old` sits and destroy `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), ReconcileError> {
        let at = self.index_in_parent(old).ok_or(ReconcileError::StaleNode)?;
        let parent = self.parent(old).ok_or(ReconcileError::StaleNode)?;
        self.destroy(old)?;
        self.insert_child(parent, at, new)
    }

    // ── Reconciliation hooks ────────────────────────────────────────────

    /// Apply edit operations to `parent`'s children.
    ///
    /// All operations are bounds-checked before the first one is applied.
    /// `target` resolves an `Insert`'s target index to the node to mount.
    pub fn apply_edits<'t>(
        &mut self,
        parent: NodeId,
        ops: &[EditOp],
        target: impl Fn(usize) -> &'t TargetNode,
    ) -> Result<(), ReconcileError> {
        let len = self.nodes.get(parent).ok_or(ReconcileError::StaleNode)?.children.len();
        validate_ops(len, ops)?;
        for op in ops {
            match *op {
                EditOp::RemoveAt(at) => {
                    let child = self.children(parent)[at];
                    self.remove_node(child)?;
                }
                EditOp::Insert { at, target: index } => {
                    self.mount(parent, at, target(index))?;
                }
                EditOp::SwapIn { at, from } => {
                    if let Some(node) = self.nodes.get_mut(parent) {
                        let moved = node.children.remove(from);
                        node.children.insert(at, moved);
                    }
                }
            }
        }
        Ok(())
    }

    /// Bring a kept node's own state in line with `target`.
    ///
    /// Children are untouched. A canvas container stays a container when
    /// the target is only a placeholder, and its surface is never replaced
    /// here.
    pub fn adopt(&mut self, id: NodeId, target: &TargetNode) -> Result<AttrDelta, ReconcileError> {
        let node = self.nodes.get_mut(id).ok_or(ReconcileError::StaleNode)?;
        let delta = node.attrs.merge_from(&target.attrs);
        let keep_container = node.kind == NodeKind::Canvas && target.kind.is_canvas();
        if !keep_container {
            node.kind = target.kind;
            node.payload = target.payload.clone();
        }
        node.identity.clone_from(&target.identity);
        node.fingerprint = target.fingerprint;
        node.bounds = target.bounds;
        Ok(delta)
    }

    /// S-expression rendering of `id`'s subtree.
    pub fn describe(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.describe_into(id, &mut out);
        out
    }

    fn describe_into(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        write_head(out, node.kind, node.identity.as_ref(), &node.attrs, &node.payload);
        for &child in &node.children {
            out.push(' ');
            self.describe_into(child, out);
        }
        out.push(')');
    }
}
