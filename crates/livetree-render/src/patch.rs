#![forbid(unsafe_code)]

//! Structural patch drivers.
//!
//! A driver walks the live tree and a target tree together, depth first. At
//! every level it:
//!
//! 1. removes live siblings the [`MatchPolicy`] does not track,
//! 2. sets aside target siblings the policy does not track, grouped by the
//!    tracked sibling that follows them,
//! 3. runs the interpreter and transformer over the tracked siblings and
//!    applies the resulting edits,
//! 4. merges attributes into every kept node and recurses into it unless the
//!    equality verdict says the subtree is unchanged,
//! 5. mounts the set-aside siblings back in front of their anchors.
//!
//! Equality verdicts are taken before the level is mutated. A skipped subtree
//! keeps its live interaction state ([`NodeFlags`](crate::NodeFlags)).
//!
//! The depth limit is checked against the whole target tree before the live
//! tree is touched, so a target that is too deep fails without edits.
//!
//! Two policies ship with the crate: [`GraphicsPolicy`] tracks groups and
//! canvas pages that carry an identity; [`OutlinePolicy`] tracks any node
//! with an identity.

use std::ops::AddAssign;

use livetree_core::{EditOp, Identity, IdentityModel, ReconcileError, interpret, to_edit_ops};

use crate::node::{NodeKind, TargetNode};
use crate::tree::{LiveNode, LiveTree, NodeId};

/// Recursion limit used when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Whether any node below `root` sits deeper than `limit`. The root is level 0.
fn exceeds_depth(root: &TargetNode, limit: usize) -> bool {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, level)) = stack.pop() {
        if level > limit {
            return true;
        }
        stack.extend(node.children.iter().map(|child| (child, level + 1)));
    }
    false
}

/// Decides which siblings take part in identity matching.
pub trait MatchPolicy {
    /// Short name for logs.
    const NAME: &'static str;

    fn matches_live(&self, node: &LiveNode) -> bool;

    fn matches_target(&self, node: &TargetNode) -> bool;
}

/// Tracks identified groups and canvas pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsPolicy;

impl GraphicsPolicy {
    const fn tracks(kind: NodeKind) -> bool {
        matches!(kind, NodeKind::Group | NodeKind::Canvas | NodeKind::CanvasStub)
    }
}

impl MatchPolicy for GraphicsPolicy {
    const NAME: &'static str = "graphics";

    fn matches_live(&self, node: &LiveNode) -> bool {
        node.identity.is_some() && Self::tracks(node.kind)
    }

    fn matches_target(&self, node: &TargetNode) -> bool {
        node.identity.is_some() && Self::tracks(node.kind)
    }
}

/// Tracks every identified node.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlinePolicy;

impl MatchPolicy for OutlinePolicy {
    const NAME: &'static str = "outline";

    fn matches_live(&self, node: &LiveNode) -> bool {
        node.identity.is_some()
    }

    fn matches_target(&self, node: &TargetNode) -> bool {
        node.identity.is_some()
    }
}

/// Whether kept subtrees may be skipped when judged unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PatchMode {
    #[default]
    Incremental,
    /// Recurse into every kept node. Used for full renders.
    Deep,
}

impl PatchMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Deep => "deep",
        }
    }
}

/// What a patch did to the live tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Subtrees mounted by `Insert`.
    pub inserted: usize,
    /// Subtrees removed, untracked siblings included.
    pub removed: usize,
    /// Kept nodes relocated by `SwapIn`.
    pub moved: usize,
    /// Kept nodes brought up to date and recursed into.
    pub patched: usize,
    /// Kept nodes whose subtree was left alone.
    pub skipped: usize,
    /// Untracked target siblings mounted.
    pub regrafted: usize,
    pub attrs_changed: usize,
    /// Sibling levels reconciled.
    pub levels: usize,
}

impl PatchReport {
    /// No structural edit and no attribute change.
    pub const fn is_noop(&self) -> bool {
        self.inserted + self.removed + self.moved + self.regrafted + self.attrs_changed == 0
    }
}

impl AddAssign for PatchReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.removed += rhs.removed;
        self.moved += rhs.moved;
        self.patched += rhs.patched;
        self.skipped += rhs.skipped;
        self.regrafted += rhs.regrafted;
        self.attrs_changed += rhs.attrs_changed;
        self.levels += rhs.levels;
    }
}

/// Identity model over one live sibling level.
struct LevelModel<'a, P> {
    tree: &'a LiveTree,
    policy: &'a P,
}

impl<'t, P: MatchPolicy> IdentityModel<NodeId, &'t TargetNode> for LevelModel<'_, P> {
    type Key = Identity;

    fn origin_identity(&self, origin: &NodeId) -> Option<Identity> {
        self.tree.get(*origin)?.identity.clone()
    }

    fn reuse_request(&self, target: &&'t TargetNode) -> Option<Identity> {
        target.reuse_from.clone()
    }

    fn is_matchable_origin(&self, origin: &NodeId) -> bool {
        self.tree
            .get(*origin)
            .is_some_and(|node| self.policy.matches_live(node))
    }

    fn is_matchable_target(&self, target: &&'t TargetNode) -> bool {
        self.policy.matches_target(target)
    }

    fn structurally_equal(&self, origin: &NodeId, target: &&'t TargetNode) -> bool {
        self.tree
            .get(*origin)
            .is_some_and(|node| unchanged(node, target))
    }
}

/// Same kind, same identity, same attributes, and matching fingerprints.
///
/// A node without a fingerprint is never judged unchanged. The producer's
/// fingerprint must cover the whole subtree.
fn unchanged(node: &LiveNode, target: &TargetNode) -> bool {
    let same_content = matches!(
        (node.fingerprint, target.fingerprint),
        (Some(live), Some(next)) if live == next
    );
    same_content
        && node.kind.accepts(target.kind)
        && node.identity == target.identity
        && node.attrs == target.attrs
}

/// Depth-first reconciliation driver, generic over a [`MatchPolicy`].
#[derive(Debug, Clone)]
pub struct Patcher<P> {
    policy: P,
    mode: PatchMode,
    max_depth: usize,
}

/// Driver for the page graphics tree.
pub type GraphicsPatcher = Patcher<GraphicsPolicy>;

/// Driver for the document outline tree.
pub type OutlinePatcher = Patcher<OutlinePolicy>;

impl Patcher<GraphicsPolicy> {
    pub fn graphics() -> Self {
        Self::new(GraphicsPolicy)
    }
}

impl Patcher<OutlinePolicy> {
    pub fn outline() -> Self {
        Self::new(OutlinePolicy)
    }
}

impl<P: MatchPolicy> Patcher<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            mode: PatchMode::Incremental,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PatchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn set_mode(&mut self, mode: PatchMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PatchMode {
        self.mode
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Fails with [`ReconcileError::DepthLimit`] if `target_root` has nodes
    /// deeper than the configured limit.
    pub fn check_depth(&self, target_root: &TargetNode) -> Result<(), ReconcileError> {
        if exceeds_depth(target_root, self.max_depth) {
            return Err(ReconcileError::DepthLimit {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// Patch the subtree at `live_root` towards `target_root`.
    ///
    /// The roots are paired by position, not identity. A target deeper than
    /// the limit is rejected before any edit, first render included.
    pub fn patch(
        &self,
        tree: &mut LiveTree,
        live_root: NodeId,
        target_root: &TargetNode,
    ) -> Result<PatchReport, ReconcileError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "patch",
            policy = P::NAME,
            mode = self.mode.as_str(),
            target_nodes = target_root.subtree_len()
        )
        .entered();

        self.check_depth(target_root)?;
        let mut report = PatchReport::default();
        let root = tree.get(live_root).ok_or(ReconcileError::StaleNode)?;
        if self.mode == PatchMode::Incremental && unchanged(root, target_root) {
            report.skipped += 1;
            return Ok(report);
        }
        report.attrs_changed += tree.adopt(live_root, target_root)?.total();
        report.patched += 1;
        self.reconcile_children(tree, live_root, &target_root.children, 1, &mut report)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            inserted = report.inserted,
            removed = report.removed,
            moved = report.moved,
            skipped = report.skipped,
            "patch complete"
        );

        Ok(report)
    }

    fn reconcile_children(
        &self,
        tree: &mut LiveTree,
        parent: NodeId,
        targets: &[TargetNode],
        depth: usize,
        report: &mut PatchReport,
    ) -> Result<(), ReconcileError> {
        debug_assert!(depth <= self.max_depth + 1, "target depth is checked up front");
        #[cfg(feature = "tracing")]
        let _span = tracing::trace_span!("patch.level", depth, targets = targets.len()).entered();
        report.levels += 1;

        // Untracked live siblings never survive a level.
        let untracked: Vec<NodeId> = tree
            .children(parent)
            .iter()
            .copied()
            .filter(|&id| tree.get(id).is_some_and(|n| !self.policy.matches_live(n)))
            .collect();
        for id in untracked {
            tree.remove_node(id)?;
            report.removed += 1;
        }

        // Untracked target runs, keyed by the tracked sibling that follows.
        let mut tracked: Vec<&TargetNode> = Vec::with_capacity(targets.len());
        let mut runs: Vec<Vec<&TargetNode>> = Vec::new();
        let mut pending: Vec<&TargetNode> = Vec::new();
        for target in targets {
            if self.policy.matches_target(target) {
                runs.push(std::mem::take(&mut pending));
                tracked.push(target);
            } else {
                pending.push(target);
            }
        }
        let trailing = pending;

        let origin: Vec<NodeId> = tree.children(parent).to_vec();
        let (interpretation, ops, verdicts) = {
            let model = LevelModel {
                tree: &*tree,
                policy: &self.policy,
            };
            let interpretation = interpret(&origin, &tracked, &model);
            let ops = to_edit_ops(origin.len(), &interpretation.instructions)?;
            let verdicts: Vec<bool> = interpretation
                .patch_pairs
                .iter()
                .map(|pair| {
                    self.mode == PatchMode::Incremental
                        && model.structurally_equal(&origin[pair.origin], &tracked[pair.target])
                })
                .collect();
            (interpretation, ops, verdicts)
        };

        tree.apply_edits(parent, &ops, |index| tracked[index])?;
        for op in &ops {
            match op {
                EditOp::Insert { .. } => report.inserted += 1,
                EditOp::RemoveAt(_) => report.removed += 1,
                EditOp::SwapIn { .. } => report.moved += 1,
            }
        }

        for (pair, same) in interpretation.patch_pairs.iter().zip(verdicts) {
            if same {
                report.skipped += 1;
                continue;
            }
            let id = origin[pair.origin];
            let target = tracked[pair.target];
            report.attrs_changed += tree.adopt(id, target)?.total();
            report.patched += 1;
            self.reconcile_children(tree, id, &target.children, depth + 1, report)?;
        }

        for target in trailing {
            let end = tree.children(parent).len();
            tree.mount(parent, end, target)?;
            report.regrafted += 1;
        }
        // Reverse anchor order keeps earlier anchor positions valid.
        for (anchor, run) in runs.iter().enumerate().rev() {
            for (offset, target) in run.iter().enumerate() {
                tree.mount(parent, anchor + offset, target)?;
                report.regrafted += 1;
            }
        }

        Ok(())
    }
}
