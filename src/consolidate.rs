//! Filepath: src/consolidate.rs
//!
//! Consolidation: replay a delta chain into one fresh base node.
//!
//! The walk goes head to base, i.e. newest edit first. For every key the
//! *first* insert or delete observed wins; older edits of the same key are
//! ignored. Split deltas narrow the effective high bound: anything observed
//! later in the walk (older) at or above the tightest split key belongs to
//! the sibling and is dropped.
//!
//! ```text
//!  [insert 7] -> [delete 3] -> [split 50] -> [insert 60] -> [base 1 3 5 55]
//!   decide 7      decide 3     bound=50       60 >= 50        emit 1 5
//!                                             dropped         (3 decided,
//!                                                              55 >= 50)
//!  result: 1 5 7
//! ```
//!
//! # Merge
//!
//! A merge delta forks the walk. Decisions and the split bound taken inside
//! the local branch must not leak into the sibling branch, so the state is
//! snapshotted at [`merge_enter`](ChainHandler::merge_enter) and rewound at
//! `merge_between` and `merge_exit`. Rewinding moves inserts decided inside
//! the branch into the output, then forgets those decisions.
//!
//! Inner chains replay the same way, with child ids as payload. The dummy
//! first key of the leftmost inner base is always kept and takes the chain's
//! low bound. A merged sibling's base contributes its first child under the
//! merge key, which newer inserts and deletes of that key override like any
//! other entry.
//!
//! # Remove
//!
//! A remove delta inside the sibling branch of a merge belongs to the
//! absorbed node and is skipped. A remove on the chain's own spine means the
//! node is gone, so consolidation fails with [`NodeError::Removed`]; the
//! parent's content is what survives.

use std::collections::BTreeMap;

use crate::error::{NodeError, TraverseError};
use crate::node::{
    BaseNode, InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, Node, NodeRef,
    NodeRole, RemoveDelta, SplitDelta, UnlinkedNode,
};
use crate::table::NodeId;
use crate::traverse::{ChainHandler, MergeStep, Step, traverse};
use crate::tracing_helpers::debug_log;

// ============================================================================
//  Replay
// ============================================================================

/// Replay state for one role. `P` is `&V` for leaves, [`NodeId`] for inner
/// nodes.
struct Replay<'a, K, P> {
    /// First observation per key: `Some` insert, `None` delete.
    decided: BTreeMap<&'a K, Option<P>>,
    /// Keys in the order they were decided, for merge rewinds.
    journal: Vec<&'a K>,
    /// Entries already known to survive.
    output: Vec<(&'a K, P)>,
    /// Tightest split key seen on the current branch.
    bound: Option<&'a K>,
}

struct Snapshot<'a, K> {
    journal_len: usize,
    bound: Option<&'a K>,
}

impl<'a, K: Ord, P> Replay<'a, K, P> {
    const fn new() -> Self {
        Self {
            decided: BTreeMap::new(),
            journal: Vec::new(),
            output: Vec::new(),
            bound: None,
        }
    }

    fn admits(&self, key: &K) -> bool {
        self.bound.is_none_or(|bound| key < bound)
    }

    fn observe(&mut self, key: &'a K, payload: Option<P>) {
        if !self.admits(key) || self.decided.contains_key(key) {
            return;
        }
        self.decided.insert(key, payload);
        self.journal.push(key);
    }

    fn narrow(&mut self, split_key: &'a K) {
        if self.admits(split_key) {
            self.bound = Some(split_key);
        }
    }

    fn emit_base(&mut self, key: &'a K, payload: P) {
        if self.admits(key) && !self.decided.contains_key(key) {
            self.output.push((key, payload));
        }
    }

    fn snapshot(&self) -> Snapshot<'a, K> {
        Snapshot {
            journal_len: self.journal.len(),
            bound: self.bound,
        }
    }

    fn rewind(&mut self, snapshot: &Snapshot<'a, K>) {
        for key in self.journal.drain(snapshot.journal_len..) {
            if let Some(Some(payload)) = self.decided.remove(key) {
                self.output.push((key, payload));
            }
        }
        self.bound = snapshot.bound;
    }

    fn finish(mut self) -> Vec<(&'a K, P)> {
        self.rewind(&Snapshot {
            journal_len: 0,
            bound: None,
        });
        self.output.sort_by(|a, b| a.0.cmp(b.0));
        self.output
    }
}

// ============================================================================
//  Consolidator
// ============================================================================

/// Chain handler that collects the logical content of a chain.
///
/// Run it with [`traverse`] from the same head it was created with, then
/// call [`materialize`](Self::materialize). [`consolidate`] does both.
pub struct Consolidator<'a, K, V> {
    head: NodeRef<'a, K, V>,
    leaf: Replay<'a, K, &'a V>,
    inner: Replay<'a, K, NodeId>,
    /// Per open merge: both replay snapshots plus the enclosing `absorbed`.
    snapshots: Vec<(Snapshot<'a, K>, Snapshot<'a, K>, bool)>,
    /// Walking the sibling branch of some merge.
    absorbed: bool,
    /// The leftmost inner base has been replayed.
    leftmost_seen: bool,
}

impl<K, V> std::fmt::Debug for Consolidator<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consolidator")
            .field("head", &self.head)
            .field("leaf_decided", &self.leaf.decided.len())
            .field("inner_decided", &self.inner.decided.len())
            .finish_non_exhaustive()
    }
}

impl<'a, K: Ord + Clone, V: Clone> Consolidator<'a, K, V> {
    /// Prepare to consolidate the chain starting at `head`.
    #[must_use]
    pub const fn new(head: NodeRef<'a, K, V>) -> Self {
        Self {
            head,
            leaf: Replay::new(),
            inner: Replay::new(),
            snapshots: Vec::new(),
            absorbed: false,
            leftmost_seen: false,
        }
    }

    /// Build the new base node: same role and bounds as the head, height 0.
    ///
    /// # Errors
    /// Propagates base node construction errors, which indicate a chain that
    /// violates its own range invariants.
    pub fn materialize(self) -> Result<UnlinkedNode<K, V>, NodeError> {
        let head: &Node<K, V> = self.head.get();
        let low = head.low_key().clone();
        let high = head.high_key().clone();

        let ptr = match head.role() {
            NodeRole::Leaf => {
                let entries: Vec<(K, V)> = self
                    .leaf
                    .finish()
                    .into_iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Node::leaf_base(low, high, entries)?
            }
            NodeRole::Inner => {
                let entries: Vec<(K, NodeId)> = self
                    .inner
                    .finish()
                    .into_iter()
                    .map(|(key, child)| (key.clone(), child))
                    .collect();
                Node::inner_base(low, high, entries)?
            }
        };

        // SAFETY: freshly built and not published.
        let node: UnlinkedNode<K, V> = unsafe { UnlinkedNode::from_raw(ptr) };
        debug_log!(
            role = %node.get().role(),
            size = node.get().size(),
            old_height = head.height(),
            "chain consolidated"
        );
        Ok(node)
    }

    /// Undo the branch under the innermost merge; `pop` at merge exit.
    fn rewind(&mut self, pop: bool) {
        if let Some((leaf, inner, outer_absorbed)) = self.snapshots.last() {
            self.leaf.rewind(leaf);
            self.inner.rewind(inner);
            self.absorbed = if pop { *outer_absorbed } else { true };
        }
        if pop {
            self.snapshots.pop();
        }
    }
}

impl<'a, K: Ord + Clone, V: Clone> ChainHandler<'a, K, V> for Consolidator<'a, K, V> {
    fn leaf_base(
        &mut self,
        _node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, V>,
    ) -> Result<(), TraverseError> {
        for (key, value) in base.entries() {
            self.leaf.emit_base(key, value);
        }
        Ok(())
    }

    fn inner_base(
        &mut self,
        node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, NodeId>,
    ) -> Result<(), TraverseError> {
        let Some(((dummy, first_child), rest)) = base.entries().split_first() else {
            return Ok(());
        };

        let first_key: &'a K = node.get().low_key().key().unwrap_or(dummy);
        if self.leftmost_seen {
            self.inner.emit_base(first_key, *first_child);
        } else {
            // Local branches come first, so this is the chain's low end.
            self.leftmost_seen = true;
            self.inner.output.push((first_key, *first_child));
        }

        for (key, child) in rest {
            self.inner.emit_base(key, *child);
        }
        Ok(())
    }

    fn leaf_insert(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        self.leaf.observe(delta.key(), Some(delta.value()));
        Ok(Step::Continue)
    }

    fn leaf_delete(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        self.leaf.observe(delta.key(), None);
        Ok(Step::Continue)
    }

    fn inner_insert(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a InnerInsertDelta<K>,
    ) -> Result<Step, TraverseError> {
        self.inner.observe(delta.key(), Some(delta.child()));
        Ok(Step::Continue)
    }

    fn inner_delete(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a InnerDeleteDelta<K>,
    ) -> Result<Step, TraverseError> {
        self.inner.observe(delta.key(), None);
        Ok(Step::Continue)
    }

    fn split(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a SplitDelta<K>,
    ) -> Result<Step, TraverseError> {
        match node.role() {
            NodeRole::Leaf => self.leaf.narrow(delta.split_key()),
            NodeRole::Inner => self.inner.narrow(delta.split_key()),
        }
        Ok(Step::Continue)
    }

    fn remove(
        &mut self,
        _node: NodeRef<'a, K, V>,
        delta: &'a RemoveDelta,
    ) -> Result<Step, TraverseError> {
        if self.absorbed {
            return Ok(Step::Continue);
        }
        Err(NodeError::Removed(delta.removed_id()).into())
    }

    fn merge_enter(
        &mut self,
        _node: NodeRef<'a, K, V>,
        _delta: &'a MergeDelta<K, V>,
    ) -> Result<MergeStep, TraverseError> {
        self.snapshots
            .push((self.leaf.snapshot(), self.inner.snapshot(), self.absorbed));
        Ok(MergeStep::Both)
    }

    fn merge_between(
        &mut self,
        _node: NodeRef<'a, K, V>,
        _delta: &'a MergeDelta<K, V>,
    ) -> Result<(), TraverseError> {
        self.rewind(false);
        Ok(())
    }

    fn merge_exit(
        &mut self,
        _node: NodeRef<'a, K, V>,
        _delta: &'a MergeDelta<K, V>,
    ) -> Result<(), TraverseError> {
        self.rewind(true);
        Ok(())
    }
}

/// Consolidate the chain at `head` into a fresh, unpublished base node.
///
/// Install the result with [`AppendHelper::replace`](crate::append::AppendHelper::replace).
///
/// # Errors
/// - [`TraverseError::Unhandled`] never, the consolidator accepts every kind
/// - [`TraverseError::Node`] with [`NodeError::Removed`] if the chain itself
///   was removed
/// - [`TraverseError::Node`] if the replayed entries do not form a valid
///   base node
pub fn consolidate<K: Ord + Clone, V: Clone>(
    head: NodeRef<'_, K, V>,
) -> Result<UnlinkedNode<K, V>, TraverseError> {
    let mut consolidator = Consolidator::new(head);
    traverse(head, &mut consolidator)?;
    Ok(consolidator.materialize()?)
}

// ============================================================================
//  Tests
// ============================================================================
