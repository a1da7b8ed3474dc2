//! Filepath: src/traverse.rs
//!
//! Generic head-to-base chain walk.
//!
//! [`traverse`] is a small state machine over [`NodeKind`]. Non-terminal
//! kinds dispatch to the matching [`ChainHandler`] callback and move to the
//! predecessor unless the callback returned [`Step::Finished`]. Base nodes
//! are terminal. Merge deltas are terminal too, but fork:
//!
//! ```text
//!   [merge] --next--> local chain ...  -> [base L]
//!      \
//!       sibling_head -> sibling chain ... -> [base S]
//!
//!   merge_enter -> traverse(local) -> merge_between -> traverse(sibling) -> merge_exit
//! ```
//!
//! The two-branch recursion lives here; handlers only supply the
//! enter/between/exit hooks and pick which branches to visit via
//! [`MergeStep`].
//!
//! Every callback has a default that fails with
//! [`TraverseError::Unhandled`], so a handler that does not expect a kind
//! stops the walk instead of silently skipping it.

use crate::error::TraverseError;
use crate::node::{
    BaseNode, InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, NodeBody, NodeKind,
    NodeRef, RemoveDelta, SplitDelta,
};
use crate::table::NodeId;
use crate::tracing_helpers::error_log;

/// What to do after a non-terminal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move on to the predecessor.
    Continue,
    /// Stop this branch here.
    Finished,
}

/// Which branches of a merge delta to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    /// Local chain, then the absorbed sibling chain.
    Both,
    /// Only the local chain (keys below the merge key).
    Local,
    /// Only the sibling chain (keys at or above the merge key).
    Sibling,
    /// Neither.
    Stop,
}

/// Callbacks invoked by [`traverse`], one per node kind.
///
/// `'a` is the lifetime of the chain being walked; payload references handed
/// to the callbacks live that long, so handlers can collect them.
///
/// Role-agnostic kinds (split, merge, remove) receive the node so the
/// handler can check [`role`](crate::node::Node::role) if it cares.
#[allow(unused_variables)]
pub trait ChainHandler<'a, K, V> {
    /// Leaf base reached.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn leaf_base(
        &mut self,
        node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, V>,
    ) -> Result<(), TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::LeafBase))
    }

    /// Inner base reached.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn inner_base(
        &mut self,
        node: NodeRef<'a, K, V>,
        base: &'a BaseNode<K, NodeId>,
    ) -> Result<(), TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::InnerBase))
    }

    /// Leaf insert delta.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn leaf_insert(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::LeafInsert))
    }

    /// Leaf delete delta.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn leaf_delete(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::LeafDelete))
    }

    /// Inner insert delta.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn inner_insert(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a InnerInsertDelta<K>,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::InnerInsert))
    }

    /// Inner delete delta.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn inner_delete(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a InnerDeleteDelta<K>,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(NodeKind::InnerDelete))
    }

    /// Split delta of either role.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn split(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a SplitDelta<K>,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(node.kind()))
    }

    /// Remove delta of either role.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn remove(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a RemoveDelta,
    ) -> Result<Step, TraverseError> {
        Err(TraverseError::Unhandled(node.kind()))
    }

    /// Merge delta reached, before either branch.
    ///
    /// # Errors
    /// [`TraverseError::Unhandled`] unless overridden.
    fn merge_enter(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a MergeDelta<K, V>,
    ) -> Result<MergeStep, TraverseError> {
        Err(TraverseError::Unhandled(node.kind()))
    }

    /// Local branch done, sibling branch next (only for [`MergeStep::Both`]).
    ///
    /// # Errors
    /// Handler-defined; the default does nothing.
    fn merge_between(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a MergeDelta<K, V>,
    ) -> Result<(), TraverseError> {
        Ok(())
    }

    /// All selected branches done.
    ///
    /// # Errors
    /// Handler-defined; the default does nothing.
    fn merge_exit(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a MergeDelta<K, V>,
    ) -> Result<(), TraverseError> {
        Ok(())
    }
}

/// Walk the chain starting at `head`, dispatching every node to `handler`.
///
/// Branch pointers are read before the node is dispatched, so a handler
/// never makes the walk re-read a node it has already seen.
///
/// # Errors
/// - Whatever a callback returns, unchanged
/// - [`TraverseError::BrokenChain`] if a delta has no predecessor
pub fn traverse<'a, K, V, H>(head: NodeRef<'a, K, V>, handler: &mut H) -> Result<(), TraverseError>
where
    H: ChainHandler<'a, K, V> + ?Sized,
{
    let mut current: NodeRef<'a, K, V> = head;

    loop {
        let node = current.get();
        let next: Option<NodeRef<'a, K, V>> = node.next_ref();

        let step: Step = match node.body() {
            NodeBody::LeafBase(base) => return handler.leaf_base(current, base),
            NodeBody::InnerBase(base) => return handler.inner_base(current, base),
            NodeBody::LeafMerge(merge) | NodeBody::InnerMerge(merge) => {
                return walk_merge(current, next, merge, handler);
            }
            NodeBody::LeafInsert(delta) => handler.leaf_insert(current, delta)?,
            NodeBody::LeafDelete(delta) => handler.leaf_delete(current, delta)?,
            NodeBody::InnerInsert(delta) => handler.inner_insert(current, delta)?,
            NodeBody::InnerDelete(delta) => handler.inner_delete(current, delta)?,
            NodeBody::LeafSplit(delta) | NodeBody::InnerSplit(delta) => {
                handler.split(current, delta)?
            }
            NodeBody::LeafRemove(delta) | NodeBody::InnerRemove(delta) => {
                handler.remove(current, delta)?
            }
        };

        if step == Step::Finished {
            return Ok(());
        }

        current = require_next(current, next)?;
    }
}

fn walk_merge<'a, K, V, H>(
    node: NodeRef<'a, K, V>,
    next: Option<NodeRef<'a, K, V>>,
    merge: &'a MergeDelta<K, V>,
    handler: &mut H,
) -> Result<(), TraverseError>
where
    H: ChainHandler<'a, K, V> + ?Sized,
{
    let local: NodeRef<'a, K, V> = require_next(node, next)?;
    let sibling: NodeRef<'a, K, V> = merge.sibling_ref();

    match handler.merge_enter(node, merge)? {
        MergeStep::Both => {
            traverse(local, handler)?;
            handler.merge_between(node, merge)?;
            traverse(sibling, handler)?;
        }
        MergeStep::Local => traverse(local, handler)?,
        MergeStep::Sibling => traverse(sibling, handler)?,
        MergeStep::Stop => {}
    }

    handler.merge_exit(node, merge)
}

fn require_next<'a, K, V>(
    node: NodeRef<'a, K, V>,
    next: Option<NodeRef<'a, K, V>>,
) -> Result<NodeRef<'a, K, V>, TraverseError> {
    next.ok_or_else(|| {
        error_log!(kind = %node.kind(), "delta without predecessor");
        TraverseError::BrokenChain(node.kind())
    })
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;

    use super::*;
    use crate::append::AppendHelper;
    use crate::bound::BoundKey;
    use crate::free::free_chain;
    use crate::node::Node;
    use crate::table::MappingTable;

    type Table = MappingTable<Node<u64, u64>, 16>;

    /// Records every visited kind, in order.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<NodeKind>,
        stop_at_split: bool,
        merge_step: Option<MergeStep>,
    }

    impl<'a> ChainHandler<'a, u64, u64> for Recorder {
        fn leaf_base(
            &mut self,
            node: NodeRef<'a, u64, u64>,
            _base: &'a BaseNode<u64, u64>,
        ) -> Result<(), TraverseError> {
            self.seen.push(node.kind());
            Ok(())
        }

        fn leaf_insert(
            &mut self,
            node: NodeRef<'a, u64, u64>,
            _delta: &'a LeafEntryDelta<u64, u64>,
        ) -> Result<Step, TraverseError> {
            self.seen.push(node.kind());
            Ok(Step::Continue)
        }

        fn leaf_delete(
            &mut self,
            node: NodeRef<'a, u64, u64>,
            _delta: &'a LeafEntryDelta<u64, u64>,
        ) -> Result<Step, TraverseError> {
            self.seen.push(node.kind());
            Ok(Step::Continue)
        }

        fn split(
            &mut self,
            node: NodeRef<'a, u64, u64>,
            _delta: &'a SplitDelta<u64>,
        ) -> Result<Step, TraverseError> {
            self.seen.push(node.kind());
            Ok(if self.stop_at_split {
                Step::Finished
            } else {
                Step::Continue
            })
        }

        fn merge_enter(
            &mut self,
            node: NodeRef<'a, u64, u64>,
            _delta: &'a MergeDelta<u64, u64>,
        ) -> Result<MergeStep, TraverseError> {
            self.seen.push(node.kind());
            Ok(self.merge_step.unwrap_or(MergeStep::Both))
        }

        fn merge_between(
            &mut self,
            _node: NodeRef<'a, u64, u64>,
            _delta: &'a MergeDelta<u64, u64>,
        ) -> Result<(), TraverseError> {
            self.seen.push(NodeKind::InnerMerge);
            Ok(())
        }
    }

    fn leaf(table: &Table, low: u64, high: u64) -> NodeId {
        let base = Node::leaf_base(BoundKey::finite(low), BoundKey::finite(high), vec![(low, 0)])
            .unwrap();
        table.allocate(base.as_ptr()).unwrap()
    }

    fn head(table: &Table, id: NodeId) -> NodeRef<'_, u64, u64> {
        unsafe { NodeRef::from_raw(NonNull::new(table.get(id).unwrap()).unwrap()) }
    }

    #[test]
    fn test_linear_chain_order() {
        let table = Table::new();
        let id = leaf(&table, 0, 100);
        let sibling = leaf(&table, 80, 100);
        let guard = table.guard();

        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();
        assert!(helper.append_leaf_split(80, sibling).unwrap().is_installed());
        assert!(helper.append_leaf_delete(10, 0).unwrap().is_installed());
        assert!(helper.append_leaf_insert(10, 1).unwrap().is_installed());

        let mut recorder = Recorder::default();
        traverse(head(&table, id), &mut recorder).unwrap();
        assert_eq!(
            recorder.seen,
            [
                NodeKind::LeafInsert,
                NodeKind::LeafDelete,
                NodeKind::LeafSplit,
                NodeKind::LeafBase
            ]
        );

        let mut recorder = Recorder {
            stop_at_split: true,
            ..Recorder::default()
        };
        traverse(head(&table, id), &mut recorder).unwrap();
        assert_eq!(recorder.seen.last(), Some(&NodeKind::LeafSplit));

        unsafe {
            free_chain(&table, head(&table, id).as_ptr()).unwrap();
            free_chain(&table, head(&table, sibling).as_ptr()).unwrap();
        }
    }

    #[test]
    fn test_merge_visits_both_branches() {
        let table = Table::new();
        let left = leaf(&table, 0, 50);
        let right = leaf(&table, 50, 100);
        let guard = table.guard();

        let mut right_helper = AppendHelper::load(&table, right, &guard).unwrap();
        assert!(right_helper.append_leaf_insert(60, 6).unwrap().is_installed());

        let mut helper = AppendHelper::load(&table, left, &guard).unwrap();
        let outcome = helper
            .append_leaf_merge(50, right, right_helper.head_ref())
            .unwrap();
        assert!(outcome.is_installed());

        let mut recorder = Recorder::default();
        traverse(head(&table, left), &mut recorder).unwrap();
        assert_eq!(
            recorder.seen,
            [
                NodeKind::LeafMerge,
                NodeKind::LeafBase,
                NodeKind::InnerMerge, // between marker
                NodeKind::LeafInsert,
                NodeKind::LeafBase
            ]
        );

        let mut recorder = Recorder {
            merge_step: Some(MergeStep::Sibling),
            ..Recorder::default()
        };
        traverse(head(&table, left), &mut recorder).unwrap();
        assert_eq!(
            recorder.seen,
            [NodeKind::LeafMerge, NodeKind::LeafInsert, NodeKind::LeafBase]
        );

        unsafe { free_chain(&table, head(&table, left).as_ptr()).unwrap() };
    }

    #[test]
    fn test_unhandled_kind_fails() {
        let table = Table::new();
        let id = leaf(&table, 0, 100);
        let guard = table.guard();

        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();
        assert!(helper.append_leaf_remove(id).unwrap().is_installed());

        let mut recorder = Recorder::default();
        assert_eq!(
            traverse(head(&table, id), &mut recorder),
            Err(TraverseError::Unhandled(NodeKind::LeafRemove))
        );
        assert!(recorder.seen.is_empty());

        unsafe { free_chain(&table, head(&table, id).as_ptr()).unwrap() };
    }
}
