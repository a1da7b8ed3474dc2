//! Filepath: src/append.rs
//!
//! Write path: build a delta on the cached chain head and CAS it in.
//!
//! An [`AppendHelper`] caches `(node_id, head)` for one mapping table slot.
//! Each `append_*` method:
//!
//! 1. checks the chain role and, where a key is involved, that the key lies
//!    in the head's `[low, high)` range
//! 2. allocates the delta from the owning base node's allocator, with
//!    `height = head.height + 1` and the size adjusted per kind
//! 3. tries `compare_and_swap(node_id, head, delta)`
//!
//! A won CAS advances the cached head. A lost CAS is not an error: the delta
//! comes back as [`AppendOutcome::Conflict`] carrying an [`UnlinkedNode`]
//! that frees itself when dropped. The helper never retries on its own;
//! callers [`refresh`](AppendHelper::refresh) and decide.
//!
//! # Reclamation
//!
//! [`AppendHelper::load`] borrows a [`LocalGuard`] for the helper's
//! lifetime, so every head it observes stays valid while chains are retired
//! through [`crate::reclaim::retire_chain`].

use std::ptr::NonNull;

use seize::LocalGuard;

use crate::bound::BoundKey;
use crate::error::NodeError;
use crate::node::{
    InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, Node, NodeBody, NodeRef,
    NodeRole, RemoveDelta, SplitDelta, UnlinkedNode,
};
use crate::table::{DEFAULT_TABLE_CAPACITY, MappingTable, NodeId};
use crate::tracing_helpers::{debug_log, trace_log};

// ============================================================================
//  Outcomes
// ============================================================================

/// Result of a successful append attempt.
#[derive(Debug)]
#[must_use = "a conflicting delta must be retried or dropped"]
pub enum AppendOutcome<K, V> {
    /// The delta is the new chain head.
    Installed,
    /// Another writer moved the head first; the delta was not published.
    Conflict(UnlinkedNode<K, V>),
}

impl<K, V> AppendOutcome<K, V> {
    /// Whether the delta was installed.
    #[inline]
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }

    /// The rejected delta, if the CAS lost.
    #[must_use]
    pub fn into_conflict(self) -> Option<UnlinkedNode<K, V>> {
        match self {
            Self::Installed => None,
            Self::Conflict(delta) => Some(delta),
        }
    }
}

/// Result of a successful [`AppendHelper::replace`] attempt.
#[derive(Debug)]
#[must_use = "a replaced chain must be reclaimed"]
pub enum ReplaceOutcome<K, V> {
    /// The new node is the chain head; `old_head` is now unreachable from the
    /// table and must be freed or retired by the caller.
    Installed {
        /// Head of the chain that was replaced.
        old_head: NonNull<Node<K, V>>,
    },
    /// Another writer moved the head first.
    Conflict(UnlinkedNode<K, V>),
}

// ============================================================================
//  AppendHelper
// ============================================================================

/// Cached view of one mapping table slot for appending deltas.
///
/// # Type Parameters
/// * `K` - Key type
/// * `V` - Leaf value type
/// * `CAPACITY` - Mapping table capacity
pub struct AppendHelper<'g, K, V, const CAPACITY: usize = DEFAULT_TABLE_CAPACITY> {
    node_id: NodeId,
    head: NonNull<Node<K, V>>,
    table: &'g MappingTable<Node<K, V>, CAPACITY>,
}

impl<K, V, const CAPACITY: usize> std::fmt::Debug for AppendHelper<'_, K, V, CAPACITY> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendHelper")
            .field("node_id", &self.node_id)
            .field("head", self.head_ref().get())
            .finish_non_exhaustive()
    }
}

impl<'g, K, V, const CAPACITY: usize> AppendHelper<'g, K, V, CAPACITY> {
    /// Create a helper over an already loaded head.
    ///
    /// # Safety
    /// `head` must be a live chain node that stays valid for `'g`, normally
    /// because it was loaded under a guard that outlives the helper.
    #[must_use]
    pub const unsafe fn new(
        node_id: NodeId,
        head: NonNull<Node<K, V>>,
        table: &'g MappingTable<Node<K, V>, CAPACITY>,
    ) -> Self {
        Self {
            node_id,
            head,
            table,
        }
    }

    /// Load the current head of `node_id` under `guard`.
    ///
    /// # Errors
    /// - [`NodeError::Released`] if the id resolves to no chain
    /// - [`NodeError::Table`] if the id does not index a slot
    pub fn load(
        table: &'g MappingTable<Node<K, V>, CAPACITY>,
        node_id: NodeId,
        _guard: &'g LocalGuard<'_>,
    ) -> Result<Self, NodeError> {
        let head: NonNull<Node<K, V>> =
            NonNull::new(table.get(node_id)?).ok_or(NodeError::Released(node_id))?;

        Ok(Self {
            node_id,
            head,
            table,
        })
    }

    /// The slot this helper appends to.
    #[inline]
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The cached chain head.
    #[inline]
    #[must_use]
    pub const fn head_ref(&self) -> NodeRef<'g, K, V> {
        // SAFETY: the head was valid for 'g when cached (new/load contract).
        unsafe { NodeRef::from_raw(self.head) }
    }

    /// Re-read the slot after a conflict.
    ///
    /// # Errors
    /// [`NodeError::Released`] if the node was unlinked meanwhile.
    pub fn refresh(&mut self) -> Result<(), NodeError> {
        let current: *mut Node<K, V> = self.table.get(self.node_id)?;
        self.head = NonNull::new(current).ok_or(NodeError::Released(self.node_id))?;
        trace_log!(node_id = self.node_id, "append helper refreshed");
        Ok(())
    }

    /// Install `replacement` (typically a consolidated base node) in place of
    /// the whole cached chain.
    ///
    /// # Errors
    /// [`NodeError::Table`] if the id does not index a slot; `replacement` is
    /// dropped.
    pub fn replace(
        &mut self,
        replacement: UnlinkedNode<K, V>,
    ) -> Result<ReplaceOutcome<K, V>, NodeError> {
        let old_head: NonNull<Node<K, V>> = self.head;

        if !self
            .table
            .compare_and_swap(self.node_id, old_head.as_ptr(), replacement.as_ptr().as_ptr())?
        {
            return Ok(ReplaceOutcome::Conflict(replacement));
        }

        self.head = replacement.into_raw();
        debug_log!(node_id = self.node_id, "chain replaced");
        Ok(ReplaceOutcome::Installed { old_head })
    }

    /// Publish a delta built on the cached head.
    fn install(
        &mut self,
        body: NodeBody<K, V>,
        height: u32,
        size: usize,
        high: Option<NonNull<BoundKey<K>>>,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let ptr: NonNull<Node<K, V>> = Node::alloc_delta(self.head, body, height, size, high);
        // SAFETY: freshly allocated and not yet published.
        let delta: UnlinkedNode<K, V> = unsafe { UnlinkedNode::from_raw(ptr) };

        if !self
            .table
            .compare_and_swap(self.node_id, self.head.as_ptr(), ptr.as_ptr())?
        {
            trace_log!(node_id = self.node_id, kind = %delta.get().kind(), "append conflict");
            return Ok(AppendOutcome::Conflict(delta));
        }

        self.head = delta.into_raw();
        debug_log!(node_id = self.node_id, height, size, "delta installed");
        Ok(AppendOutcome::Installed)
    }

    fn check_role(&self, expected: NodeRole) -> Result<&'g Node<K, V>, NodeError> {
        let head: &'g Node<K, V> = self.head_ref().get();
        let found: NodeRole = head.role();
        if found == expected {
            Ok(head)
        } else {
            Err(NodeError::RoleMismatch { expected, found })
        }
    }
}

impl<K: Ord, V, const CAPACITY: usize> AppendHelper<'_, K, V, CAPACITY> {
    fn check_key(&self, role: NodeRole, key: &K) -> Result<(u32, usize), NodeError> {
        let head: &Node<K, V> = self.check_role(role)?;
        if !head.key_in_range(key) {
            return Err(NodeError::KeyOutOfRange);
        }
        Ok((head.height() + 1, head.size()))
    }

    // ========================================================================
    //  Leaf deltas
    // ========================================================================

    /// Append a leaf insert of `(key, value)`.
    ///
    /// # Errors
    /// - [`NodeError::RoleMismatch`] on an inner chain
    /// - [`NodeError::KeyOutOfRange`] if `key` is outside the head's range
    pub fn append_leaf_insert(
        &mut self,
        key: K,
        value: V,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let (height, size) = self.check_key(NodeRole::Leaf, &key)?;
        let body = NodeBody::LeafInsert(LeafEntryDelta::new(key, value));
        self.install(body, height, size + 1, None)
    }

    /// Append a leaf delete of `key`; `value` is kept for diagnostics.
    ///
    /// # Errors
    /// See [`append_leaf_insert`](Self::append_leaf_insert).
    pub fn append_leaf_delete(
        &mut self,
        key: K,
        value: V,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let (height, size) = self.check_key(NodeRole::Leaf, &key)?;
        let body = NodeBody::LeafDelete(LeafEntryDelta::new(key, value));
        self.install(body, height, size.saturating_sub(1), None)
    }

    // ========================================================================
    //  Inner deltas
    // ========================================================================

    /// Append an inner insert: `[key, next_key)` routes to `child`.
    ///
    /// # Errors
    /// - [`NodeError::RoleMismatch`] on a leaf chain
    /// - [`NodeError::KeyOutOfRange`] if `key` is outside the head's range
    pub fn append_inner_insert(
        &mut self,
        key: K,
        child: NodeId,
        next_key: BoundKey<K>,
        next_id: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let (height, size) = self.check_key(NodeRole::Inner, &key)?;
        let body = NodeBody::InnerInsert(InnerInsertDelta::new(key, child, next_key, next_id));
        self.install(body, height, size + 1, None)
    }

    /// Append an inner delete of separator `key`; `[prev_key, next_key)`
    /// then routes to `prev_id`.
    ///
    /// # Errors
    /// See [`append_inner_insert`](Self::append_inner_insert).
    pub fn append_inner_delete(
        &mut self,
        key: K,
        child: NodeId,
        next: (BoundKey<K>, NodeId),
        prev: (BoundKey<K>, NodeId),
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let (height, size) = self.check_key(NodeRole::Inner, &key)?;
        let body = NodeBody::InnerDelete(InnerDeleteDelta::new(key, child, next, prev));
        self.install(body, height, size.saturating_sub(1), None)
    }

    // ========================================================================
    //  Structural deltas
    // ========================================================================

    /// Append a leaf split at `split_key`; keys `>= split_key` now live in
    /// `sibling`, which must already be published in the table.
    ///
    /// # Errors
    /// - [`NodeError::RoleMismatch`] / [`NodeError::KeyOutOfRange`]
    /// - [`NodeError::Released`] if `sibling` resolves to no chain
    /// - [`NodeError::InvalidSplit`] if the sibling is larger than this chain
    pub fn append_leaf_split(
        &mut self,
        split_key: K,
        sibling: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_split(NodeRole::Leaf, split_key, sibling)
    }

    /// Append an inner split. See [`append_leaf_split`](Self::append_leaf_split).
    ///
    /// # Errors
    /// See [`append_leaf_split`](Self::append_leaf_split).
    pub fn append_inner_split(
        &mut self,
        split_key: K,
        sibling: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_split(NodeRole::Inner, split_key, sibling)
    }

    fn append_split(
        &mut self,
        role: NodeRole,
        split_key: K,
        sibling: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let (height, node_size) = self.check_key(role, &split_key)?;

        // SAFETY: a published sibling stays valid while our guard is held.
        let sibling_head: &Node<K, V> = unsafe {
            NonNull::new(self.table.get(sibling)?)
                .ok_or(NodeError::Released(sibling))?
                .as_ref()
        };
        let sibling_size: usize = sibling_head.size();
        let size: usize = node_size
            .checked_sub(sibling_size)
            .ok_or(NodeError::InvalidSplit {
                node_size,
                sibling_size,
            })?;

        let split = SplitDelta::new(split_key, sibling);
        let body = match role {
            NodeRole::Leaf => NodeBody::LeafSplit(split),
            NodeRole::Inner => NodeBody::InnerSplit(split),
        };
        self.install(body, height, size, None)
    }

    /// Append a leaf merge absorbing the right sibling chain `sibling_head`.
    ///
    /// The new head's size is the sum of both sides, its high bound the
    /// sibling's, and its height `local + sibling + 1`.
    ///
    /// # Errors
    /// [`NodeError::RoleMismatch`] if either chain is not a leaf chain.
    pub fn append_leaf_merge(
        &mut self,
        merge_key: K,
        sibling: NodeId,
        sibling_head: NodeRef<'_, K, V>,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_merge(NodeRole::Leaf, merge_key, sibling, sibling_head)
    }

    /// Append an inner merge. See [`append_leaf_merge`](Self::append_leaf_merge).
    ///
    /// # Errors
    /// [`NodeError::RoleMismatch`] if either chain is not an inner chain.
    pub fn append_inner_merge(
        &mut self,
        merge_key: K,
        sibling: NodeId,
        sibling_head: NodeRef<'_, K, V>,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_merge(NodeRole::Inner, merge_key, sibling, sibling_head)
    }

    fn append_merge(
        &mut self,
        role: NodeRole,
        merge_key: K,
        sibling: NodeId,
        sibling_head: NodeRef<'_, K, V>,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let head: &Node<K, V> = self.check_role(role)?;
        if sibling_head.role() != role {
            return Err(NodeError::RoleMismatch {
                expected: role,
                found: sibling_head.role(),
            });
        }

        let height: u32 = head.height() + sibling_head.height() + 1;
        let size: usize = head.size() + sibling_head.size();
        let high: NonNull<BoundKey<K>> = NonNull::from(sibling_head.get().high_key());

        let merge = MergeDelta::new(merge_key, sibling, sibling_head.as_ptr());
        let body = match role {
            NodeRole::Leaf => NodeBody::LeafMerge(merge),
            NodeRole::Inner => NodeBody::InnerMerge(merge),
        };
        self.install(body, height, size, Some(high))
    }

    /// Append a leaf remove marking `removed` as logically deleted.
    ///
    /// # Errors
    /// [`NodeError::RoleMismatch`] on an inner chain.
    pub fn append_leaf_remove(
        &mut self,
        removed: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_remove(NodeRole::Leaf, removed)
    }

    /// Append an inner remove.
    ///
    /// # Errors
    /// [`NodeError::RoleMismatch`] on a leaf chain.
    pub fn append_inner_remove(
        &mut self,
        removed: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        self.append_remove(NodeRole::Inner, removed)
    }

    fn append_remove(
        &mut self,
        role: NodeRole,
        removed: NodeId,
    ) -> Result<AppendOutcome<K, V>, NodeError> {
        let head: &Node<K, V> = self.check_role(role)?;
        let (height, size) = (head.height() + 1, head.size());

        let body = match role {
            NodeRole::Leaf => NodeBody::LeafRemove(RemoveDelta::new(removed)),
            NodeRole::Inner => NodeBody::InnerRemove(RemoveDelta::new(removed)),
        };
        self.install(body, height, size, None)
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free::free_chain;
    use crate::node::NodeKind;

    type Table = MappingTable<Node<u64, u64>, 64>;

    fn publish_leaf(table: &Table, low: u64, high: u64) -> NodeId {
        let entries: Vec<(u64, u64)> = (low..high).step_by(10).map(|k| (k, k)).collect();
        let base = Node::leaf_base(BoundKey::finite(low), BoundKey::finite(high), entries).unwrap();
        table.allocate(base.as_ptr()).unwrap()
    }

    fn head(table: &Table, id: NodeId) -> NonNull<Node<u64, u64>> {
        NonNull::new(table.get(id).unwrap()).unwrap()
    }

    unsafe fn free(table: &Table, id: NodeId) {
        unsafe { free_chain(table, head(table, id)).unwrap() };
    }

    #[test]
    fn test_insert_and_delete_headers() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 100);
        let guard = table.guard();
        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();

        assert!(helper.append_leaf_insert(5, 50).unwrap().is_installed());
        let node = helper.head_ref();
        assert_eq!(node.kind(), NodeKind::LeafInsert);
        assert_eq!((node.height(), node.size()), (1, 11));
        assert_eq!(table.get(id).unwrap(), node.as_ptr().as_ptr());

        assert!(helper.append_leaf_delete(10, 10).unwrap().is_installed());
        let node = helper.head_ref();
        assert_eq!((node.height(), node.size()), (2, 10));
        assert_eq!(node.low_key(), &BoundKey::finite(0));

        unsafe { free(&table, id) };
    }

    #[test]
    fn test_key_and_role_checks() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 100);
        let guard = table.guard();
        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();

        assert_eq!(
            helper.append_leaf_insert(100, 0).unwrap_err(),
            NodeError::KeyOutOfRange
        );
        assert_eq!(
            helper
                .append_inner_insert(5, 1, BoundKey::Infinite, 2)
                .unwrap_err(),
            NodeError::RoleMismatch {
                expected: NodeRole::Inner,
                found: NodeRole::Leaf
            }
        );
        // Nothing was published.
        assert_eq!(helper.head_ref().height(), 0);

        unsafe { free(&table, id) };
    }

    #[test]
    fn test_conflict_returns_unlinked_delta() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 100);
        let guard = table.guard();

        let mut first = AppendHelper::load(&table, id, &guard).unwrap();
        let mut second = AppendHelper::load(&table, id, &guard).unwrap();

        assert!(first.append_leaf_insert(1, 1).unwrap().is_installed());

        let outcome = second.append_leaf_insert(2, 2).unwrap();
        let rejected = outcome.into_conflict().unwrap();
        assert_eq!(rejected.get().kind(), NodeKind::LeafInsert);

        // The base outlives the rejected delta; only the delta is freed on drop.
        let base = NonNull::from(rejected.get().owning_base());
        let live = || {
            // SAFETY: the base stays published in the table for the whole test.
            unsafe { base.as_ref() }.delta_allocator().unwrap().live()
        };
        assert_eq!(live(), 2);
        drop(rejected);
        assert_eq!(live(), 1);

        second.refresh().unwrap();
        assert!(second.append_leaf_insert(2, 2).unwrap().is_installed());
        assert_eq!(second.head_ref().size(), 12);

        unsafe { free(&table, id) };
    }

    #[test]
    fn test_split_narrows_chain() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 100);
        let guard = table.guard();

        let right = unsafe { head(&table, id).as_ref() }.split_base().unwrap();
        let sibling = table.allocate(right.as_ptr()).unwrap();

        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();
        assert!(helper.append_leaf_split(50, sibling).unwrap().is_installed());

        let node = helper.head_ref();
        assert_eq!(node.kind(), NodeKind::LeafSplit);
        assert_eq!(node.size(), 5);
        assert_eq!(node.high_key(), &BoundKey::finite(50));
        assert!(!node.key_in_range(&50));

        assert_eq!(
            helper.append_leaf_insert(60, 0).unwrap_err(),
            NodeError::KeyOutOfRange
        );

        unsafe {
            free(&table, id);
            free(&table, sibling);
        }
    }

    #[test]
    fn test_split_rejects_larger_sibling() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 30);
        let big = publish_leaf(&table, 0, 200);
        let guard = table.guard();

        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();
        assert_eq!(
            helper.append_leaf_split(10, big).unwrap_err(),
            NodeError::InvalidSplit {
                node_size: 3,
                sibling_size: 20
            }
        );
        assert_eq!(
            helper.append_leaf_split(10, 63).unwrap_err(),
            NodeError::Released(63)
        );

        unsafe {
            free(&table, id);
            free(&table, big);
        }
    }

    #[test]
    fn test_merge_and_remove() {
        let table = Table::new();
        let left = publish_leaf(&table, 0, 50);
        let right = publish_leaf(&table, 50, 100);
        let guard = table.guard();

        let mut right_helper = AppendHelper::load(&table, right, &guard).unwrap();
        assert!(right_helper.append_leaf_remove(right).unwrap().is_installed());
        let right_head = right_helper.head_ref();
        assert_eq!(right_head.size(), 5);

        let mut helper = AppendHelper::load(&table, left, &guard).unwrap();
        assert!(helper.append_leaf_insert(7, 7).unwrap().is_installed());
        assert!(
            helper
                .append_leaf_merge(50, right, right_head)
                .unwrap()
                .is_installed()
        );

        let node = helper.head_ref();
        assert_eq!(node.kind(), NodeKind::LeafMerge);
        assert_eq!(node.size(), 11);
        assert_eq!(node.height(), 1 + 1 + 1);
        assert_eq!(node.low_key(), &BoundKey::finite(0));
        assert_eq!(node.high_key(), &BoundKey::finite(100));

        unsafe { free(&table, left) };
        // The absorbed chain went with it, and its remove delta released the id.
        assert_eq!(table.is_released(right), Ok(true));
    }

    #[test]
    fn test_replace_installs_base() {
        let table = Table::new();
        let id = publish_leaf(&table, 0, 100);
        let guard = table.guard();
        let mut helper = AppendHelper::load(&table, id, &guard).unwrap();
        assert!(helper.append_leaf_insert(3, 3).unwrap().is_installed());

        let fresh =
            Node::leaf_base(BoundKey::finite(0), BoundKey::finite(100), vec![(3, 3)]).unwrap();
        let fresh = unsafe { UnlinkedNode::from_raw(fresh) };

        let ReplaceOutcome::Installed { old_head } = helper.replace(fresh).unwrap() else {
            panic!("replace lost without contention");
        };
        assert_eq!(helper.head_ref().kind(), NodeKind::LeafBase);
        assert_eq!(helper.head_ref().size(), 1);

        unsafe {
            free_chain(&table, old_head).unwrap();
            free(&table, id);
        }
    }

    #[test]
    fn test_load_released() {
        let table = Table::new();
        let guard = table.guard();
        assert_eq!(
            AppendHelper::load(&table, 3, &guard).unwrap_err(),
            NodeError::Released(3)
        );
    }
}
