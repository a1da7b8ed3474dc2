//! Delta record payloads.
//!
//! One struct per structural change. A delta never mutates its
//! predecessor; it only adds information on top of it. The shared header
//! (height, size, bounds, predecessor) lives in [`Node`](super::Node).

use std::ptr::NonNull;

use crate::bound::BoundKey;
use crate::table::NodeId;

use super::{Node, NodeRef};

// ============================================================================
//  Leaf deltas
// ============================================================================

/// Leaf insert or delete: a key and its value.
///
/// For a delete the value is retained for diagnostics only.
#[derive(Debug)]
pub struct LeafEntryDelta<K, V> {
    key: K,
    value: V,
}

impl<K, V> LeafEntryDelta<K, V> {
    pub(crate) const fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// The inserted or deleted key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The inserted value, or the tombstone payload of a delete.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> &V {
        &self.value
    }
}

// ============================================================================
//  Inner deltas
// ============================================================================

/// Inner insert: keys in `[key, next_key)` now route to `child`.
#[derive(Debug)]
pub struct InnerInsertDelta<K> {
    key: K,
    child: NodeId,
    next_key: BoundKey<K>,
    next_id: NodeId,
}

impl<K> InnerInsertDelta<K> {
    pub(crate) const fn new(
        key: K,
        child: NodeId,
        next_key: BoundKey<K>,
        next_id: NodeId,
    ) -> Self {
        Self {
            key,
            child,
            next_key,
            next_id,
        }
    }

    /// New separator key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Child the separator routes to.
    #[inline]
    #[must_use]
    pub const fn child(&self) -> NodeId {
        self.child
    }

    /// Next separator to the right; infinite if none.
    #[inline]
    #[must_use]
    pub const fn next_key(&self) -> &BoundKey<K> {
        &self.next_key
    }

    /// Child of the next separator.
    #[inline]
    #[must_use]
    pub const fn next_id(&self) -> NodeId {
        self.next_id
    }
}

/// Inner delete: separator `key` is gone and `[prev_key, next_key)` routes
/// to `prev_id`.
#[derive(Debug)]
pub struct InnerDeleteDelta<K> {
    key: K,
    child: NodeId,
    next_key: BoundKey<K>,
    next_id: NodeId,
    prev_key: BoundKey<K>,
    prev_id: NodeId,
}

impl<K> InnerDeleteDelta<K> {
    pub(crate) fn new(
        key: K,
        child: NodeId,
        (next_key, next_id): (BoundKey<K>, NodeId),
        (prev_key, prev_id): (BoundKey<K>, NodeId),
    ) -> Self {
        Self {
            key,
            child,
            next_key,
            next_id,
            prev_key,
            prev_id,
        }
    }

    /// Removed separator key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Child the removed separator used to route to.
    #[inline]
    #[must_use]
    pub const fn child(&self) -> NodeId {
        self.child
    }

    /// Separator to the right of the removed one; infinite if none.
    #[inline]
    #[must_use]
    pub const fn next_key(&self) -> &BoundKey<K> {
        &self.next_key
    }

    /// Child of the right separator.
    #[inline]
    #[must_use]
    pub const fn next_id(&self) -> NodeId {
        self.next_id
    }

    /// Separator to the left of the removed one; infinite if none.
    #[inline]
    #[must_use]
    pub const fn prev_key(&self) -> &BoundKey<K> {
        &self.prev_key
    }

    /// Child that absorbs the removed separator's range.
    #[inline]
    #[must_use]
    pub const fn prev_id(&self) -> NodeId {
        self.prev_id
    }
}

// ============================================================================
//  Structural deltas (either role)
// ============================================================================

/// Split: keys at or above `split_key` moved to `sibling`.
///
/// The delta owns the split key as a [`BoundKey`] so the chain's high-bound
/// pointer can reference it directly. The bound is always finite: `new` is
/// the only constructor and the field is never written afterwards.
#[derive(Debug)]
pub struct SplitDelta<K> {
    split_key: BoundKey<K>,
    sibling: NodeId,
}

impl<K> SplitDelta<K> {
    pub(crate) const fn new(split_key: K, sibling: NodeId) -> Self {
        Self {
            split_key: BoundKey::Finite(split_key),
            sibling,
        }
    }

    /// New high bound of the remaining chain.
    ///
    /// # Panics
    ///
    /// Never in practice. The stored bound is built finite by `new` and no
    /// method replaces it, so the infinite arm cannot be reached.
    #[inline]
    #[must_use]
    pub const fn split_key(&self) -> &K {
        match &self.split_key {
            BoundKey::Finite(key) => key,
            BoundKey::Infinite => unreachable!(),
        }
    }

    /// The split key as a bound.
    #[inline]
    #[must_use]
    pub const fn split_bound(&self) -> &BoundKey<K> {
        &self.split_key
    }

    /// Node holding the moved-away upper half.
    #[inline]
    #[must_use]
    pub const fn sibling_id(&self) -> NodeId {
        self.sibling
    }
}

/// Merge: the right sibling's chain is absorbed into this one.
///
/// Keys below `merge_key` live in the local chain (`next`), the rest in the
/// sibling chain reachable through [`sibling_head`](Self::sibling_head).
#[derive(Debug)]
pub struct MergeDelta<K, V> {
    merge_key: K,
    sibling: NodeId,
    sibling_head: NonNull<Node<K, V>>,
}

impl<K, V> MergeDelta<K, V> {
    pub(crate) const fn new(
        merge_key: K,
        sibling: NodeId,
        sibling_head: NonNull<Node<K, V>>,
    ) -> Self {
        Self {
            merge_key,
            sibling,
            sibling_head,
        }
    }

    /// Separator between the local and the absorbed range.
    #[inline]
    #[must_use]
    pub const fn merge_key(&self) -> &K {
        &self.merge_key
    }

    /// Id of the absorbed node.
    #[inline]
    #[must_use]
    pub const fn sibling_id(&self) -> NodeId {
        self.sibling
    }

    /// Head of the absorbed chain.
    #[inline]
    #[must_use]
    pub const fn sibling_head(&self) -> NonNull<Node<K, V>> {
        self.sibling_head
    }

    /// Borrow the absorbed chain for as long as the merge delta is borrowed.
    #[inline]
    #[must_use]
    pub const fn sibling_ref(&self) -> NodeRef<'_, K, V> {
        // SAFETY: the sibling chain is owned by the chain holding this merge
        // delta and is freed only together with it.
        unsafe { NodeRef::from_raw(self.sibling_head) }
    }
}

/// Remove: the node is logically deleted from the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveDelta {
    removed: NodeId,
}

impl RemoveDelta {
    pub(crate) const fn new(removed: NodeId) -> Self {
        Self { removed }
    }

    /// Id of the removed node.
    #[inline]
    #[must_use]
    pub const fn removed_id(&self) -> NodeId {
        self.removed
    }
}
