//! Base node: the chain terminator.
//!
//! A base node holds a sorted array of `(key, payload)` pairs together with
//! its own `[low, high)` bounds and the allocator that accounts for every
//! delta appended to its chain. Leaf bases carry values; inner bases carry
//! child node ids, and their first key is a dummy that is never searched:
//! keys below the second separator route to the first child.
//!
//! # Search
//!
//! ```text
//!  idx:   0     1     2     3
//!  key: [ 0 ][ 2  ][ 4  ][ 6  ]     search(5) -> 2
//!        ^ never compared           search(1) -> 0
//! ```

use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;

use crate::bound::BoundKey;
use crate::error::NodeError;
use crate::ordering::RELAXED;

// ============================================================================
//  DeltaAllocator
// ============================================================================

/// Per-chain delta allocator embedded in each base node.
///
/// Deltas are individually boxed; the allocator tracks how many are alive
/// so that a base node is never destroyed under its own deltas.
#[derive(Debug, Default)]
pub struct DeltaAllocator {
    live: AtomicUsize,
    total: AtomicUsize,
}

impl DeltaAllocator {
    /// Create an allocator with no deltas.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Move `value` to the heap and account for it.
    pub(crate) fn alloc<T>(&self, value: T) -> NonNull<T> {
        self.live.fetch_add(1, RELAXED);
        self.total.fetch_add(1, RELAXED);
        NonNull::from(Box::leak(Box::new(value)))
    }

    /// Drop a value previously returned by [`alloc`](Self::alloc).
    ///
    /// # Safety
    /// `ptr` must come from `alloc` on this allocator and must not be used
    /// again.
    pub(crate) unsafe fn dealloc<T>(&self, ptr: NonNull<T>) {
        // SAFETY: caller guarantees ptr came from Box::leak in alloc.
        unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        self.live.fetch_sub(1, RELAXED);
    }

    /// Deltas allocated and not yet destroyed.
    #[inline]
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(RELAXED)
    }

    /// Deltas ever allocated from this base node.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(RELAXED)
    }
}

// ============================================================================
//  BaseNode
// ============================================================================

/// Sorted array of entries terminating a delta chain.
///
/// # Type Parameters
/// * `K` - Key type
/// * `P` - Payload: the value type for leaves, [`NodeId`](crate::table::NodeId) for inner nodes
///
/// # Invariants
/// - Entries are sorted ascending by key (from index 1 for inner nodes)
/// - Every key lies in `[low, high)` (from index 1 for inner nodes)
#[derive(Debug)]
pub struct BaseNode<K, P> {
    low: BoundKey<K>,
    high: BoundKey<K>,
    entries: Box<[(K, P)]>,
    deltas: DeltaAllocator,
}

impl<K, P> BaseNode<K, P> {
    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inclusive low bound.
    #[inline]
    #[must_use]
    pub const fn low_key(&self) -> &BoundKey<K> {
        &self.low
    }

    /// Exclusive high bound.
    #[inline]
    #[must_use]
    pub const fn high_key(&self) -> &BoundKey<K> {
        &self.high
    }

    /// All entries in key order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[(K, P)] {
        &self.entries
    }

    /// The embedded delta allocator.
    #[inline]
    #[must_use]
    pub const fn deltas(&self) -> &DeltaAllocator {
        &self.deltas
    }

    /// Key at slot `index`.
    ///
    /// # Errors
    /// [`NodeError::IndexOutOfBounds`] if `index >= size`.
    #[inline]
    pub fn key_at(&self, index: usize) -> Result<&K, NodeError> {
        self.entry_at(index).map(|(key, _)| key)
    }

    /// Payload at slot `index`.
    ///
    /// # Errors
    /// [`NodeError::IndexOutOfBounds`] if `index >= size`.
    #[inline]
    pub fn value_at(&self, index: usize) -> Result<&P, NodeError> {
        self.entry_at(index).map(|(_, value)| value)
    }

    /// Entry at slot `index`.
    ///
    /// # Errors
    /// [`NodeError::IndexOutOfBounds`] if `index >= size`.
    pub fn entry_at(&self, index: usize) -> Result<&(K, P), NodeError> {
        self.entries.get(index).ok_or(NodeError::IndexOutOfBounds {
            index,
            size: self.size(),
        })
    }
}

impl<K: Ord, P> BaseNode<K, P> {
    /// Build a base node over caller-supplied entries.
    ///
    /// `first_searched` is 0 for leaves and 1 for inner nodes, whose first
    /// key is a dummy.
    ///
    /// # Errors
    /// - [`NodeError::UnsortedEntries`] if keys are not strictly ascending
    /// - [`NodeError::KeyOutOfRange`] if a key lies outside `[low, high)`
    pub(crate) fn new(
        low: BoundKey<K>,
        high: BoundKey<K>,
        entries: Vec<(K, P)>,
        first_searched: usize,
    ) -> Result<Self, NodeError> {
        let searched = entries.get(first_searched..).unwrap_or_default();

        if !searched.windows(2).all(|pair| pair[0].0 < pair[1].0) {
            return Err(NodeError::UnsortedEntries);
        }

        let in_range = |key: &K| low.admits_from_below(key) && high.admits_from_above(key);
        if !searched.iter().all(|(key, _)| in_range(key)) {
            return Err(NodeError::KeyOutOfRange);
        }

        Ok(Self {
            low,
            high,
            entries: entries.into_boxed_slice(),
            deltas: DeltaAllocator::new(),
        })
    }

    /// Whether `key` lies in `[low, high)`.
    #[inline]
    #[must_use]
    pub fn key_in_range(&self, key: &K) -> bool {
        self.low.admits_from_below(key) && self.high.admits_from_above(key)
    }

    /// Largest slot whose key is `<= key`.
    ///
    /// Slot 0 is never compared: it is the answer for keys below every
    /// other key (the dummy separator of an inner node, or the low end of
    /// a leaf).
    ///
    /// # Errors
    /// - [`NodeError::KeyOutOfRange`] if `key` lies outside `[low, high)`
    /// - [`NodeError::EmptyNode`] if the node holds no entries
    pub fn search(&self, key: &K) -> Result<usize, NodeError> {
        if !self.key_in_range(key) {
            return Err(NodeError::KeyOutOfRange);
        }

        let Some((_, rest)) = self.entries.split_first() else {
            return Err(NodeError::EmptyNode);
        };

        // Number of keys in 1.. that are <= key is exactly the target slot.
        Ok(rest.partition_point(|(entry_key, _)| entry_key <= key))
    }

    /// Slot holding exactly `key`, if any.
    ///
    /// # Errors
    /// [`NodeError::KeyOutOfRange`] if `key` lies outside `[low, high)`.
    pub fn point_search(&self, key: &K) -> Result<Option<usize>, NodeError> {
        match self.search(key) {
            Ok(index) => Ok((self.entries[index].0 == *key).then_some(index)),
            Err(NodeError::EmptyNode) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl<K: Ord + Clone, P: Clone> BaseNode<K, P> {
    /// Copy the upper half into a new base node.
    ///
    /// With `pivot = size / 2`, the new node holds slots `[pivot, size)`,
    /// its low bound is `key_at(pivot)` and its high bound a copy of this
    /// node's. This node is left untouched; the caller narrows it logically
    /// with a split delta.
    ///
    /// # Errors
    /// [`NodeError::SplitTooSmall`] if `size <= 1`.
    pub fn split(&self) -> Result<Self, NodeError> {
        let size: usize = self.size();
        if size <= 1 {
            return Err(NodeError::SplitTooSmall { size });
        }

        let pivot: usize = size / 2;
        let upper: &[(K, P)] = &self.entries[pivot..];

        Ok(Self {
            low: BoundKey::Finite(upper[0].0.clone()),
            high: self.high.clone(),
            entries: upper.to_vec().into_boxed_slice(),
            deltas: DeltaAllocator::new(),
        })
    }
}

// ============================================================================
//  Tests
// ============================================================================
