//! Filepath: src/node.rs
//!
//! Chain nodes: base nodes and delta records.
//!
//! Every link of a delta chain is a [`Node`]: a shared header (height,
//! logical size, bound pointers, predecessor, owning base) plus a
//! [`NodeBody`] variant that carries the kind-specific payload.
//!
//! ```text
//!  mapping table slot
//!        |
//!        v
//!  [leaf-insert] --next--> [leaf-split] --next--> [leaf-delete] --next--> [leaf-base]
//!   h=3 size=5              h=2 size=4             h=1 size=5             h=0 size=6
//!   high ───────────────────> split_key            high ───────────────> base.high
//! ```
//!
//! # Bounds
//!
//! `low`/`high` in the header are non-owning pointers to whichever node
//! currently defines the chain's range: the base node's own bounds, a split
//! delta's embedded split key, or (after a merge) the absorbed sibling's
//! high bound. A post-split chain therefore narrows without touching the
//! base node.
//!
//! # Ownership
//!
//! Every delta is allocated from, and accounted by, the
//! [`DeltaAllocator`] of its chain's base node, and stores an explicit
//! pointer to that base. `next` and the bound pointers are non-owning.
//! Published nodes are never mutated.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::bound::BoundKey;
use crate::error::NodeError;
use crate::table::NodeId;
use crate::tracing_helpers::error_log;

mod base;
mod delta;

pub use base::{BaseNode, DeltaAllocator};
pub use delta::{
    InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, RemoveDelta, SplitDelta,
};

// ============================================================================
//  NodeKind / NodeRole
// ============================================================================

/// Role of a chain in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Holds key/value pairs.
    Leaf,
    /// Holds separator keys and child ids.
    Inner,
}

impl StdFmt::Display for NodeRole {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Leaf => write!(f, "leaf"),
            Self::Inner => write!(f, "inner"),
        }
    }
}

/// Type tag of a chain node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Leaf chain terminator.
    LeafBase,
    /// Inner chain terminator.
    InnerBase,
    /// Leaf key/value insert.
    LeafInsert,
    /// Leaf key delete.
    LeafDelete,
    /// Leaf split.
    LeafSplit,
    /// Leaf merge.
    LeafMerge,
    /// Leaf logical removal.
    LeafRemove,
    /// Inner separator insert.
    InnerInsert,
    /// Inner separator delete.
    InnerDelete,
    /// Inner split.
    InnerSplit,
    /// Inner merge.
    InnerMerge,
    /// Inner logical removal.
    InnerRemove,
}

impl NodeKind {
    /// Every kind, leaf kinds first.
    pub const ALL: [Self; 12] = [
        Self::LeafBase,
        Self::LeafInsert,
        Self::LeafDelete,
        Self::LeafSplit,
        Self::LeafMerge,
        Self::LeafRemove,
        Self::InnerBase,
        Self::InnerInsert,
        Self::InnerDelete,
        Self::InnerSplit,
        Self::InnerMerge,
        Self::InnerRemove,
    ];

    /// Role of chains containing this kind.
    #[must_use]
    pub const fn role(self) -> NodeRole {
        match self {
            Self::LeafBase
            | Self::LeafInsert
            | Self::LeafDelete
            | Self::LeafSplit
            | Self::LeafMerge
            | Self::LeafRemove => NodeRole::Leaf,
            Self::InnerBase
            | Self::InnerInsert
            | Self::InnerDelete
            | Self::InnerSplit
            | Self::InnerMerge
            | Self::InnerRemove => NodeRole::Inner,
        }
    }

    /// Whether this kind terminates a chain.
    #[must_use]
    pub const fn is_base(self) -> bool {
        matches!(self, Self::LeafBase | Self::InnerBase)
    }
}

impl StdFmt::Display for NodeKind {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let name: &str = match self {
            Self::LeafBase | Self::InnerBase => "base",
            Self::LeafInsert | Self::InnerInsert => "insert",
            Self::LeafDelete | Self::InnerDelete => "delete",
            Self::LeafSplit | Self::InnerSplit => "split",
            Self::LeafMerge | Self::InnerMerge => "merge",
            Self::LeafRemove | Self::InnerRemove => "remove",
        };
        write!(f, "{}-{name}", self.role())
    }
}

// ============================================================================
//  NodeHeader / NodeBody
// ============================================================================

/// Header shared by every link of a chain.
struct NodeHeader<K> {
    /// Deltas between this link and the base node (0 at the base).
    height: u32,
    /// Logical element count as of this link.
    size: usize,
    /// Authoritative low bound (non-owning).
    low: NonNull<BoundKey<K>>,
    /// Authoritative high bound (non-owning).
    high: NonNull<BoundKey<K>>,
}

/// Kind-specific payload of a chain node.
#[derive(Debug)]
pub enum NodeBody<K, V> {
    /// Leaf chain terminator.
    LeafBase(BaseNode<K, V>),
    /// Inner chain terminator.
    InnerBase(BaseNode<K, NodeId>),
    /// Leaf insert.
    LeafInsert(LeafEntryDelta<K, V>),
    /// Leaf delete.
    LeafDelete(LeafEntryDelta<K, V>),
    /// Leaf split.
    LeafSplit(SplitDelta<K>),
    /// Leaf merge.
    LeafMerge(MergeDelta<K, V>),
    /// Leaf removal.
    LeafRemove(RemoveDelta),
    /// Inner insert.
    InnerInsert(InnerInsertDelta<K>),
    /// Inner delete.
    InnerDelete(InnerDeleteDelta<K>),
    /// Inner split.
    InnerSplit(SplitDelta<K>),
    /// Inner merge.
    InnerMerge(MergeDelta<K, V>),
    /// Inner removal.
    InnerRemove(RemoveDelta),
}

impl<K, V> NodeBody<K, V> {
    /// Type tag of this payload.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::LeafBase(_) => NodeKind::LeafBase,
            Self::InnerBase(_) => NodeKind::InnerBase,
            Self::LeafInsert(_) => NodeKind::LeafInsert,
            Self::LeafDelete(_) => NodeKind::LeafDelete,
            Self::LeafSplit(_) => NodeKind::LeafSplit,
            Self::LeafMerge(_) => NodeKind::LeafMerge,
            Self::LeafRemove(_) => NodeKind::LeafRemove,
            Self::InnerInsert(_) => NodeKind::InnerInsert,
            Self::InnerDelete(_) => NodeKind::InnerDelete,
            Self::InnerSplit(_) => NodeKind::InnerSplit,
            Self::InnerMerge(_) => NodeKind::InnerMerge,
            Self::InnerRemove(_) => NodeKind::InnerRemove,
        }
    }
}

/// Entries for a new base node, tagged by role.
#[derive(Debug, Clone)]
pub enum BaseEntries<K, V> {
    /// Key/value pairs of a leaf.
    Leaf(Vec<(K, V)>),
    /// Separator/child pairs of an inner node; the first key is a dummy.
    Inner(Vec<(K, NodeId)>),
}

impl<K, V> BaseEntries<K, V> {
    /// Role of the node these entries build.
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        match self {
            Self::Leaf(_) => NodeRole::Leaf,
            Self::Inner(_) => NodeRole::Inner,
        }
    }
}

// ============================================================================
//  Node
// ============================================================================

/// One link of a delta chain.
pub struct Node<K, V> {
    header: NodeHeader<K>,
    /// Predecessor; `None` only for base nodes.
    next: Option<NonNull<Self>>,
    /// Owning base node; `None` only for base nodes.
    base: Option<NonNull<Self>>,
    body: NodeBody<K, V>,
}

// SAFETY: a published node is never mutated, and its raw pointers refer to
// nodes of the same chain, which are freed only together with it.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for Node<K, V> {}
// SAFETY: see Send; all shared access is read-only.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Node<K, V> {}

impl<K, V> StdFmt::Debug for Node<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("height", &self.header.height)
            .field("size", &self.header.size)
            .field("has_next", &self.next.is_some())
            .finish_non_exhaustive()
    }
}

impl<K, V> Node<K, V> {
    /// Type tag.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    /// Role of the chain this node belongs to.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.kind().role()
    }

    /// Whether this node terminates its chain.
    #[inline]
    #[must_use]
    pub const fn is_base(&self) -> bool {
        self.kind().is_base()
    }

    /// Deltas between this link and the base node.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.header.height
    }

    /// Logical element count as of this link.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.header.size
    }

    /// Inclusive low bound of the chain as of this link.
    #[inline]
    #[must_use]
    pub const fn low_key(&self) -> &BoundKey<K> {
        // SAFETY: the bound lives in this node or an older node of the same
        // chain (or an absorbed sibling chain), all of which outlive `self`.
        unsafe { self.header.low.as_ref() }
    }

    /// Exclusive high bound of the chain as of this link.
    #[inline]
    #[must_use]
    pub const fn high_key(&self) -> &BoundKey<K> {
        // SAFETY: see low_key.
        unsafe { self.header.high.as_ref() }
    }

    /// Kind-specific payload.
    #[inline]
    #[must_use]
    pub const fn body(&self) -> &NodeBody<K, V> {
        &self.body
    }

    /// Predecessor link.
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<&Self> {
        self.next_ref().map(NodeRef::get)
    }

    /// Predecessor link as a [`NodeRef`].
    #[inline]
    #[must_use]
    pub fn next_ref(&self) -> Option<NodeRef<'_, K, V>> {
        // SAFETY: a predecessor outlives every delta stacked on it.
        self.next.map(|ptr| unsafe { NodeRef::from_raw(ptr) })
    }

    /// The base node terminating this node's chain.
    #[must_use]
    pub fn owning_base(&self) -> &Self {
        match self.base {
            // SAFETY: the base node is destroyed only after all its deltas.
            Some(base) => unsafe { base.as_ref() },
            None => self,
        }
    }

    /// Leaf base payload, if this is a leaf base node.
    #[inline]
    #[must_use]
    pub const fn as_leaf_base(&self) -> Option<&BaseNode<K, V>> {
        match &self.body {
            NodeBody::LeafBase(base) => Some(base),
            _ => None,
        }
    }

    /// Inner base payload, if this is an inner base node.
    #[inline]
    #[must_use]
    pub const fn as_inner_base(&self) -> Option<&BaseNode<K, NodeId>> {
        match &self.body {
            NodeBody::InnerBase(base) => Some(base),
            _ => None,
        }
    }

    /// Delta allocator, if this is a base node.
    #[must_use]
    pub const fn delta_allocator(&self) -> Option<&DeltaAllocator> {
        match &self.body {
            NodeBody::LeafBase(base) => Some(base.deltas()),
            NodeBody::InnerBase(base) => Some(base.deltas()),
            _ => None,
        }
    }

    fn base_bound_ptrs(&self) -> Option<(NonNull<BoundKey<K>>, NonNull<BoundKey<K>>)> {
        match &self.body {
            NodeBody::LeafBase(base) => Some((
                NonNull::from(base.low_key()),
                NonNull::from(base.high_key()),
            )),
            NodeBody::InnerBase(base) => Some((
                NonNull::from(base.low_key()),
                NonNull::from(base.high_key()),
            )),
            _ => None,
        }
    }

    // ========================================================================
    //  Base node lifecycle
    // ========================================================================

    /// Box a base body and point its header bounds at the embedded keys.
    fn publish_base(body: NodeBody<K, V>, size: usize) -> NonNull<Self> {
        let raw: *mut Self = Box::into_raw(Box::new(Self {
            header: NodeHeader {
                height: 0,
                size,
                low: NonNull::dangling(),
                high: NonNull::dangling(),
            },
            next: None,
            base: None,
            body,
        }));

        // SAFETY: raw was just created from Box::into_raw and is not shared.
        // The bound pointers are derived after boxing, so they stay valid
        // for the node's lifetime.
        unsafe {
            if let Some((low, high)) = (*raw).base_bound_ptrs() {
                (*raw).header.low = low;
                (*raw).header.high = high;
            }
            NonNull::new_unchecked(raw)
        }
    }

    /// Destroy a base node.
    ///
    /// # Errors
    /// - [`NodeError::InvalidKind`] if `ptr` is a delta
    /// - [`NodeError::LiveDeltas`] if deltas allocated from it remain; the
    ///   node is left intact
    ///
    /// # Safety
    /// `ptr` must come from a base factory, must be unreachable by any
    /// reader, and must not be used after a successful return.
    pub unsafe fn destroy_base(ptr: NonNull<Self>) -> Result<(), NodeError> {
        // SAFETY: caller guarantees ptr is a live node.
        let node: &Self = unsafe { ptr.as_ref() };

        let Some(deltas) = node.delta_allocator() else {
            return Err(NodeError::InvalidKind(node.kind()));
        };

        let live: usize = deltas.live();
        if live > 0 {
            return Err(NodeError::LiveDeltas { live });
        }

        // SAFETY: base nodes are created by Box::into_raw in publish_base.
        unsafe { drop(Box::from_raw(ptr.as_ptr())) };
        Ok(())
    }

    /// Destroy a delta, returning it to its owning base node's allocator.
    ///
    /// # Errors
    /// [`NodeError::InvalidKind`] if `ptr` is a base node.
    ///
    /// # Safety
    /// `ptr` must be a delta allocated by this crate, unreachable by any
    /// reader, and not used after a successful return. Its base node must
    /// still be alive.
    pub unsafe fn destroy_delta(ptr: NonNull<Self>) -> Result<(), NodeError> {
        // SAFETY: caller guarantees ptr is a live node.
        let node: &Self = unsafe { ptr.as_ref() };

        let Some(base) = node.base else {
            return Err(NodeError::InvalidKind(node.kind()));
        };

        // SAFETY: caller guarantees the owning base is alive.
        let base: &Self = unsafe { base.as_ref() };
        match base.delta_allocator() {
            // SAFETY: every delta is allocated from its owning base's allocator.
            Some(deltas) => unsafe { deltas.dealloc(ptr) },
            None => return Err(NodeError::InvalidKind(base.kind())),
        }
        Ok(())
    }

    // ========================================================================
    //  Delta construction
    // ========================================================================

    /// Allocate a delta on top of `pred` from the chain's base allocator.
    ///
    /// Low bound is inherited from `pred`. High bound is `high` if given,
    /// the delta's own split key for split deltas, `pred`'s otherwise.
    pub(crate) fn alloc_delta(
        pred: NonNull<Self>,
        body: NodeBody<K, V>,
        height: u32,
        size: usize,
        high: Option<NonNull<BoundKey<K>>>,
    ) -> NonNull<Self> {
        // SAFETY: pred is a live chain head held by the caller.
        let pred_ref: &Self = unsafe { pred.as_ref() };
        let base_ptr: NonNull<Self> = pred_ref.base.unwrap_or(pred);
        let owner: &Self = pred_ref.owning_base();

        let node = Self {
            header: NodeHeader {
                height,
                size,
                low: pred_ref.header.low,
                high: high.unwrap_or(pred_ref.header.high),
            },
            next: Some(pred),
            base: Some(base_ptr),
            body,
        };

        let ptr: NonNull<Self> = match owner.delta_allocator() {
            Some(deltas) => deltas.alloc(node),
            // owning_base() only ever returns base nodes.
            None => NonNull::from(Box::leak(Box::new(node))),
        };

        // SAFETY: ptr is freshly allocated and not yet published. The split
        // key pointer is derived after allocation so it stays valid.
        unsafe {
            let raw: *mut Self = ptr.as_ptr();
            let own_split: Option<NonNull<BoundKey<K>>> = match &(*raw).body {
                NodeBody::LeafSplit(split) | NodeBody::InnerSplit(split) => {
                    Some(NonNull::from(split.split_bound()))
                }
                _ => None,
            };
            if let Some(split_key) = own_split {
                (*raw).header.high = split_key;
            }
        }

        ptr
    }
}

impl<K: Ord, V> Node<K, V> {
    /// Create a base node of the given kind.
    ///
    /// # Errors
    /// - [`NodeError::InvalidKind`] if `kind` is not a base kind
    /// - [`NodeError::RoleMismatch`] if `entries` are for the other role
    /// - [`NodeError::UnsortedEntries`] / [`NodeError::KeyOutOfRange`] for
    ///   malformed entries
    pub fn create_base(
        kind: NodeKind,
        low: BoundKey<K>,
        high: BoundKey<K>,
        entries: BaseEntries<K, V>,
    ) -> Result<NonNull<Self>, NodeError> {
        match (kind, entries) {
            (NodeKind::LeafBase, BaseEntries::Leaf(entries)) => Self::leaf_base(low, high, entries),
            (NodeKind::InnerBase, BaseEntries::Inner(entries)) => {
                Self::inner_base(low, high, entries)
            }
            (NodeKind::LeafBase | NodeKind::InnerBase, entries) => Err(NodeError::RoleMismatch {
                expected: kind.role(),
                found: entries.role(),
            }),
            (other, _) => Err(NodeError::InvalidKind(other)),
        }
    }

    /// Create a leaf base node.
    ///
    /// # Errors
    /// [`NodeError::UnsortedEntries`] / [`NodeError::KeyOutOfRange`] for
    /// malformed entries.
    pub fn leaf_base(
        low: BoundKey<K>,
        high: BoundKey<K>,
        entries: Vec<(K, V)>,
    ) -> Result<NonNull<Self>, NodeError> {
        let base: BaseNode<K, V> = BaseNode::new(low, high, entries, 0)?;
        let size: usize = base.size();
        Ok(Self::publish_base(NodeBody::LeafBase(base), size))
    }

    /// Create an inner base node. The first entry's key is a dummy.
    ///
    /// # Errors
    /// [`NodeError::UnsortedEntries`] / [`NodeError::KeyOutOfRange`] for
    /// malformed separators.
    pub fn inner_base(
        low: BoundKey<K>,
        high: BoundKey<K>,
        entries: Vec<(K, NodeId)>,
    ) -> Result<NonNull<Self>, NodeError> {
        let base: BaseNode<K, NodeId> = BaseNode::new(low, high, entries, 1)?;
        let size: usize = base.size();
        Ok(Self::publish_base(NodeBody::InnerBase(base), size))
    }

    /// Whether `key` lies in this link's `[low, high)` range.
    #[inline]
    #[must_use]
    pub fn key_in_range(&self, key: &K) -> bool {
        self.low_key().admits_from_below(key) && self.high_key().admits_from_above(key)
    }
}

impl<K: Ord + Clone, V: Clone> Node<K, V> {
    /// Split a base node, returning the new right-hand base node.
    ///
    /// See [`BaseNode::split`]; `self` is not modified.
    ///
    /// # Errors
    /// - [`NodeError::InvalidKind`] if `self` is a delta
    /// - [`NodeError::SplitTooSmall`] if the node has fewer than two entries
    pub fn split_base(&self) -> Result<NonNull<Self>, NodeError> {
        match &self.body {
            NodeBody::LeafBase(base) => {
                let right: BaseNode<K, V> = base.split()?;
                let size: usize = right.size();
                Ok(Self::publish_base(NodeBody::LeafBase(right), size))
            }
            NodeBody::InnerBase(base) => {
                let right: BaseNode<K, NodeId> = base.split()?;
                let size: usize = right.size();
                Ok(Self::publish_base(NodeBody::InnerBase(right), size))
            }
            other => Err(NodeError::InvalidKind(other.kind())),
        }
    }
}

// ============================================================================
//  NodeRef
// ============================================================================

/// Borrowed handle to a chain node that keeps the original pointer.
///
/// Handlers receive `NodeRef`s so that a reclaiming handler can hand the
/// exact allocation pointer back to its allocator.
pub struct NodeRef<'a, K, V> {
    ptr: NonNull<Node<K, V>>,
    _marker: PhantomData<&'a Node<K, V>>,
}

impl<K, V> Clone for NodeRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodeRef<'_, K, V> {}

impl<'a, K, V> NodeRef<'a, K, V> {
    /// Wrap a raw chain pointer.
    ///
    /// # Safety
    /// `ptr` must point to a live node that stays alive for `'a`.
    #[inline]
    #[must_use]
    pub const unsafe fn from_raw(ptr: NonNull<Node<K, V>>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// The underlying pointer.
    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> NonNull<Node<K, V>> {
        self.ptr
    }

    /// Borrow the node for `'a`.
    #[inline]
    #[must_use]
    pub const fn get(self) -> &'a Node<K, V> {
        // SAFETY: from_raw's contract keeps the node alive for 'a.
        unsafe { self.ptr.as_ref() }
    }
}

impl<K, V> Deref for NodeRef<'_, K, V> {
    type Target = Node<K, V>;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<K, V> StdFmt::Debug for NodeRef<'_, K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        StdFmt::Debug::fmt(self.get(), f)
    }
}

// ============================================================================
//  UnlinkedNode
// ============================================================================

/// Owning handle to a node that is not reachable from the mapping table.
///
/// Returned for a delta whose install CAS lost, and for a freshly
/// consolidated base node. Dropping the handle returns the node's storage
/// (a delta to its base allocator, a base node to the heap).
pub struct UnlinkedNode<K, V> {
    ptr: NonNull<Node<K, V>>,
}

impl<K, V> UnlinkedNode<K, V> {
    /// Take ownership of an unpublished node.
    ///
    /// # Safety
    /// `ptr` must be a node allocated by this crate that no reader can reach
    /// and nobody else will free.
    #[must_use]
    pub const unsafe fn from_raw(ptr: NonNull<Node<K, V>>) -> Self {
        Self { ptr }
    }

    /// The underlying pointer, still owned by the handle.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<Node<K, V>> {
        self.ptr
    }

    /// Borrow the node.
    #[inline]
    #[must_use]
    pub const fn get(&self) -> &Node<K, V> {
        // SAFETY: the handle owns a live node.
        unsafe { self.ptr.as_ref() }
    }

    /// Give up ownership, typically to publish the node.
    #[must_use]
    pub fn into_raw(self) -> NonNull<Node<K, V>> {
        let ptr: NonNull<Node<K, V>> = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl<K, V> Drop for UnlinkedNode<K, V> {
    fn drop(&mut self) {
        let is_base: bool = self.get().is_base();

        // SAFETY: the handle owns an unreachable node.
        let result: Result<(), NodeError> = unsafe {
            if is_base {
                Node::destroy_base(self.ptr)
            } else {
                Node::destroy_delta(self.ptr)
            }
        };

        if let Err(_err) = result {
            error_log!(error = %_err, "leaking unlinked node");
        }
    }
}

impl<K, V> StdFmt::Debug for UnlinkedNode<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_tuple("UnlinkedNode").field(self.get()).finish()
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type TestNode = Node<u64, u64>;

    fn leaf(size: u64) -> NonNull<TestNode> {
        let entries: Vec<(u64, u64)> = (0..size).map(|i| (i * 2, i * 2 + 1)).collect();
        Node::leaf_base(BoundKey::finite(0), BoundKey::finite(size * 2), entries).unwrap()
    }

    #[test]
    fn test_kind_roles_and_display() {
        for kind in NodeKind::ALL {
            let name = kind.to_string();
            assert!(name.starts_with(&kind.role().to_string()), "{name}");
        }
        assert_eq!(NodeKind::InnerSplit.to_string(), "inner-split");
        assert!(NodeKind::LeafBase.is_base());
        assert!(!NodeKind::InnerRemove.is_base());
    }

    #[test]
    fn test_leaf_base_header() {
        let ptr = leaf(8);
        let node = unsafe { ptr.as_ref() };

        assert_eq!(node.kind(), NodeKind::LeafBase);
        assert_eq!(node.height(), 0);
        assert_eq!(node.size(), 8);
        assert_eq!(node.low_key(), &BoundKey::finite(0));
        assert_eq!(node.high_key(), &BoundKey::finite(16));
        assert!(node.next().is_none());
        assert!(std::ptr::eq(node.owning_base(), node));
        assert!(node.key_in_range(&15));
        assert!(!node.key_in_range(&16));

        unsafe { Node::destroy_base(ptr).unwrap() };
    }

    #[test]
    fn test_create_base_kind_checks() {
        let err = TestNode::create_base(
            NodeKind::LeafInsert,
            BoundKey::Infinite,
            BoundKey::Infinite,
            BaseEntries::Leaf(vec![]),
        )
        .unwrap_err();
        assert_eq!(err, NodeError::InvalidKind(NodeKind::LeafInsert));

        let err = TestNode::create_base(
            NodeKind::LeafBase,
            BoundKey::Infinite,
            BoundKey::Infinite,
            BaseEntries::Inner(vec![(0, 1)]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            NodeError::RoleMismatch {
                expected: NodeRole::Leaf,
                found: NodeRole::Inner
            }
        );

        let ptr = TestNode::create_base(
            NodeKind::InnerBase,
            BoundKey::Infinite,
            BoundKey::Infinite,
            BaseEntries::Inner(vec![(0, 7), (10, 8)]),
        )
        .unwrap();
        let node = unsafe { ptr.as_ref() };
        assert_eq!(node.kind(), NodeKind::InnerBase);
        assert_eq!(node.as_inner_base().unwrap().value_at(1), Ok(&8));
        unsafe { Node::destroy_base(ptr).unwrap() };
    }

    #[test]
    fn test_split_base() {
        let ptr = leaf(10);
        let node = unsafe { ptr.as_ref() };

        let right_ptr = node.split_base().unwrap();
        let right = unsafe { right_ptr.as_ref() };
        assert_eq!(right.size(), 5);
        assert_eq!(right.low_key(), &BoundKey::finite(10));
        assert_eq!(right.high_key(), node.high_key());
        assert_eq!(node.size(), 10);

        unsafe {
            Node::destroy_base(right_ptr).unwrap();
            Node::destroy_base(ptr).unwrap();
        }
    }

    #[test]
    fn test_split_delta_narrows_high_bound() {
        let ptr = leaf(10);
        let delta = Node::alloc_delta(
            ptr,
            NodeBody::LeafSplit(SplitDelta::new(10, 3)),
            1,
            5,
            None,
        );
        let node = unsafe { delta.as_ref() };

        assert_eq!(node.kind(), NodeKind::LeafSplit);
        assert_eq!(node.high_key(), &BoundKey::finite(10));
        assert_eq!(node.low_key(), &BoundKey::finite(0));
        assert!(!node.key_in_range(&10));
        // Base is untouched.
        assert_eq!(unsafe { ptr.as_ref() }.high_key(), &BoundKey::finite(20));

        let deltas = unsafe { ptr.as_ref() }.delta_allocator().unwrap();
        assert_eq!(deltas.live(), 1);

        unsafe {
            assert_eq!(
                Node::destroy_base(ptr),
                Err(NodeError::LiveDeltas { live: 1 })
            );
            Node::destroy_delta(delta).unwrap();
            Node::destroy_base(ptr).unwrap();
        }
    }

    #[test]
    fn test_destroy_wrong_kind() {
        let ptr = leaf(2);
        let delta = Node::alloc_delta(ptr, NodeBody::LeafRemove(RemoveDelta::new(4)), 1, 2, None);

        unsafe {
            assert_eq!(
                Node::destroy_delta(ptr),
                Err(NodeError::InvalidKind(NodeKind::LeafBase))
            );
            assert_eq!(
                Node::destroy_base(delta),
                Err(NodeError::InvalidKind(NodeKind::LeafRemove))
            );
            Node::destroy_delta(delta).unwrap();
            Node::destroy_base(ptr).unwrap();
        }
    }

    #[test]
    fn test_unlinked_node_drop_frees() {
        let ptr = leaf(2);
        let delta = Node::alloc_delta(
            ptr,
            NodeBody::LeafInsert(LeafEntryDelta::new(1, 1)),
            1,
            3,
            None,
        );
        let deltas = unsafe { ptr.as_ref() }.delta_allocator().unwrap();
        assert_eq!(deltas.live(), 1);

        drop(unsafe { UnlinkedNode::from_raw(delta) });
        assert_eq!(deltas.live(), 0);

        drop(unsafe { UnlinkedNode::from_raw(ptr) });
    }
}
