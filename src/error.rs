//! Error types for the node and indirection layer.
//!
//! Conditions the embedding tree can get wrong (ids past the table, keys
//! outside a node's range, destroying a base with live deltas) surface as
//! typed errors instead of aborting the process. A CAS conflict is *not* an
//! error; see [`AppendOutcome`](crate::append::AppendOutcome).

use std::error::Error as StdError;
use std::fmt as StdFmt;

use crate::node::{NodeKind, NodeRole};
use crate::table::NodeId;

// ============================================================================
//  TableError
// ============================================================================

/// Errors raised by the [`MappingTable`](crate::table::MappingTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Every slot has been handed out.
    Exhausted {
        /// Fixed table capacity.
        capacity: usize,
    },

    /// The id does not index a slot of this table.
    OutOfRange {
        /// Offending id.
        id: NodeId,
        /// Fixed table capacity.
        capacity: usize,
    },
}

impl StdFmt::Display for TableError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Exhausted { capacity } => {
                write!(f, "mapping table exhausted (capacity {capacity})")
            }
            Self::OutOfRange { id, capacity } => {
                write!(f, "node id {id} out of range (capacity {capacity})")
            }
        }
    }
}

impl StdError for TableError {}

// ============================================================================
//  BoundError
// ============================================================================

/// Errors raised when comparing a [`BoundKey`](crate::bound::BoundKey).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundError {
    /// An infinite bound cannot be ordered against a concrete key.
    Infinite,
}

impl StdFmt::Display for BoundError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Infinite => write!(f, "cannot compare an infinite bound with a concrete key"),
        }
    }
}

impl StdError for BoundError {}

// ============================================================================
//  NodeError
// ============================================================================

/// Errors raised by node construction, search, split and append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The operation requires a different node kind.
    InvalidKind(NodeKind),

    /// Leaf operation on an inner chain, or the reverse.
    RoleMismatch {
        /// Role the operation works on.
        expected: NodeRole,
        /// Role of the chain it was called on.
        found: NodeRole,
    },

    /// Key lies outside the node's `[low, high)` range.
    KeyOutOfRange,

    /// Search on a base node holding no entries.
    EmptyNode,

    /// Direct slot access past the end of a base node.
    IndexOutOfBounds {
        /// Requested slot.
        index: usize,
        /// Number of slots.
        size: usize,
    },

    /// Split needs at least two entries.
    SplitTooSmall {
        /// Entries in the node.
        size: usize,
    },

    /// Base node entries are not in ascending key order.
    UnsortedEntries,

    /// The sibling holds more entries than the chain being split.
    InvalidSplit {
        /// Logical size of the chain head.
        node_size: usize,
        /// Logical size of the new sibling.
        sibling_size: usize,
    },

    /// Base node still has deltas allocated from it.
    LiveDeltas {
        /// Number of deltas not yet destroyed.
        live: usize,
    },

    /// The id resolves to no chain (never allocated, or released).
    Released(NodeId),

    /// The chain carries its own remove delta; its content now belongs to
    /// the left sibling and it has nothing to consolidate into.
    Removed(NodeId),

    /// Mapping table failure.
    Table(TableError),

    /// Bound comparison failure.
    Bound(BoundError),
}

impl StdFmt::Display for NodeError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::InvalidKind(kind) => write!(f, "operation not valid on {kind} node"),
            Self::RoleMismatch { expected, found } => {
                write!(f, "expected {expected} chain, found {found} chain")
            }
            Self::KeyOutOfRange => write!(f, "key outside node range"),
            Self::EmptyNode => write!(f, "base node is empty"),
            Self::IndexOutOfBounds { index, size } => {
                write!(f, "slot {index} out of bounds (size {size})")
            }
            Self::SplitTooSmall { size } => write!(f, "cannot split node of size {size}"),
            Self::UnsortedEntries => write!(f, "base node entries not sorted ascending"),
            Self::InvalidSplit {
                node_size,
                sibling_size,
            } => write!(
                f,
                "sibling of size {sibling_size} larger than split node of size {node_size}"
            ),
            Self::LiveDeltas { live } => {
                write!(f, "base node destroyed with {live} live deltas")
            }
            Self::Released(id) => write!(f, "node id {id} resolves to no chain"),
            Self::Removed(id) => write!(f, "node {id} is removed and cannot be consolidated"),
            Self::Table(err) => write!(f, "{err}"),
            Self::Bound(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for NodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Table(err) => Some(err),
            Self::Bound(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TableError> for NodeError {
    fn from(err: TableError) -> Self {
        Self::Table(err)
    }
}

impl From<BoundError> for NodeError {
    fn from(err: BoundError) -> Self {
        Self::Bound(err)
    }
}

// ============================================================================
//  TraverseError
// ============================================================================

/// Errors raised while walking a delta chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraverseError {
    /// The handler has no callback for this node kind.
    Unhandled(NodeKind),

    /// A delta without a predecessor.
    BrokenChain(NodeKind),

    /// Node-level failure inside a handler.
    Node(NodeError),

    /// Mapping table failure inside a handler.
    Table(TableError),
}

impl StdFmt::Display for TraverseError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Unhandled(kind) => write!(f, "handler does not accept {kind} nodes"),
            Self::BrokenChain(kind) => write!(f, "{kind} delta has no predecessor"),
            Self::Node(err) => write!(f, "{err}"),
            Self::Table(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for TraverseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Node(err) => Some(err),
            Self::Table(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeError> for TraverseError {
    fn from(err: NodeError) -> Self {
        Self::Node(err)
    }
}

impl From<TableError> for TraverseError {
    fn from(err: TableError) -> Self {
        Self::Table(err)
    }
}
