//! # `bwtree-core`
//!
//! Node and indirection layer of a latch-free Bw-Tree.
//!
//! Readers and writers never lock a node. Every logical node is a slot in a
//! [`MappingTable`]; its visible state is a *delta chain*: a stack of
//! immutable delta records on top of a sorted [`BaseNode`]. Writers prepend
//! a delta and publish it with one CAS on the slot; readers load the slot and
//! replay the chain.
//!
//! | Module | Role |
//! |--------|------|
//! | [`table`] | Fixed-capacity id to chain-head table, the only shared mutable state |
//! | [`bound`] | Range bounds with an infinity sentinel |
//! | [`node`] | Base nodes, delta records, factories and destroy |
//! | [`append`] | Write path: one `append_*` per delta kind, CAS install |
//! | [`traverse`] | Head-to-base walk with merge recursion |
//! | [`consolidate`] | Collapse a chain into a fresh base node |
//! | [`free`] | Tear down an unreachable chain |
//! | [`reclaim`] | Deferred teardown through `seize` |
//! | [`lookup`] | Single-key read path for leaf and inner chains |
//!
//! ## Status
//!
//! Tree orchestration (root-to-leaf descent, deciding when to split, merge or
//! consolidate) is not part of this crate. It drives the operations here.
//!
//! ## Example
//!
//! ```rust
//! use bwtree_core::{AppendHelper, BoundKey, LookupResult, MappingTable, Node};
//! use bwtree_core::{consolidate, free_chain, lookup};
//!
//! let table: MappingTable<Node<u64, &str>, 1024> = MappingTable::new();
//! let base = Node::leaf_base(BoundKey::Infinite, BoundKey::Infinite, vec![(1, "one")])?;
//! let id = table.allocate(base.as_ptr())?;
//!
//! let guard = table.guard();
//! let mut helper = AppendHelper::load(&table, id, &guard)?;
//! assert!(helper.append_leaf_insert(2, "two")?.is_installed());
//!
//! assert_eq!(lookup(helper.head_ref(), &2)?, LookupResult::Found(&"two"));
//!
//! let fresh = consolidate(helper.head_ref())?;
//! assert_eq!(fresh.get().size(), 2);
//! drop(fresh);
//!
//! // SAFETY: single-threaded example, nobody else can reach the chain.
//! unsafe { free_chain(&table, helper.head_ref().as_ptr())? };
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Thread Safety
//!
//! [`MappingTable`] is `Send + Sync` when its element type is, which for
//! [`Node`] means both keys and values are `Send + Sync`. Chains loaded
//! under a [`MappingTable::guard`] stay valid until the guard drops, provided
//! replaced chains are retired with [`retire_chain`] rather than freed with
//! [`free_chain`].

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

pub mod append;
pub mod bound;
pub mod consolidate;
pub mod error;
pub mod free;
pub mod lookup;
pub mod node;
pub mod ordering;
pub mod reclaim;
pub mod table;
pub mod traverse;

mod tracing_helpers;

pub use append::{AppendHelper, AppendOutcome, ReplaceOutcome};
pub use bound::BoundKey;
pub use consolidate::{Consolidator, consolidate};
pub use error::{BoundError, NodeError, TableError, TraverseError};
pub use free::{FreeHelper, FreeStats, free_chain};
pub use lookup::{ChildLookup, LookupResult, PointLookup, Route, lookup, route};
pub use node::{BaseEntries, BaseNode, Node, NodeKind, NodeRef, NodeRole, UnlinkedNode};
pub use reclaim::retire_chain;
pub use table::{FIRST_NODE_ID, INVALID_NODE_ID, MappingTable, NodeId};
pub use traverse::{ChainHandler, MergeStep, Step, traverse};
