//! Filepath: src/free.rs
//!
//! Free helper: tear down a chain that no reader can reach.
//!
//! The walk visits every node of the chain, both merge branches included,
//! and records it. Nothing is freed while the walk is in progress. After it
//! finishes, removed node ids are released in the mapping table, every delta
//! goes back to its owning base node's allocator, and the base nodes are
//! destroyed last, once their allocators report no live deltas.

use std::ptr::NonNull;

use crate::error::{NodeError, TraverseError};
use crate::node::{
    BaseNode, InnerDeleteDelta, InnerInsertDelta, LeafEntryDelta, MergeDelta, Node, NodeRef,
    RemoveDelta, SplitDelta,
};
use crate::table::{MappingTable, NodeId};
use crate::traverse::{ChainHandler, MergeStep, Step, traverse};
use crate::tracing_helpers::debug_log;

/// Counts reported by [`free_chain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeStats {
    /// Delta records returned to their allocators.
    pub deltas: usize,
    /// Base nodes destroyed (more than one after a merge).
    pub bases: usize,
    /// Node ids released because of remove deltas.
    pub released: usize,
}

/// Chain handler that collects every node of a chain for destruction.
#[derive(Debug)]
pub struct FreeHelper<K, V> {
    deltas: Vec<NonNull<Node<K, V>>>,
    bases: Vec<NonNull<Node<K, V>>>,
    removed: Vec<NodeId>,
}

impl<K, V> Default for FreeHelper<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FreeHelper<K, V> {
    /// An empty helper.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deltas: Vec::new(),
            bases: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Release every removed id in `table`.
    ///
    /// # Errors
    /// [`TraverseError::Table`] if an id does not index a slot.
    pub fn release_removed<const CAPACITY: usize>(
        &self,
        table: &MappingTable<Node<K, V>, CAPACITY>,
    ) -> Result<usize, TraverseError> {
        for &id in &self.removed {
            table.release(id)?;
        }
        Ok(self.removed.len())
    }

    /// Destroy every collected node: deltas first, then base nodes.
    ///
    /// # Errors
    /// [`NodeError::LiveDeltas`] if a base node still has deltas that were
    /// not part of the walked chain (e.g. an undropped conflict handle).
    /// That base node and the ones after it are leaked.
    ///
    /// # Safety
    /// The walked chain must be unreachable by any reader and must not be
    /// freed by anyone else.
    pub unsafe fn destroy(self) -> Result<FreeStats, NodeError> {
        for &delta in &self.deltas {
            // SAFETY: caller guarantees exclusive ownership of the chain.
            unsafe { Node::destroy_delta(delta)? };
        }
        for &base in &self.bases {
            // SAFETY: as above; all of this base's chain deltas are gone.
            unsafe { Node::destroy_base(base)? };
        }

        Ok(FreeStats {
            deltas: self.deltas.len(),
            bases: self.bases.len(),
            released: 0,
        })
    }

    fn record(&mut self, node: NodeRef<'_, K, V>) -> Step {
        self.deltas.push(node.as_ptr());
        Step::Continue
    }
}

impl<'a, K, V> ChainHandler<'a, K, V> for FreeHelper<K, V> {
    fn leaf_base(
        &mut self,
        node: NodeRef<'a, K, V>,
        _base: &'a BaseNode<K, V>,
    ) -> Result<(), TraverseError> {
        self.bases.push(node.as_ptr());
        Ok(())
    }

    fn inner_base(
        &mut self,
        node: NodeRef<'a, K, V>,
        _base: &'a BaseNode<K, NodeId>,
    ) -> Result<(), TraverseError> {
        self.bases.push(node.as_ptr());
        Ok(())
    }

    fn leaf_insert(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Ok(self.record(node))
    }

    fn leaf_delete(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a LeafEntryDelta<K, V>,
    ) -> Result<Step, TraverseError> {
        Ok(self.record(node))
    }

    fn inner_insert(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a InnerInsertDelta<K>,
    ) -> Result<Step, TraverseError> {
        Ok(self.record(node))
    }

    fn inner_delete(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a InnerDeleteDelta<K>,
    ) -> Result<Step, TraverseError> {
        Ok(self.record(node))
    }

    fn split(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a SplitDelta<K>,
    ) -> Result<Step, TraverseError> {
        Ok(self.record(node))
    }

    fn remove(
        &mut self,
        node: NodeRef<'a, K, V>,
        delta: &'a RemoveDelta,
    ) -> Result<Step, TraverseError> {
        self.removed.push(delta.removed_id());
        Ok(self.record(node))
    }

    fn merge_enter(
        &mut self,
        node: NodeRef<'a, K, V>,
        _delta: &'a MergeDelta<K, V>,
    ) -> Result<MergeStep, TraverseError> {
        self.record(node);
        Ok(MergeStep::Both)
    }
}

/// Free an entire chain immediately.
///
/// Releases the ids named by remove deltas, then destroys every delta and
/// base node reachable from `head`, absorbed merge siblings included.
///
/// # Errors
/// - [`TraverseError::BrokenChain`] for a malformed chain; nothing is freed
/// - [`TraverseError::Node`] if destruction fails part way (see
///   [`FreeHelper::destroy`])
///
/// # Safety
/// No reader may hold a pointer into the chain and nobody else may free it.
/// Under concurrency use [`retire_chain`](crate::reclaim::retire_chain).
pub unsafe fn free_chain<K, V, const CAPACITY: usize>(
    table: &MappingTable<Node<K, V>, CAPACITY>,
    head: NonNull<Node<K, V>>,
) -> Result<FreeStats, TraverseError> {
    let mut helper: FreeHelper<K, V> = FreeHelper::new();
    // SAFETY: caller guarantees the chain is alive until we free it.
    traverse(unsafe { NodeRef::from_raw(head) }, &mut helper)?;

    let released: usize = helper.release_removed(table)?;
    // SAFETY: caller guarantees exclusive ownership.
    let destroyed: FreeStats = unsafe { helper.destroy()? };
    let stats = FreeStats {
        released,
        ..destroyed
    };

    debug_log!(
        deltas = stats.deltas,
        bases = stats.bases,
        released = stats.released,
        "chain freed"
    );
    Ok(stats)
}

// ============================================================================
//  Tests
// ============================================================================
