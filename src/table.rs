//! Filepath: src/table.rs
//!
//! Mapping table: logical node id to physical chain head.
//!
//! The table is the single indirection point of the tree. A node's visible
//! state changes only by a CAS on its slot, which gives a linearizable order
//! of updates per node id. There is no ordering across different ids beyond
//! what the caller's split/merge protocol establishes.
//!
//! # Capacity
//!
//! Capacity is fixed by the `CAPACITY` const parameter. Ids are handed out
//! monotonically from [`FIRST_NODE_ID`] and never recycled: [`MappingTable::release`]
//! only unlinks the slot. Running past the end is reported as
//! [`TableError::Exhausted`].
//!
//! # Reclamation
//!
//! The table owns the [`seize::Collector`] that protects chains loaded from
//! it. Readers enter a [`guard`](MappingTable::guard) before dereferencing a
//! head; writers that replace a chain retire the old one through the same
//! guard (see [`crate::reclaim`]).

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU64};

use seize::{Collector, LocalGuard};

use crate::error::TableError;
use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, READ_ORD, RELAXED, WRITE_ORD};
use crate::tracing_helpers::{trace_log, warn_log};

#[cfg(all(test, loom))]
mod loom_tests;

/// Logical node identifier: an index into the mapping table.
pub type NodeId = u64;

/// Sentinel id that never resolves to a slot.
pub const INVALID_NODE_ID: NodeId = NodeId::MAX;

/// First id handed out by a fresh table.
pub const FIRST_NODE_ID: NodeId = 0;

/// Default capacity used by the crate's tests and benches.
pub const DEFAULT_TABLE_CAPACITY: usize = 1 << 20;

// ============================================================================
//  MappingTable
// ============================================================================

/// Fixed-capacity array of atomic chain-head pointers.
///
/// # Type Parameters
/// * `T` - Element type of the slots (a [`Node`](crate::node::Node) in a tree)
/// * `CAPACITY` - Number of slots
///
/// # Invariants
/// - `next_id` is the number of ids handed out (saturates past `CAPACITY`)
/// - A live id resolves to a valid chain head; a released or never
///   allocated id resolves to null
///
/// # Thread Safety
///
/// The table hands `*mut T` out to any thread holding a reference, so it is
/// `Send`/`Sync` only when `T` is. A table of nodes with thread-local values
/// stays on its thread:
///
/// ```compile_fail
/// use std::rc::Rc;
/// use bwtree_core::{MappingTable, Node};
///
/// fn shared<T: Sync>() {}
/// shared::<MappingTable<Node<u64, Rc<u64>>, 4>>();
/// ```
pub struct MappingTable<T, const CAPACITY: usize = DEFAULT_TABLE_CAPACITY> {
    slots: Box<[AtomicPtr<T>]>,
    next_id: AtomicU64,
    collector: Collector,
    _chains: PhantomData<T>,
}

impl<T, const CAPACITY: usize> StdFmt::Debug for MappingTable<T, CAPACITY> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("MappingTable")
            .field("capacity", &CAPACITY)
            .field("allocated", &self.allocated())
            .finish_non_exhaustive()
    }
}

impl<T, const CAPACITY: usize> MappingTable<T, CAPACITY> {
    const CAPACITY_CHECK: () = assert!(CAPACITY > 0, "CAPACITY must be at least 1");

    /// Create an empty table with every slot null.
    #[must_use]
    pub fn new() -> Self {
        let () = Self::CAPACITY_CHECK;

        let slots: Box<[AtomicPtr<T>]> = (0..CAPACITY)
            .map(|_| AtomicPtr::new(StdPtr::null_mut()))
            .collect();

        Self {
            slots,
            next_id: AtomicU64::new(FIRST_NODE_ID),
            collector: Collector::new(),
            _chains: PhantomData,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Number of ids handed out so far (never more than `CAPACITY`).
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> usize {
        let next: u64 = self.next_id.load(RELAXED);
        usize::try_from(next).map_or(CAPACITY, |n| n.min(CAPACITY))
    }

    /// Enter a protected region.
    ///
    /// Chain heads loaded while the guard is alive are not reclaimed until it
    /// drops, even if a concurrent writer retires them.
    #[must_use]
    #[inline(always)]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// The collector guarding chains published through this table.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Allocate a fresh id and publish `initial` in its slot.
    ///
    /// # Errors
    /// [`TableError::Exhausted`] once every slot has been handed out. The
    /// counter stays saturated; later calls keep failing until [`reset`](Self::reset).
    pub fn allocate(&self, initial: *mut T) -> Result<NodeId, TableError> {
        let id: NodeId = self.next_id.fetch_add(1, RELAXED);

        let Some(slot) = self.slot(id) else {
            warn_log!(id, capacity = CAPACITY, "mapping table exhausted");
            return Err(TableError::Exhausted { capacity: CAPACITY });
        };

        slot.store(initial, WRITE_ORD);
        trace_log!(id, "allocated node id");
        Ok(id)
    }

    /// Load the current chain head for `id`.
    ///
    /// Returns null for a released or never allocated id.
    ///
    /// # Errors
    /// [`TableError::OutOfRange`] if `id` does not index a slot.
    #[inline]
    pub fn get(&self, id: NodeId) -> Result<*mut T, TableError> {
        self.checked_slot(id).map(|slot| slot.load(READ_ORD))
    }

    /// Replace the chain head for `id` if it is still `expected`.
    ///
    /// This is the only primitive that changes a node's visible state. Of any
    /// number of concurrent calls with the same `expected`, exactly one returns
    /// `true`.
    ///
    /// # Errors
    /// [`TableError::OutOfRange`] if `id` does not index a slot.
    #[inline]
    pub fn compare_and_swap(
        &self,
        id: NodeId,
        expected: *mut T,
        new: *mut T,
    ) -> Result<bool, TableError> {
        let slot: &AtomicPtr<T> = self.checked_slot(id)?;
        let swapped: bool = slot
            .compare_exchange(expected, new, CAS_SUCCESS, CAS_FAILURE)
            .is_ok();

        if !swapped {
            trace_log!(id, "head CAS lost");
        }
        Ok(swapped)
    }

    /// Unlink `id` from its chain.
    ///
    /// The slot reads as null afterwards. The id itself is not recycled.
    ///
    /// # Errors
    /// [`TableError::OutOfRange`] if `id` does not index a slot.
    pub fn release(&self, id: NodeId) -> Result<(), TableError> {
        let slot: &AtomicPtr<T> = self.checked_slot(id)?;
        slot.store(StdPtr::null_mut(), WRITE_ORD);
        trace_log!(id, "released node id");
        Ok(())
    }

    /// Whether `id` currently resolves to no chain.
    ///
    /// # Errors
    /// [`TableError::OutOfRange`] if `id` does not index a slot.
    pub fn is_released(&self, id: NodeId) -> Result<bool, TableError> {
        self.get(id).map(<*mut T>::is_null)
    }

    /// Return the table to its pristine state.
    ///
    /// Takes `&mut self`: only for reuse between test scenarios, never on a
    /// live tree. Chains still referenced by slots are not freed.
    pub fn reset(&mut self) {
        for slot in &mut *self.slots {
            *slot.get_mut() = StdPtr::null_mut();
        }
        *self.next_id.get_mut() = FIRST_NODE_ID;
    }

    #[inline(always)]
    fn slot(&self, id: NodeId) -> Option<&AtomicPtr<T>> {
        usize::try_from(id).ok().and_then(|idx| self.slots.get(idx))
    }

    #[inline(always)]
    fn checked_slot(&self, id: NodeId) -> Result<&AtomicPtr<T>, TableError> {
        self.slot(id).ok_or(TableError::OutOfRange {
            id,
            capacity: CAPACITY,
        })
    }
}

impl<T, const CAPACITY: usize> Default for MappingTable<T, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
//  Tests
// ============================================================================
