//! Filepath: src/reclaim.rs
//!
//! Deferred chain reclamation through `seize`.
//!
//! [`free_chain`](crate::free::free_chain) needs exclusive access. Once a
//! chain has been replaced in the mapping table (for example by a
//! consolidated base node), concurrent readers may still be walking it, so
//! the memory walk is handed to the table's [`Collector`] instead and runs
//! once every guard that could have observed the old head has been dropped.
//!
//! Node ids named by remove deltas are released right away: the slot change
//! only affects readers that load the id afterwards.

use std::ptr::NonNull;

use seize::{Collector, Guard, LocalGuard};

use crate::error::TraverseError;
use crate::free::{FreeHelper, FreeStats};
use crate::node::{Node, NodeRef};
use crate::table::MappingTable;
use crate::traverse::traverse;
use crate::tracing_helpers::{debug_log, error_log};

/// Retire a chain that is no longer reachable from the mapping table.
///
/// Releases the ids of removed nodes immediately and defers destruction of
/// every delta and base node of the chain until no guard can still see it.
/// Returns the number of ids released.
///
/// # Errors
/// [`TraverseError`] from the collecting walk; nothing is retired then.
///
/// # Safety
/// - `head` must have been unlinked from `table` (a successful CAS away)
///   so that no *new* reader can reach it
/// - the chain must be retired at most once
/// - `guard` must come from `table.guard()`
pub unsafe fn retire_chain<K, V, const CAPACITY: usize>(
    table: &MappingTable<Node<K, V>, CAPACITY>,
    head: NonNull<Node<K, V>>,
    guard: &LocalGuard<'_>,
) -> Result<usize, TraverseError> {
    let mut helper: FreeHelper<K, V> = FreeHelper::new();
    // SAFETY: the chain is alive until the collector reclaims it.
    traverse(unsafe { NodeRef::from_raw(head) }, &mut helper)?;
    let released: usize = helper.release_removed(table)?;

    // SAFETY: caller guarantees the chain is unlinked and retired once.
    unsafe { guard.defer_retire(head.as_ptr(), reclaim_chain::<K, V>) };

    debug_log!(released, "chain retired");
    Ok(released)
}

/// Reclaim a retired chain (seize callback).
///
/// # Safety
/// - `ptr` must be the head of a chain passed to [`retire_chain`]
/// - must only be called after seize determines no reader remains
unsafe fn reclaim_chain<K, V>(ptr: *mut Node<K, V>, _collector: &Collector) {
    let Some(head) = NonNull::new(ptr) else {
        return;
    };

    // SAFETY: seize guarantees no reader remains; we own the chain.
    if let Err(_err) = unsafe { destroy_chain(head) } {
        error_log!(error = %_err, "retired chain leaked");
    }
}

/// # Safety
/// Exclusive ownership of the chain at `head`.
unsafe fn destroy_chain<K, V>(head: NonNull<Node<K, V>>) -> Result<FreeStats, TraverseError> {
    let mut helper: FreeHelper<K, V> = FreeHelper::new();
    // SAFETY: caller owns the chain.
    traverse(unsafe { NodeRef::from_raw(head) }, &mut helper)?;
    // SAFETY: as above.
    Ok(unsafe { helper.destroy()? })
}

// ============================================================================
//  Tests
// ============================================================================
