//! Standard memory orderings for mapping-table slots.
//!
//! Chain heads are published through a single atomic slot per node id, so
//! every access point uses one of these constants to keep the pairing
//! between publishers and readers explicit.

use std::sync::atomic::Ordering;

/// Ordering for loading a chain head out of a slot.
/// Pairs with the publisher's Release store or CAS.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for storing a freshly allocated chain head.
/// Pairs with reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for a successful head CAS (delta install, consolidation).
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Ordering for CAS failure.
/// Only need to see the current head.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for counters that carry no data dependency
/// (allocation counter, delta accounting).
pub const RELAXED: Ordering = Ordering::Relaxed;
