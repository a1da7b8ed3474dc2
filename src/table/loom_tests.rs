//! Loom tests for mapping-table slot semantics.
//!
//! Loom explores every interleaving of a small model, so these tests mirror
//! the table with loom atomics instead of driving `MappingTable` itself:
//! a fetch-add id counter plus one CAS-updated slot per id.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib table::loom_tests`

use loom::sync::Arc;
use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use loom::thread;

const SLOTS: usize = 4;

/// Minimal mapping table: slot values stand in for head pointers.
struct LoomTable {
    next_id: AtomicU64,
    slots: Vec<AtomicUsize>,
}

impl LoomTable {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            slots: (0..SLOTS).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn allocate(&self, head: usize) -> Option<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = self.slots.get(usize::try_from(id).ok()?)?;
        slot.store(head, Ordering::Release);
        Some(id)
    }

    fn cas(&self, id: u64, expected: usize, new: usize) -> bool {
        self.slots[id as usize]
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn get(&self, id: u64) -> usize {
        self.slots[id as usize].load(Ordering::Acquire)
    }
}

#[test]
fn loom_concurrent_allocation_unique() {
    loom::model(|| {
        let table = Arc::new(LoomTable::new());

        let handles: Vec<_> = (0..2)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.allocate(t + 1).unwrap())
            })
            .collect();

        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    });
}

#[test]
fn loom_cas_single_winner() {
    loom::model(|| {
        let table = Arc::new(LoomTable::new());
        let id = table.allocate(1).unwrap();

        let handles: Vec<_> = [10usize, 20]
            .into_iter()
            .map(|new_head| {
                let table = Arc::clone(&table);
                thread::spawn(move || (new_head, table.cas(id, 1, new_head)))
            })
            .collect();

        let results: Vec<(usize, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<usize> = results
            .iter()
            .filter(|(_, won)| *won)
            .map(|(head, _)| *head)
            .collect();

        assert_eq!(winners.len(), 1);
        assert_eq!(table.get(id), winners[0]);
    });
}
