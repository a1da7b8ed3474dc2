//! Benchmarks for the mapping table using divan.
//!
//! Run with: `cargo bench --bench mapping_table`

use std::ptr;
use std::sync::Arc;
use std::thread;

use bwtree_core::MappingTable;
use divan::{Bencher, black_box};

fn main() {
    divan::main();
}

const CAPACITY: usize = 1 << 16;

// =============================================================================
// Single-threaded slot operations
// =============================================================================

mod single {
    use super::{Bencher, CAPACITY, MappingTable, black_box, ptr};

    #[divan::bench(sample_count = 100)]
    fn allocate(bencher: Bencher<'_, '_>) {
        bencher
            .with_inputs(MappingTable::<u64, CAPACITY>::new)
            .bench_local_refs(|table| {
                for _ in 0..1024 {
                    black_box(table.allocate(ptr::null_mut()).ok());
                }
            });
    }

    #[divan::bench(sample_count = 200, sample_size = 10000)]
    fn get(bencher: Bencher<'_, '_>) {
        let table: MappingTable<u64, CAPACITY> = MappingTable::new();
        let id = table.allocate(ptr::null_mut()).unwrap_or_default();
        bencher.bench_local(|| black_box(table.get(black_box(id)).ok()));
    }

    #[divan::bench(sample_count = 200, sample_size = 10000)]
    fn compare_and_swap(bencher: Bencher<'_, '_>) {
        let mut a = 1_u64;
        let mut b = 2_u64;
        let (pa, pb): (*mut u64, *mut u64) = (&raw mut a, &raw mut b);

        let table: MappingTable<u64, CAPACITY> = MappingTable::new();
        let id = table.allocate(pa).unwrap_or_default();
        let mut flip = false;
        bencher.bench_local(|| {
            let (old, new) = if flip { (pb, pa) } else { (pa, pb) };
            flip = !flip;
            black_box(table.compare_and_swap(id, old, new).ok())
        });
    }

    #[divan::bench(sample_count = 200, sample_size = 10000)]
    fn guard(bencher: Bencher<'_, '_>) {
        let table: MappingTable<u64, CAPACITY> = MappingTable::new();
        bencher.bench_local(|| black_box(table.guard()));
    }
}

// =============================================================================
// Contended allocation
// =============================================================================

#[divan::bench(args = [2, 4, 8], sample_count = 50)]
fn allocate_contended(bencher: Bencher<'_, '_>, threads: usize) {
    bencher
        .with_inputs(|| Arc::new(MappingTable::<u64, CAPACITY>::new()))
        .bench_local_values(|table| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let table = Arc::clone(&table);
                    thread::spawn(move || {
                        for _ in 0..(4096 / threads) {
                            black_box(table.allocate(ptr::null_mut()).ok());
                        }
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        });
}
