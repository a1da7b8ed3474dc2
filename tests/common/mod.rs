//! Tracing setup shared by the integration tests.
//!
//! Build with `--features tracing` to see the crate's own events. Append
//! events carry `node_id` (mapping table slot), `kind` (kind of the delta)
//! and the new head's `height` and `size`. Consolidation reports `role` and
//! `old_height`; freeing a chain reports `released`, `deltas` and `bases`.
//!
//! - `RUST_LOG` filters as usual, default `info`
//! - `BWTREE_LOG_DIR` moves the NDJSON file (default `logs/bwtree.jsonl`)
//! - `BWTREE_LOG_CONSOLE=1` adds a compact console layer
//!
//! ```bash
//! RUST_LOG=bwtree_core=debug cargo test --features tracing --test delta_chain
//! jq 'select(.fields.node_id == 3)' logs/bwtree.jsonl
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the subscriber once per test binary; later calls do nothing.
pub fn init_tracing() {
    INIT.call_once(|| {
        let dir = std::env::var("BWTREE_LOG_DIR")
            .map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
        if fs::create_dir_all(&dir).is_err() {
            return;
        }
        // Append: nextest runs every test in its own process.
        let Ok(file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("bwtree.jsonl"))
        else {
            return;
        };

        let json = tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_thread_ids(true)
            .with_target(true)
            .json()
            .with_filter(filter());

        let console = std::env::var("BWTREE_LOG_CONSOLE")
            .is_ok_and(|v| v == "1")
            .then(|| {
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .compact()
                    .with_filter(filter())
            });

        // Another subscriber may already be installed; keep it.
        let _ = Registry::default().with(json).with(console).try_init();
    });
}
