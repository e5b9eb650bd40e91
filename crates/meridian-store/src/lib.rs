// crates/meridian-store/src/lib.rs
//
// meridian-store: Storage layer for the Meridian validator node.
//
// Provides two `KvStore` backends (RocksDB with a pending-write overlay that
// is flushed atomically on commit, and a plain in-memory map) and the typed
// node `Store` that keeps events, the per-epoch DAG index, epoch state and
// sealed blocks on top of either backend.

pub mod memory;
pub mod rocks;
pub mod store;

// Re-export key types for ergonomic access from downstream crates.
pub use memory::MemoryKv;
pub use rocks::RocksKv;
pub use store::{EpochState, Store};
