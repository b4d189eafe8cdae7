// crates/hodl-store/src/lib.rs
//
// hodl-store: Ledger Store for the HODL staking ledger.
//
// Provides the RocksDB-backed persistent state for users, epochs, and
// per-user-per-epoch records. All mutation goes through `LedgerTxn`, a
// pessimistic RocksDB transaction with row-level locks; reads outside a
// transaction see the latest committed state.

pub mod keys;
pub mod rocks;

// Re-export key types for ergonomic access from downstream crates.
pub use rocks::{LedgerStore, LedgerTxn, LockMode, StoreOptions};
