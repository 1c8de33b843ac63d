//! Transactional storage boundary for parts, purchase orders and history.
//!
//! The ledger talks only to the traits in [`r#trait`]; adapters decide how
//! atomicity and row locking are actually achieved.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::{PostgresLedgerStore, PostgresUsageLog};
pub use r#trait::{
    HistoryRepository, LedgerStore, LedgerTransaction, OrderRepository, PartRepository, StoreError,
};
