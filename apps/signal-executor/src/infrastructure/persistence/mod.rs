//! Persistence Adapters
//!
//! SQLite implementations of the storage ports, plus in-memory
//! equivalents for tests.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::{InMemoryIntakeStore, InMemoryLedger, InMemoryOrderQueue, InMemorySettings};
pub use sqlite::{
    SqliteIntakeStore, SqliteLedger, SqliteOrderQueue, SqliteSettings, connect_pool,
    connect_in_memory,
};
