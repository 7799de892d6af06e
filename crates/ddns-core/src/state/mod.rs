// # State Store Implementations
//
// This module provides implementations of the StateStore trait for
// different persistence strategies.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
