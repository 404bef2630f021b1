// # Store Implementations
//
// This module provides implementations of the repository traits for
// different persistence strategies.

pub mod file;
pub mod memory;
pub mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use tables::{TableEntity, Tables};
