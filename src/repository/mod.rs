//! Repository Module
//!
//! The batch repository and the per-id lock table that serializes its
//! mutations.

mod batches;
mod locks;


pub use batches::{BatchRepository, DEFAULT_EXTENSION};
pub use locks::LockTable;
