//! Batch Index Module
//!
//! A lazily built, in-memory cache of batch summaries used for listings.
//! It is never the system of record: it starts empty on every process start,
//! is rebuilt from the config store on first use, and may lag storage but
//! must not expose ids the repository has deleted.

mod cache;
pub use cache::BatchIndex;
