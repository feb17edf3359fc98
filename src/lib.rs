//! This crate persists print-layout batches: a title, grid geometry and an
//! ordered list of images, stored one directory per batch, together with a
//! lazily built in-memory index used for listings and a thin HTTP surface.

pub mod types; // Batch records, summaries, grid geometry and placements.
pub mod error; // Error taxonomy shared by every layer.
pub mod id; // Date-prefixed batch id generation.
pub mod storage; // Config document and image blob stores on the filesystem.
pub mod index; // In-memory summary index.
pub mod repository; // Batch create/get/delete/print operations.
pub mod catalog; // Boundary operations used by the HTTP layer.
pub mod api; // HTTP endpoints.
pub mod config; // Defines and loads server configuration.

// Re-export commonly used types for easier access.
pub use types::*;
pub use error::{Result, StoreError};
pub use config::Config;
pub use catalog::Catalog;
pub use repository::BatchRepository;
