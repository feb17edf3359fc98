//! Id Generator Module
//!
//! Produces batch identifiers made of a calendar-date prefix and a short
//! random suffix. Pure computation: no I/O, never fails.

mod generator;
pub use generator::{SUFFIX_LEN, generate, generate_at};
