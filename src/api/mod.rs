//! API Module
//!
//! HTTP surface over the batch catalog.

mod errors;
mod server;


pub use server::{AppState, Server, content_type, image_url, router};
