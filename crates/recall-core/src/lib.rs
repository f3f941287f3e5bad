//! # Recall Core
//!
//! Runtime-free logic for Recall: text normalization, content
//! fingerprints, the item model, the [`store::ItemStore`] abstraction with
//! an in-memory backend, the widening retrieval planner, and the bounded
//! seen-set used by capture clients.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Provider
//! adapters (embeddings, completions) are expressed as traits in
//! [`embedding`] and implemented by the application crate.

pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod normalize;
pub mod retrieve;
pub mod seen;
pub mod store;

pub use error::{RecallError, Result};
