//! Storage abstraction for captured items.
//!
//! The [`ItemStore`] trait defines the operations the retrieval planner
//! and the orchestration layer need, so backends (in-memory, an embedded
//! or networked vector index) can be swapped without changing contracts.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{InsertOutcome, Item, NewItem, ScoredItem};

pub use memory::InMemoryItemStore;

/// Abstract item store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_if_absent`](ItemStore::insert_if_absent) | Atomic check-and-insert by identity |
/// | [`get_by_id`](ItemStore::get_by_id) | Look up an item by identity |
/// | [`nearest_neighbors`](ItemStore::nearest_neighbors) | Cosine-ranked neighbor search |
/// | [`count`](ItemStore::count) | Number of stored items |
///
/// Items are never overwritten. A backend that adds eviction must remove
/// whole items by identity so identity semantics stay unchanged.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Store `item` unless an item with the same identity exists.
    ///
    /// Exactly one of any set of racing calls for one identity observes
    /// [`InsertOutcome::Inserted`]; the rest observe
    /// [`InsertOutcome::Duplicate`]. Fails with
    /// [`DimensionMismatch`](crate::RecallError::DimensionMismatch) when the
    /// vector length differs from the store's fixed length.
    async fn insert_if_absent(&self, item: NewItem) -> Result<InsertOutcome>;

    /// Retrieve an item by identity.
    async fn get_by_id(&self, identity: &str) -> Result<Option<Arc<Item>>>;

    /// Up to `k` items ranked by descending cosine similarity to `query`,
    /// ties broken by more recent `observed_at`.
    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>>;

    /// Total items currently stored.
    async fn count(&self) -> Result<usize>;

    /// Fixed vector length, once known.
    fn dims(&self) -> Option<usize>;
}
