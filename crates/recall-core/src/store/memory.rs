//! In-memory [`ItemStore`] implementation.
//!
//! Items live in a `HashMap` keyed by identity behind a single
//! `parking_lot::RwLock`. Inserts hold the write lock only for the
//! check-and-insert; neighbor search clones the `Arc<Item>` handles under
//! the read lock and scores them after releasing it. Vector search is
//! brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{RecallError, Result};
use crate::fingerprint::clean_external_id;
use crate::models::{rank_order, InsertOutcome, Item, NewItem, ScoredItem};
use crate::normalize::normalize;

use super::ItemStore;

#[derive(Default)]
struct Inner {
    items: HashMap<String, Arc<Item>>,
    dims: Option<usize>,
}

/// Memory-resident item store.
///
/// Dimensionality is either fixed up front ([`with_dims`](Self::with_dims))
/// or by the first successful insert.
pub struct InMemoryItemStore {
    inner: RwLock<Inner>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// A store that only accepts vectors of length `dims`.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                dims: Some(dims),
            }),
        }
    }

    fn insert_sync(&self, candidate: NewItem) -> Result<InsertOutcome> {
        if candidate.text.trim().is_empty() {
            return Err(RecallError::validation("item text must not be empty"));
        }
        if candidate.vector.is_empty() {
            return Err(RecallError::validation("item vector must not be empty"));
        }
        if clean_external_id(candidate.external_id.as_deref()).is_none()
            && normalize(&candidate.text).is_empty()
        {
            return Err(RecallError::validation(
                "item text has no content after normalization and no external id",
            ));
        }

        // Fingerprinting is pure; do it before taking the lock.
        let item = candidate.into_item(Utc::now());

        let mut inner = self.inner.write();
        if let Some(expected) = inner.dims {
            if item.vector.len() != expected {
                return Err(RecallError::DimensionMismatch {
                    expected,
                    got: item.vector.len(),
                });
            }
        }
        if inner.items.contains_key(&item.identity) {
            return Ok(InsertOutcome::Duplicate {
                existing_identity: item.identity,
            });
        }

        inner.dims.get_or_insert(item.vector.len());
        let identity = item.identity.clone();
        inner.items.insert(identity.clone(), Arc::new(item));
        Ok(InsertOutcome::Inserted { identity })
    }

    fn search_sync(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>> {
        let snapshot: Vec<Arc<Item>> = {
            let inner = self.inner.read();
            if let Some(expected) = inner.dims {
                if query.len() != expected {
                    return Err(RecallError::DimensionMismatch {
                        expected,
                        got: query.len(),
                    });
                }
            }
            if k == 0 {
                return Ok(Vec::new());
            }
            inner.items.values().cloned().collect()
        };

        let mut scored: Vec<ScoredItem> = snapshot
            .into_iter()
            .map(|item| ScoredItem {
                score: cosine_similarity(query, &item.vector),
                item,
            })
            .collect();
        scored.sort_by(rank_order);
        scored.truncate(k);
        Ok(scored)
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn insert_if_absent(&self, item: NewItem) -> Result<InsertOutcome> {
        self.insert_sync(item)
    }

    async fn get_by_id(&self, identity: &str) -> Result<Option<Arc<Item>>> {
        Ok(self.inner.read().items.get(identity).cloned())
    }

    async fn nearest_neighbors(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>> {
        self.search_sync(query, k)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner.read().items.len())
    }

    fn dims(&self) -> Option<usize> {
        self.inner.read().dims
    }
}
