//! Core data models: stored items, insert candidates, and ranked results.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::fingerprint::{clean_external_id, fingerprint, identity_for};

/// A stored, embedded, deduplicated unit of captured text.
///
/// Created exactly once by a successful insert and never mutated
/// afterwards. Stores hand out `Arc<Item>` so ranked results share the
/// stored allocation.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    /// Deduplication key (`id:<external id>` or `text:<fingerprint>`).
    pub identity: String,
    /// Canonical content as captured (not normalized).
    pub text: String,
    /// SHA-1 of the normalized text.
    pub text_fingerprint: String,
    /// Source-system id, when the caller supplied one.
    pub external_id: Option<String>,
    /// Embedding computed before insert. Length is fixed per store.
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Auxiliary attributes. Not used for identity or ranking.
    pub metadata: Map<String, Value>,
    /// Caller-supplied observation time (defaults to insert time).
    pub observed_at: DateTime<Utc>,
    /// Store-assigned insert time.
    pub inserted_at: DateTime<Utc>,
}

/// An insert candidate. The store derives identity and fingerprint from it.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub text: String,
    pub external_id: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
    pub vector: Vec<f32>,
}

impl NewItem {
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            external_id: None,
            observed_at: None,
            metadata: Map::new(),
            vector,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize the stored [`Item`], stamping `inserted_at`.
    pub fn into_item(self, inserted_at: DateTime<Utc>) -> Item {
        let text_fingerprint = fingerprint(&self.text);
        let external_id = clean_external_id(self.external_id.as_deref()).map(str::to_string);
        let identity = identity_for(external_id.as_deref(), &text_fingerprint);
        Item {
            identity,
            text: self.text,
            text_fingerprint,
            external_id,
            vector: self.vector,
            metadata: self.metadata,
            observed_at: self.observed_at.unwrap_or(inserted_at),
            inserted_at,
        }
    }
}

/// Result of [`ItemStore::insert_if_absent`](crate::store::ItemStore::insert_if_absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The candidate was new and is now stored under `identity`.
    Inserted { identity: String },
    /// An item with the same identity already exists; nothing changed.
    Duplicate { existing_identity: String },
}

impl InsertOutcome {
    pub fn inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }

    pub fn identity(&self) -> &str {
        match self {
            InsertOutcome::Inserted { identity } => identity,
            InsertOutcome::Duplicate { existing_identity } => existing_identity,
        }
    }
}

/// A stored item paired with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: Arc<Item>,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Rank order for neighbor results: score (desc), then `observed_at`
/// (desc, more recent wins), then identity (asc) so output is deterministic.
/// A NaN score ranks below every real score.
pub fn rank_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    rank_score(b.score)
        .total_cmp(&rank_score(a.score))
        .then_with(|| b.item.observed_at.cmp(&a.item.observed_at))
        .then_with(|| a.item.identity.cmp(&b.item.identity))
}

fn rank_score(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_into_item_derives_identity() {
        let now = Utc::now();
        let item = NewItem::new("Hello   World", vec![1.0]).into_item(now);
        assert_eq!(item.identity, format!("text:{}", item.text_fingerprint));
        assert_eq!(item.text, "Hello   World");
        assert_eq!(item.observed_at, now);
        assert_eq!(item.inserted_at, now);
    }

    #[test]
    fn test_into_item_trims_external_id() {
        let item = NewItem::new("x", vec![1.0])
            .with_external_id(" 99 ")
            .into_item(Utc::now());
        assert_eq!(item.identity, "id:99");
        assert_eq!(item.external_id.as_deref(), Some("99"));

        let blank = NewItem::new("x", vec![1.0])
            .with_external_id("  ")
            .into_item(Utc::now());
        assert!(blank.external_id.is_none());
        assert!(blank.identity.starts_with("text:"));
    }

    #[test]
    fn test_rank_order_breaks_ties_by_recency() {
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let a = ScoredItem {
            item: Arc::new(NewItem::new("a", vec![1.0]).observed_at(old).into_item(new)),
            score: 0.5,
        };
        let b = ScoredItem {
            item: Arc::new(NewItem::new("b", vec![1.0]).observed_at(new).into_item(new)),
            score: 0.5,
        };
        let mut ranked = vec![a, b];
        ranked.sort_by(rank_order);
        assert_eq!(ranked[0].item.text, "b");
    }

    #[test]
    fn test_rank_order_sinks_nan_scores() {
        let now = Utc::now();
        let scored = |text: &str, score: f32| ScoredItem {
            item: Arc::new(NewItem::new(text, vec![1.0]).into_item(now)),
            score,
        };
        let mut ranked: Vec<ScoredItem> = (0..40)
            .map(|i| match i % 3 {
                0 => scored(&format!("nan {}", i), f32::NAN),
                1 => scored(&format!("low {}", i), 0.1),
                _ => scored(&format!("high {}", i), 0.9),
            })
            .collect();
        ranked.sort_by(rank_order);
        assert!(ranked[0].item.text.starts_with("high"));
        assert!(ranked.last().unwrap().score.is_nan());
        let first_nan = ranked.iter().position(|s| s.score.is_nan()).unwrap();
        assert!(ranked[first_nan..].iter().all(|s| s.score.is_nan()));
    }

    #[test]
    fn test_insert_outcome_accessors() {
        let ins = InsertOutcome::Inserted {
            identity: "id:1".into(),
        };
        let dup = InsertOutcome::Duplicate {
            existing_identity: "id:1".into(),
        };
        assert!(ins.inserted());
        assert!(!dup.inserted());
        assert_eq!(dup.identity(), "id:1");
    }
}
