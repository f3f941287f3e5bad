use std::collections::HashSet;

use recall_core::embedding::{Embedder, HashEmbedder};
use recall_core::fingerprint::{fingerprint, resolve_identity};
use recall_core::models::{InsertOutcome, NewItem};
use recall_core::normalize::normalize;
use recall_core::retrieve::{retrieve, retrieve_with_vector, RetrieveRequest};
use recall_core::seen::SeenSet;
use recall_core::store::{InMemoryItemStore, ItemStore};
use recall_core::RecallError;

fn unit(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt()]
}

#[tokio::test]
async fn test_dedup_idempotence() {
    let store = InMemoryItemStore::new();
    let before = store.count().await.unwrap();

    let first = store
        .insert_if_absent(NewItem::new("a post", vec![1.0, 0.0]).with_external_id("123"))
        .await
        .unwrap();
    let second = store
        .insert_if_absent(NewItem::new("a post", vec![1.0, 0.0]).with_external_id("123"))
        .await
        .unwrap();

    assert!(first.inserted());
    assert!(!second.inserted());
    assert_eq!(store.count().await.unwrap(), before + 1);
}

#[test]
fn test_fingerprint_stability() {
    let variants = [
        "The market rallied today",
        "the   market rallied\ttoday",
        "THE MARKET RALLIED TODAY",
        "  The market rallied today  ",
        "The market https://news.example/x?y=1 rallied today",
    ];
    let expected = fingerprint(variants[0]);
    for v in variants {
        assert_eq!(fingerprint(v), expected, "variant {:?}", v);
        assert_eq!(normalize(v), "the market rallied today");
    }
}

#[tokio::test]
async fn test_dimension_guard_any_store_size() {
    for size in [1usize, 2, 10] {
        let store = InMemoryItemStore::new();
        for i in 0..size {
            store
                .insert_if_absent(NewItem::new(format!("item {}", i), vec![1.0, 0.5, i as f32]))
                .await
                .unwrap();
        }
        for bad in [vec![1.0], vec![1.0, 0.0], vec![1.0, 0.0, 0.0, 0.0]] {
            let err = store.nearest_neighbors(&bad, 5).await.unwrap_err();
            assert!(matches!(err, RecallError::DimensionMismatch { expected: 3, .. }));
        }
    }
}

#[tokio::test]
async fn test_widening_correctness_distinct_items() {
    let embedder = HashEmbedder::new(64);
    let store = InMemoryItemStore::new();
    let m = 60;
    for i in 0..m {
        let text = format!("note number {} about topic {}", i, i % 7);
        let vector = embedder.embed(&text).await.unwrap();
        store.insert_if_absent(NewItem::new(text, vector)).await.unwrap();
    }

    for target in [1, 5, 17, 42, m] {
        let req = RetrieveRequest {
            query: "topic 3 note",
            target,
            dedupe: true,
        };
        let out = retrieve(&store, &embedder, &req).await.unwrap();
        assert_eq!(out.items.len(), target);
        let ids: HashSet<&str> = out.items.iter().map(|s| s.item.identity.as_str()).collect();
        assert_eq!(ids.len(), target);
    }
}

#[tokio::test]
async fn test_widening_with_interleaved_duplicates() {
    // Every distinct text is stored three times under different external
    // ids; retrieval must still return `target` distinct texts.
    let store = InMemoryItemStore::new();
    for i in 0..20 {
        let cos = 1.0 - i as f32 * 0.04;
        for copy in 0..3 {
            store
                .insert_if_absent(
                    NewItem::new(format!("story {}", i), unit(cos))
                        .with_external_id(format!("{}-{}", i, copy)),
                )
                .await
                .unwrap();
        }
    }

    let out = retrieve_with_vector(&store, &[1.0, 0.0], 8, true)
        .await
        .unwrap();
    let texts: Vec<&str> = out.items.iter().map(|s| s.item.text.as_str()).collect();
    let expected: Vec<String> = (0..8).map(|i| format!("story {}", i)).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_seen_set_bound() {
    let n = 100;
    let mut seen = SeenSet::new(n);
    for i in 0..n + 5 {
        seen.record(format!("id:{}", i));
    }

    assert_eq!(seen.len(), n);
    for i in 0..5 {
        assert!(!seen.has(&format!("id:{}", i)));
    }
    for i in 5..n + 5 {
        assert!(seen.has(&format!("id:{}", i)));
    }
    let newest: Vec<&str> = seen.iter().skip(n - 5).collect();
    assert_eq!(newest, vec!["id:100", "id:101", "id:102", "id:103", "id:104"]);
}

#[tokio::test]
async fn test_scenario_whitespace_and_case_duplicate() {
    let store = InMemoryItemStore::new();
    let a = store
        .insert_if_absent(NewItem::new("hello world", vec![1.0, 0.0]))
        .await
        .unwrap();
    let b = store
        .insert_if_absent(NewItem::new("Hello   World", vec![1.0, 0.0]))
        .await
        .unwrap();

    assert!(a.inserted());
    assert_eq!(
        b,
        InsertOutcome::Duplicate {
            existing_identity: a.identity().to_string()
        }
    );
    assert_eq!(a.identity(), resolve_identity(None, "hello world"));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_scenario_dedupe_prefers_distinct_low_score() {
    let store = InMemoryItemStore::new();
    store
        .insert_if_absent(NewItem::new("Breaking News", unit(0.9)).with_external_id("a"))
        .await
        .unwrap();
    store
        .insert_if_absent(NewItem::new("breaking   news", unit(0.9)).with_external_id("b"))
        .await
        .unwrap();
    store
        .insert_if_absent(NewItem::new("unrelated", unit(0.1)).with_external_id("c"))
        .await
        .unwrap();

    let out = retrieve_with_vector(&store, &[1.0, 0.0], 2, true)
        .await
        .unwrap();
    assert_eq!(out.items.len(), 2);
    assert_eq!(out.items[0].item.text_fingerprint, fingerprint("breaking news"));
    assert!((out.items[0].score - 0.9).abs() < 1e-4);
    assert_eq!(out.items[1].item.external_id.as_deref(), Some("c"));
    assert!((out.items[1].score - 0.1).abs() < 1e-4);
}

#[tokio::test]
async fn test_scenario_empty_store() {
    let store = InMemoryItemStore::new();
    let embedder = HashEmbedder::default();
    let req = RetrieveRequest {
        query: "what happened today",
        target: 10,
        dedupe: true,
    };
    let err = retrieve(&store, &embedder, &req).await.unwrap_err();
    assert_eq!(err, RecallError::EmptyResult);
    assert!(err.is_recoverable());
}
