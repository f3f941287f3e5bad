//! Widening retrieval with identity-level dedupe.
//!
//! A single neighbor query of size `target` can come back with fewer than
//! `target` logically distinct items when near-duplicates rank highly.
//! The planner therefore over-fetches and widens:
//!
//! 1. Start at `k = max(t, min(2t, 50))` with a ceiling `maxK = min(5t, 500)`.
//! 2. Fetch `k` neighbors and scan them in rank order, accepting a
//!    candidate only when none of its keys (external id, fingerprint, or
//!    raw identity for items carrying neither) was seen earlier in the scan.
//! 3. Stop once `t` items are accepted, when a fetch returns fewer than
//!    `k` (the store is exhausted), or when `k` has reached `maxK`.
//!    Otherwise grow `k` by `t` (capped at `maxK`) and rescan.
//!
//! The ceiling bounds the work: under heavy duplicate density the planner
//! returns fewer than `t` items instead of scanning the whole corpus.
//!
//! With dedupe off the planner issues one `nearest_neighbors(t)` call and
//! returns its output untouched.

use std::collections::HashSet;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{RecallError, Result};
use crate::models::{rank_order, Item, ScoredItem};
use crate::store::ItemStore;

const INITIAL_K_CAP: usize = 50;
const MAX_K_MULTIPLIER: usize = 5;
const MAX_K_CAP: usize = 500;

/// The neighbor counts a deduplicating retrieval walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WideningSchedule {
    pub target: usize,
    pub initial_k: usize,
    pub max_k: usize,
}

impl WideningSchedule {
    pub fn for_target(target: usize) -> Self {
        let target = target.max(1);
        let initial_k = target.max(target.saturating_mul(2).min(INITIAL_K_CAP));
        // Targets above the cap still get one full-size pass.
        let max_k = target
            .saturating_mul(MAX_K_MULTIPLIER)
            .min(MAX_K_CAP)
            .max(initial_k);
        Self {
            target,
            initial_k,
            max_k,
        }
    }

    /// The next, wider `k`, or `None` once the ceiling is reached.
    pub fn next_k(&self, k: usize) -> Option<usize> {
        if k >= self.max_k {
            None
        } else {
            Some(k.saturating_add(self.target).min(self.max_k))
        }
    }
}

/// Inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrieveRequest<'a> {
    /// Free-text query; embedded once per retrieval.
    pub query: &'a str,
    /// Number of items wanted. Must be at least 1.
    pub target: usize,
    /// Collapse results sharing an external id or fingerprint.
    pub dedupe: bool,
}

/// Ranked output of [`retrieve`] plus counters for logging and tests.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// At most `target` items in rank order.
    pub items: Vec<ScoredItem>,
    /// Number of `nearest_neighbors` calls issued.
    pub passes: usize,
    /// Total candidates returned across all passes.
    pub candidates_scanned: usize,
}

/// Embed `req.query` and run the retrieval against `store`.
///
/// Fails with [`RecallError::Validation`] for a blank query or a zero
/// target and with [`RecallError::EmptyResult`] when nothing matches.
/// Provider and store errors propagate unchanged.
pub async fn retrieve<S, E>(store: &S, embedder: &E, req: &RetrieveRequest<'_>) -> Result<Retrieval>
where
    S: ItemStore + ?Sized,
    E: Embedder + ?Sized,
{
    if req.query.trim().is_empty() {
        return Err(RecallError::validation("query must not be empty"));
    }
    if req.target == 0 {
        return Err(RecallError::validation("target count must be at least 1"));
    }

    let query_vec = embedder.embed(req.query).await?;
    retrieve_with_vector(store, &query_vec, req.target, req.dedupe).await
}

/// Retrieval for an already embedded query.
pub async fn retrieve_with_vector<S>(
    store: &S,
    query_vec: &[f32],
    target: usize,
    dedupe: bool,
) -> Result<Retrieval>
where
    S: ItemStore + ?Sized,
{
    if target == 0 {
        return Err(RecallError::validation("target count must be at least 1"));
    }

    if !dedupe {
        let items = store.nearest_neighbors(query_vec, target).await?;
        if items.is_empty() {
            return Err(RecallError::EmptyResult);
        }
        let scanned = items.len();
        return Ok(Retrieval {
            items,
            passes: 1,
            candidates_scanned: scanned,
        });
    }

    let schedule = WideningSchedule::for_target(target);
    let mut k = schedule.initial_k;
    let mut passes = 0;
    let mut scanned = 0;

    let mut accepted = loop {
        passes += 1;
        let candidates = store.nearest_neighbors(query_vec, k).await?;
        let fetched = candidates.len();
        scanned += fetched;

        let accepted = scan_distinct(candidates, target);
        debug!(
            pass = passes,
            k,
            fetched,
            accepted = accepted.len(),
            target,
            "widening pass"
        );

        if accepted.len() >= target || fetched < k {
            break accepted;
        }
        match schedule.next_k(k) {
            Some(next) => k = next,
            None => {
                debug!(
                    max_k = schedule.max_k,
                    accepted = accepted.len(),
                    "widening ceiling reached"
                );
                break accepted;
            }
        }
    };

    if accepted.is_empty() {
        return Err(RecallError::EmptyResult);
    }

    accepted.sort_by(rank_order);
    accepted.truncate(target);
    Ok(Retrieval {
        items: accepted,
        passes,
        candidates_scanned: scanned,
    })
}

/// Rank-order scan that keeps the first item per logical identity.
fn scan_distinct(candidates: Vec<ScoredItem>, target: usize) -> Vec<ScoredItem> {
    let mut seen = SeenKeys::default();
    let mut accepted = Vec::with_capacity(target.min(candidates.len()));
    for candidate in candidates {
        if accepted.len() >= target {
            break;
        }
        if seen.admit(&candidate.item) {
            accepted.push(candidate);
        } else {
            debug!(identity = %candidate.item.identity, "skipping duplicate candidate");
        }
    }
    accepted
}

/// Keys already claimed by accepted candidates during one scan.
#[derive(Default)]
struct SeenKeys {
    external_ids: HashSet<String>,
    fingerprints: HashSet<String>,
    raw: HashSet<String>,
}

impl SeenKeys {
    /// Claim every key of `item`; `false` if any was already claimed.
    fn admit(&mut self, item: &Item) -> bool {
        let external_id = item.external_id.as_deref().filter(|id| !id.is_empty());
        let fingerprint = Some(item.text_fingerprint.as_str()).filter(|fp| !fp.is_empty());

        if external_id.is_some_and(|id| self.external_ids.contains(id))
            || fingerprint.is_some_and(|fp| self.fingerprints.contains(fp))
        {
            return false;
        }
        if external_id.is_none() && fingerprint.is_none() {
            return self.raw.insert(item.identity.clone());
        }

        if let Some(id) = external_id {
            self.external_ids.insert(id.to_string());
        }
        if let Some(fp) = fingerprint {
            self.fingerprints.insert(fp.to_string());
        }
        true
    }
}
