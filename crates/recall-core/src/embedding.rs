//! Provider boundary traits and vector utilities.
//!
//! Defines the [`Embedder`] and [`Completer`] traits that provider
//! adapters implement, [`cosine_similarity`], and [`HashEmbedder`], a
//! deterministic offline embedder.
//!
//! Network-backed adapters (OpenAI-compatible HTTP) live in the `recall`
//! app crate. Adapters never retry: a failed call surfaces as
//! [`RecallError::ProviderUnavailable`](crate::RecallError::ProviderUnavailable)
//! or [`RecallError::ProviderRejected`](crate::RecallError::ProviderRejected).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Output dimensionality, when known ahead of the first call.
    fn dims(&self) -> Option<usize>;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Per-call completion settings.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions<'a> {
    /// Overrides the adapter's configured model when set.
    pub model_hint: Option<&'a str>,
    /// Sampling temperature; adapter default when `None`.
    pub temperature: Option<f32>,
}

/// Produces free text for a prompt (summaries, analysis verdicts).
#[async_trait]
pub trait Completer: Send + Sync {
    /// Default model identifier.
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str, options: &CompletionOptions<'_>) -> Result<String>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, and zero-magnitude vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Default dimensionality of [`HashEmbedder`].
pub const DEFAULT_HASH_DIMS: usize = 256;
const HASH_SEED: u64 = 1337;

/// Bag-of-words embedder that hashes tokens into buckets.
///
/// Lowercased, punctuation-trimmed whitespace tokens each add `1.0` to one
/// bucket; the result is L2-normalized. Texts sharing vocabulary score
/// high, which is enough to run the whole pipeline without a network
/// provider.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            seed: HASH_SEED,
        }
    }

    /// Synchronous embedding; [`Embedder::embed`] delegates here.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dims];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            vector[self.bucket_for(token)] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.seed);
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() % self.dims as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
