//! Canonical text form used for fingerprints and duplicate comparison.
//!
//! # Algorithm
//!
//! 1. Lowercase the input.
//! 2. Remove URL-like tokens (`scheme://…` up to the next whitespace).
//! 3. Collapse every run of whitespace to a single space.
//! 4. Trim leading and trailing whitespace.
//!
//! The function is pure: fingerprints depend on it producing the same
//! output for the same input across calls and processes.
//!
//! ```rust
//! use recall_core::normalize::normalize;
//!
//! assert_eq!(normalize("  Hello   World https://t.co/x "), "hello world");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static URL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-z][a-z0-9+.\-]*://\S+").expect("URL pattern is a valid regex")
});

/// Canonicalize `text` for hashing and comparison.
///
/// Empty or whitespace-only input (or input made only of URLs) normalizes
/// to the empty string.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = URL_TOKEN.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
