//! Content fingerprints and identity resolution.
//!
//! A fingerprint is the SHA-1 (160-bit) digest of [`normalize`]d text,
//! hex-encoded. Texts that differ only in case, whitespace, or embedded
//! URLs share a fingerprint, which makes them the same item when no
//! external id is supplied.
//!
//! Identity resolution is fixed:
//!
//! | Input | Identity |
//! |-------|----------|
//! | non-empty external id | `id:<external id>` |
//! | otherwise | `text:<fingerprint>` |

use sha1::{Digest, Sha1};

use crate::normalize::normalize;

/// Prefix for identities derived from a caller-supplied external id.
pub const EXTERNAL_ID_PREFIX: &str = "id:";
/// Prefix for identities derived from the text fingerprint.
pub const TEXT_PREFIX: &str = "text:";

/// Hex-encoded SHA-1 of the normalized form of `text`.
///
/// ```rust
/// use recall_core::fingerprint::fingerprint;
///
/// assert_eq!(fingerprint("Hello   World"), fingerprint("hello world"));
/// assert_eq!(fingerprint("x").len(), 40);
/// ```
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalize(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Trimmed external id, or `None` when absent or blank.
pub fn clean_external_id(external_id: Option<&str>) -> Option<&str> {
    external_id.map(str::trim).filter(|id| !id.is_empty())
}

/// Identity from an already computed fingerprint.
pub fn identity_for(external_id: Option<&str>, text_fingerprint: &str) -> String {
    match clean_external_id(external_id) {
        Some(id) => format!("{}{}", EXTERNAL_ID_PREFIX, id),
        None => format!("{}{}", TEXT_PREFIX, text_fingerprint),
    }
}

/// Identity of an item with the given external id and raw text.
pub fn resolve_identity(external_id: Option<&str>, text: &str) -> String {
    identity_for(external_id, &fingerprint(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha1_width() {
        let fp = fingerprint("hello world");
        assert_eq!(fp.len(), 40);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha1("hello world")
        assert_eq!(
            fingerprint("Hello   World"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_fingerprint_ignores_case_space_and_urls() {
        let base = fingerprint("breaking news today");
        assert_eq!(fingerprint("  BREAKING   news\ttoday "), base);
        assert_eq!(fingerprint("breaking news https://t.co/abc today"), base);
        assert_ne!(fingerprint("breaking news tomorrow"), base);
    }

    #[test]
    fn test_identity_prefers_external_id() {
        assert_eq!(resolve_identity(Some("123"), "anything"), "id:123");
        assert_eq!(resolve_identity(Some("  42 "), "anything"), "id:42");
    }

    #[test]
    fn test_identity_falls_back_to_text() {
        let expected = format!("text:{}", fingerprint("hello world"));
        assert_eq!(resolve_identity(None, "hello world"), expected);
        assert_eq!(resolve_identity(Some(""), "hello world"), expected);
        assert_eq!(resolve_identity(Some("   "), "Hello World"), expected);
    }

    #[test]
    fn test_identity_for_matches_resolve() {
        let fp = fingerprint("some text");
        assert_eq!(identity_for(None, &fp), resolve_identity(None, "some text"));
        assert_eq!(identity_for(Some("7"), &fp), "id:7");
        for external_id in [None, Some(""), Some(" 7 "), Some("abc")] {
            assert_eq!(
                resolve_identity(external_id, "Some  TEXT"),
                identity_for(external_id, &fp)
            );
        }
    }
}
