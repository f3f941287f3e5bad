//! Insert-time content analysis.
//!
//! The completion provider is asked for a small JSON verdict on each item.
//! Analysis never blocks an insert: provider or parse failures degrade to a
//! zeroed [`Verdict`] that carries the failure text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use recall_core::embedding::{CompletionOptions, Completer};

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("valid fence pattern"));
static JSON_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("valid span pattern"));

/// Model verdict for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// 0 (benign) to 10 (highly toxic).
    #[serde(default)]
    pub toxicity_score: f64,
    /// 0 (clearly human) to 10 (clearly automated).
    #[serde(default)]
    pub bot_likelihood: f64,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

impl Verdict {
    /// Zeroed verdict carrying `reason` as its analysis text.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            toxicity_score: 0.0,
            bot_likelihood: 0.0,
            analysis: reason.into(),
            red_flags: Vec::new(),
        }
    }
}

/// Author details included in the analysis prompt.
#[derive(Debug, Clone, Default)]
pub struct AuthorProfile<'a> {
    pub author: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub account_age_days: Option<u64>,
}

pub fn analysis_prompt(text: &str, profile: &AuthorProfile<'_>) -> String {
    let or_unknown = |v: Option<u64>| v.map_or_else(|| "unknown".to_string(), |n| n.to_string());
    format!(
        "Analyze this post for toxicity and bot likelihood:\n\n\
         Post: \"{text}\"\n\
         User: @{author} ({display})\n\
         Followers: {followers}\n\
         Following: {following}\n\
         Account Age: {age} days\n\n\
         Provide a JSON response with:\n\
         {{\n  \"toxicity_score\": 0-10,\n  \"bot_likelihood\": 0-10,\n  \
         \"analysis\": \"brief explanation\",\n  \"red_flags\": [\"list\", \"of\", \"flags\"]\n}}\n\
         Return only the JSON object with double-quoted keys and numeric values.",
        text = text,
        author = profile.author.unwrap_or("unknown"),
        display = profile.display_name.unwrap_or("unknown"),
        followers = or_unknown(profile.followers),
        following = or_unknown(profile.following),
        age = or_unknown(profile.account_age_days),
    )
}

/// Parse a model reply into a [`Verdict`].
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON embedded
/// in surrounding prose.
pub fn parse_verdict(content: &str) -> Result<Verdict, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("Model returned empty response".to_string());
    }

    let cleaned = CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    match serde_json::from_str::<Verdict>(cleaned) {
        Ok(verdict) => Ok(verdict),
        Err(first) => match JSON_SPAN.captures(cleaned).and_then(|c| c.get(1)) {
            Some(span) => serde_json::from_str::<Verdict>(span.as_str())
                .map_err(|e| format!("Model response was not valid JSON: {}", e)),
            None => Err(format!("Model response was not valid JSON: {}", first)),
        },
    }
}

/// Ask `completer` for a verdict, degrading to [`Verdict::unavailable`].
pub async fn analyze(
    completer: &dyn Completer,
    text: &str,
    profile: &AuthorProfile<'_>,
    options: &CompletionOptions<'_>,
) -> Verdict {
    let prompt = analysis_prompt(text, profile);
    match completer.complete(&prompt, options).await {
        Ok(reply) => parse_verdict(&reply).unwrap_or_else(|reason| {
            warn!(%reason, "analysis reply could not be parsed");
            Verdict::unavailable(reason)
        }),
        Err(e) => {
            warn!(error = %e, "analysis call failed");
            Verdict::unavailable(e.to_string())
        }
    }
}
