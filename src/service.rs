//! Orchestration layer: the insert and question-answering flows.
//!
//! [`Recall`] owns the store and the providers and turns request DTOs
//! into calls on the core. It is shared by the HTTP server and the tests;
//! every method takes `&self` and is safe to call concurrently.
//!
//! # Insert flow
//!
//! 1. `{analyze: false, store: false}` short-circuits.
//! 2. Validate text, resolve the identity.
//! 3. Analyze (optional, never fails the request).
//! 4. Pre-check `get_by_id`; a hit skips embedding entirely.
//! 5. Embed outside any store lock, then `insert_if_absent`.
//!
//! # Query flow
//!
//! Widening retrieval, then a summary from the completion provider when
//! one is configured. No matches is a successful, empty answer.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use recall_core::embedding::{CompletionOptions, Completer, Embedder};
use recall_core::fingerprint::{clean_external_id, resolve_identity};
use recall_core::models::{InsertOutcome, Item, NewItem, ScoredItem};
use recall_core::normalize::normalize;
use recall_core::retrieve::{retrieve, RetrieveRequest};
use recall_core::store::{InMemoryItemStore, ItemStore};
use recall_core::{RecallError, Result};

use crate::analysis::{analyze, AuthorProfile, Verdict};
use crate::config::{Config, RetrievalConfig};
use crate::provider::{create_completer, create_embedder};

pub const NO_PROCESSING_MESSAGE: &str = "No processing requested.";
pub const DUPLICATE_MESSAGE: &str = "Duplicate item skipped.";
pub const NO_MATCHES_MESSAGE: &str =
    "No items matched your query yet. Try submitting more items first.";
const SNIPPET_CHARS: usize = 100;

// ============ Requests & responses ============

/// Body of `POST /api/items`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub observed_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub reposts: Option<u64>,
    #[serde(default)]
    pub replies: Option<u64>,
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub following: Option<u64>,
    #[serde(default)]
    pub account_age_days: Option<u64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub options: SubmitOptions,
    /// Completion model hint for analysis.
    #[serde(default)]
    pub model: Option<String>,
}

/// Processing flags; both default to `true`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmitOptions {
    #[serde(default)]
    pub analyze: Option<bool>,
    #[serde(default)]
    pub store: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub stored: bool,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub analysis: Option<Verdict>,
    #[serde(default)]
    pub metadata: Option<StoredSummary>,
    pub message: String,
}

/// Identity and timestamps of a freshly stored item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSummary {
    pub identity: String,
    pub external_id: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
}

/// Body of `POST /api/query`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    /// Defaults to `[retrieval].default_target` when absent or `<= 0`.
    #[serde(default)]
    pub max_results: Option<i64>,
    #[serde(default)]
    pub dedupe: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: Option<String>,
    pub items: Vec<QueryItem>,
    pub sources: Vec<String>,
    pub total_results: usize,
    pub message: String,
}

/// A retrieved item as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryItem {
    pub identity: String,
    pub text: String,
    pub external_id: Option<String>,
    pub score: f32,
    pub observed_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl From<&ScoredItem> for QueryItem {
    fn from(scored: &ScoredItem) -> Self {
        let item = &scored.item;
        Self {
            identity: item.identity.clone(),
            text: item.text.clone(),
            external_id: item.external_id.clone(),
            score: scored.score,
            observed_at: item.observed_at,
            inserted_at: item.inserted_at,
            metadata: item.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub total_items: usize,
    pub dims: Option<usize>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============ Service ============

/// The orchestration layer.
pub struct Recall {
    store: Arc<dyn ItemStore>,
    embedder: Arc<dyn Embedder>,
    completer: Option<Arc<dyn Completer>>,
    retrieval: RetrievalConfig,
    analysis_temperature: f32,
}

impl Recall {
    pub fn new(
        store: Arc<dyn ItemStore>,
        embedder: Arc<dyn Embedder>,
        completer: Option<Arc<dyn Completer>>,
        retrieval: RetrievalConfig,
        analysis_temperature: f32,
    ) -> Self {
        Self {
            store,
            embedder,
            completer,
            retrieval,
            analysis_temperature,
        }
    }

    /// In-memory store plus the providers named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ItemStore> = match config.store.dims {
            Some(dims) => Arc::new(InMemoryItemStore::with_dims(dims)),
            None => Arc::new(InMemoryItemStore::new()),
        };
        let embedder =
            create_embedder(&config.embedding).context("Failed to create embedding provider")?;
        let completer =
            create_completer(&config.completion).context("Failed to create completion provider")?;
        info!(
            embedder = embedder.model_name(),
            completer = completer.as_ref().map(|c| c.model_name()).unwrap_or("disabled"),
            "recall service ready"
        );
        Ok(Self::new(
            store,
            embedder,
            completer,
            config.retrieval.clone(),
            config.completion.analysis_temperature,
        ))
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// Analyze and/or store one candidate item.
    pub async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse> {
        let should_analyze = req.options.analyze.unwrap_or(true);
        let should_store = req.options.store.unwrap_or(true);

        if !should_analyze && !should_store {
            return Ok(SubmitResponse {
                success: true,
                stored: false,
                identity: None,
                analysis: None,
                metadata: None,
                message: NO_PROCESSING_MESSAGE.to_string(),
            });
        }

        if req.text.trim().is_empty() {
            return Err(RecallError::validation("text must not be empty"));
        }
        let external_id = clean_external_id(req.external_id.as_deref());
        if external_id.is_none() && normalize(&req.text).is_empty() {
            return Err(RecallError::validation(
                "text has no content after normalization; supply an external_id",
            ));
        }
        let identity = resolve_identity(external_id, &req.text);

        let analysis = if should_analyze {
            Some(self.analyze(&req).await)
        } else {
            None
        };

        if !should_store {
            return Ok(SubmitResponse {
                success: true,
                stored: false,
                identity: Some(identity),
                analysis,
                metadata: None,
                message: "Item analyzed successfully.".to_string(),
            });
        }

        if self.store.get_by_id(&identity).await?.is_some() {
            debug!(%identity, "duplicate caught before embedding");
            return Ok(duplicate_response(identity, analysis));
        }

        let vector = self.embedder.embed(&req.text).await?;

        let mut candidate = NewItem::new(req.text.clone(), vector)
            .with_metadata(build_metadata(&req, analysis.as_ref(), should_analyze));
        if let Some(id) = external_id {
            candidate = candidate.with_external_id(id);
        }
        if let Some(at) = req.observed_at.as_deref().and_then(parse_observed_at) {
            candidate = candidate.observed_at(at);
        }

        match self.store.insert_if_absent(candidate).await? {
            InsertOutcome::Inserted { identity } => {
                info!(%identity, "item stored");
                let metadata = self
                    .store
                    .get_by_id(&identity)
                    .await?
                    .map(|item| stored_summary(&item));
                let message = if should_analyze {
                    "Item analyzed and stored successfully."
                } else {
                    "Item stored successfully (analysis disabled)."
                };
                Ok(SubmitResponse {
                    success: true,
                    stored: true,
                    identity: Some(identity),
                    analysis,
                    metadata,
                    message: message.to_string(),
                })
            }
            InsertOutcome::Duplicate { existing_identity } => {
                debug!(identity = %existing_identity, "duplicate lost insert race");
                Ok(duplicate_response(existing_identity, analysis))
            }
        }
    }

    async fn analyze(&self, req: &SubmitRequest) -> Verdict {
        let Some(completer) = self.completer.as_deref() else {
            return Verdict::unavailable("Analysis skipped: completion provider is disabled.");
        };
        let profile = AuthorProfile {
            author: req.author.as_deref(),
            display_name: req.display_name.as_deref(),
            followers: req.followers,
            following: req.following,
            account_age_days: req.account_age_days,
        };
        let options = CompletionOptions {
            model_hint: req.model.as_deref(),
            temperature: Some(self.analysis_temperature),
        };
        analyze(completer, &req.text, &profile, &options).await
    }

    /// Retrieve distinct items for a question and summarize them.
    pub async fn query(&self, req: QueryRequest) -> Result<QueryResponse> {
        if req.query.trim().is_empty() {
            return Err(RecallError::validation("query must not be empty"));
        }
        let target = self.resolve_target(req.max_results)?;
        let dedupe = req.dedupe.unwrap_or(self.retrieval.dedupe);

        let retrieve_req = RetrieveRequest {
            query: &req.query,
            target,
            dedupe,
        };
        let retrieval = match retrieve(self.store.as_ref(), self.embedder.as_ref(), &retrieve_req).await {
            Ok(retrieval) => retrieval,
            Err(RecallError::EmptyResult) => {
                info!(target, "query matched nothing");
                return Ok(QueryResponse {
                    success: true,
                    answer: None,
                    items: Vec::new(),
                    sources: Vec::new(),
                    total_results: 0,
                    message: NO_MATCHES_MESSAGE.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        info!(
            target,
            dedupe,
            returned = retrieval.items.len(),
            passes = retrieval.passes,
            scanned = retrieval.candidates_scanned,
            "query retrieved"
        );

        let items: Vec<QueryItem> = retrieval.items.iter().map(QueryItem::from).collect();
        let sources: Vec<String> = retrieval.items.iter().map(|s| source_line(&s.item)).collect();
        let total = items.len();

        let (answer, message) = match self.completer.as_deref() {
            Some(completer) => {
                let prompt = answer_prompt(&req.query, &retrieval.items);
                let options = CompletionOptions {
                    model_hint: req.model.as_deref(),
                    temperature: None,
                };
                let answer = completer.complete(&prompt, &options).await?;
                (Some(answer), format!("Answer generated from {} items.", total))
            }
            None => (
                None,
                format!(
                    "Summarization is disabled; returning {} matching items.",
                    total
                ),
            ),
        };

        Ok(QueryResponse {
            success: true,
            answer,
            items,
            sources,
            total_results: total,
            message,
        })
    }

    fn resolve_target(&self, requested: Option<i64>) -> Result<usize> {
        match requested {
            None => Ok(self.retrieval.default_target),
            Some(n) if n <= 0 => Ok(self.retrieval.default_target),
            Some(n) if n as u64 > self.retrieval.max_target as u64 => Err(RecallError::validation(
                format!("max_results must be <= {}", self.retrieval.max_target),
            )),
            Some(n) => Ok(n as usize),
        }
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        Ok(StatsResponse {
            success: true,
            total_items: self.store.count().await?,
            dims: self.store.dims(),
        })
    }
}

fn duplicate_response(identity: String, analysis: Option<Verdict>) -> SubmitResponse {
    let message = if analysis.is_some() {
        "Duplicate item skipped (analysis returned)."
    } else {
        DUPLICATE_MESSAGE
    };
    SubmitResponse {
        success: true,
        stored: false,
        identity: Some(identity),
        analysis,
        metadata: None,
        message: message.to_string(),
    }
}

fn stored_summary(item: &Item) -> StoredSummary {
    StoredSummary {
        identity: item.identity.clone(),
        external_id: item.external_id.clone(),
        observed_at: item.observed_at,
        inserted_at: item.inserted_at,
    }
}

fn build_metadata(req: &SubmitRequest, analysis: Option<&Verdict>, analyzed: bool) -> Map<String, Value> {
    let mut metadata = req.metadata.clone().unwrap_or_default();
    if let Some(author) = &req.author {
        metadata.insert("author".into(), Value::from(author.as_str()));
    }
    if let Some(display_name) = &req.display_name {
        metadata.insert("display_name".into(), Value::from(display_name.as_str()));
    }
    for (key, value) in [
        ("likes", req.likes),
        ("reposts", req.reposts),
        ("replies", req.replies),
        ("followers", req.followers),
        ("following", req.following),
        ("account_age_days", req.account_age_days),
    ] {
        metadata.insert(key.into(), Value::from(value.unwrap_or(0)));
    }

    let fallback;
    let verdict = match analysis {
        Some(v) => v,
        None => {
            fallback = Verdict::unavailable(if analyzed {
                "Analysis unavailable."
            } else {
                "Analysis skipped (disabled)."
            });
            &fallback
        }
    };
    metadata.insert("toxicity_score".into(), Value::from(verdict.toxicity_score));
    metadata.insert("bot_likelihood".into(), Value::from(verdict.bot_likelihood));
    metadata.insert("analysis".into(), Value::from(verdict.analysis.as_str()));
    metadata.insert(
        "red_flags".into(),
        Value::from(verdict.red_flags.clone()),
    );
    metadata
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` read as UTC.
pub fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn author_of(item: &Item) -> &str {
    item.metadata
        .get("author")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .unwrap_or("unknown")
}

/// `@author: "<first 100 chars>..." (observed <ts>)`
pub fn source_line(item: &Item) -> String {
    let snippet: String = item.text.chars().take(SNIPPET_CHARS).collect();
    format!(
        "@{}: \"{}...\" (observed {})",
        author_of(item),
        snippet,
        item.observed_at.to_rfc3339()
    )
}

pub fn answer_prompt(question: &str, items: &[ScoredItem]) -> String {
    let context = items
        .iter()
        .map(|scored| {
            let item = &scored.item;
            format!(
                "Item: {}\nAuthor: @{}\nObserved At: {}\nInserted At: {}\n",
                item.text,
                author_of(item),
                item.observed_at.to_rfc3339(),
                item.inserted_at.to_rfc3339()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Based on the following items and their analysis, answer the user's question:\n\n\
         Context:\n{}\n\n\
         User Question: {}\n\n\
         Provide a comprehensive answer based on the item data. Include relevant statistics and insights.",
        context, question
    )
}
