//! OpenAI-compatible provider adapters.
//!
//! Implements [`Embedder`] and [`Completer`] over the `/embeddings` and
//! `/chat/completions` endpoints of any OpenAI-compatible API.
//!
//! # Error mapping
//!
//! | Failure | Error |
//! |---------|-------|
//! | timeout, connection failure | `ProviderUnavailable` |
//! | HTTP 429 or 5xx | `ProviderUnavailable` |
//! | HTTP 404 | `ProviderRejected` (with a base-URL hint) |
//! | other HTTP 4xx, malformed response | `ProviderRejected` |
//!
//! Calls are never retried. The API key is read once from the environment
//! variable named in config and never accepted per request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use recall_core::embedding::{CompletionOptions, Completer, Embedder, HashEmbedder};
use recall_core::{RecallError, Result};

use crate::config::{sanitize_base_url, CompletionConfig, EmbeddingConfig};

const NOT_FOUND_HINT: &str = "Provider returned 404. Verify the base URL points to the API root \
(e.g. https://api.openai.com/v1) and that the requested model exists.";

/// Shared HTTP plumbing for both adapters.
#[derive(Clone)]
struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    fn new(base_url: Option<&str>, api_key_env: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("{} environment variable not set", api_key_env))?;
        if api_key.trim().is_empty() {
            bail!("{} environment variable is empty", api_key_env);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: sanitize_base_url(base_url),
            api_key,
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "provider request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let err = map_status_error(status.as_u16(), &body_text);
            error!(%url, status = status.as_u16(), error = %err, "provider call failed");
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RecallError::ProviderRejected(format!("malformed provider response: {}", e)))
    }
}

fn map_transport_error(e: reqwest::Error) -> RecallError {
    if e.is_timeout() {
        RecallError::provider_timeout(e)
    } else {
        RecallError::ProviderUnavailable(format!("provider request failed: {}", e))
    }
}

/// Classify a non-success HTTP status.
pub fn map_status_error(status: u16, body: &str) -> RecallError {
    if status == 404 {
        return RecallError::ProviderRejected(NOT_FOUND_HINT.to_string());
    }
    let message =
        extract_error_message(body).unwrap_or_else(|| format!("Provider API error (status {})", status));
    if status == 429 || status >= 500 {
        RecallError::ProviderUnavailable(format!("status {}: {}", status, message))
    } else {
        RecallError::ProviderRejected(message)
    }
}

/// `{"error": "..."}` or `{"error": {"message": "..."}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    error
        .as_str()
        .or_else(|| error.get("message").and_then(|m| m.as_str()))
        .map(str::to_string)
}

// ============ Embeddings ============

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embedder backed by `POST {base}/embeddings`.
pub struct OpenAiEmbedder {
    client: ApiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: ApiClient::new(
                config.base_url.as_deref(),
                &config.api_key_env,
                config.timeout_secs,
            )?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let response: EmbeddingResponse = self.client.post_json("embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RecallError::ProviderRejected("provider returned no embedding".into()))
    }
}

/// Embedder used when `[embedding].provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RecallError::ProviderUnavailable(
            "embedding provider is disabled".into(),
        ))
    }
}

/// Build the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Completions ============

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Completer backed by `POST {base}/chat/completions`.
pub struct OpenAiCompleter {
    client: ApiClient,
    model: String,
    temperature: f32,
}

impl OpenAiCompleter {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: ApiClient::new(
                config.base_url.as_deref(),
                &config.api_key_env,
                config.timeout_secs,
            )?,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions<'_>) -> Result<String> {
        let model = options
            .model_hint
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model);
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature.unwrap_or(self.temperature),
        });
        let response: ChatResponse = self.client.post_json("chat/completions", &body).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Build the configured [`Completer`], or `None` when summarization and
/// analysis are disabled.
pub fn create_completer(config: &CompletionConfig) -> anyhow::Result<Option<Arc<dyn Completer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiCompleter::new(config)?))),
        other => bail!("Unknown completion provider: {}", other),
    }
}
