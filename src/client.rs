//! Capture surface and question client.
//!
//! A [`CaptureSession`] pushes candidate items through a [`Submitter`]
//! (normally the HTTP [`ApiClient`]) and keeps a local [`SeenSet`] so
//! repeated passes over the same source skip identities already handled.
//! The seen-set is advisory; the server's store decides duplicates.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use recall_core::fingerprint::resolve_identity;
use recall_core::seen::SeenSet;

use crate::config::Config;
use crate::service::{QueryRequest, QueryResponse, Recall, SubmitRequest, SubmitResponse};

const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Anything that accepts submissions: the HTTP client or an in-process
/// service.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse>;
}

#[async_trait]
impl Submitter for Recall {
    async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        Ok(Recall::submit(self, req.clone()).await?)
    }
}

/// JSON client for a running `recall serve`.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(server_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            bail!("server returned {}: {}", status, message);
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid response from {}", url))
    }

    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse> {
        self.post("/api/query", req).await
    }
}

#[async_trait]
impl Submitter for ApiClient {
    async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        self.post("/api/items", req).await
    }
}

/// Per-run counters printed by `recall submit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    /// Candidates sent to the server.
    pub submitted: usize,
    pub stored: usize,
    pub duplicates: usize,
    /// Candidates skipped locally because their identity was seen.
    pub skipped_seen: usize,
    pub failed: usize,
}

/// Seen-set backed submission loop.
pub struct CaptureSession {
    seen: SeenSet,
    analyze: bool,
}

impl CaptureSession {
    pub fn new(seen_capacity: usize, analyze: bool) -> Self {
        Self {
            seen: SeenSet::new(seen_capacity),
            analyze,
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Submit every candidate whose identity is not yet seen.
    pub async fn run_pass(
        &mut self,
        submitter: &dyn Submitter,
        candidates: &[SubmitRequest],
    ) -> CaptureSummary {
        let mut summary = CaptureSummary::default();

        for candidate in candidates {
            let identity = resolve_identity(candidate.external_id.as_deref(), &candidate.text);
            if self.seen.has(&identity) {
                debug!(%identity, "already seen, skipping");
                summary.skipped_seen += 1;
                continue;
            }

            let mut req = candidate.clone();
            req.options.analyze = Some(self.analyze);
            req.options.store = Some(true);

            summary.submitted += 1;
            match submitter.submit(&req).await {
                Ok(resp) if resp.success => {
                    if resp.stored {
                        summary.stored += 1;
                    } else {
                        summary.duplicates += 1;
                    }
                    self.seen.record(resp.identity.unwrap_or(identity));
                }
                Ok(resp) => {
                    warn!(%identity, message = %resp.message, "submission not accepted");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(%identity, error = %e, "submission failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

impl CaptureSummary {
    pub fn absorb(&mut self, other: &CaptureSummary) {
        self.submitted += other.submitted;
        self.stored += other.stored;
        self.duplicates += other.duplicates;
        self.skipped_seen += other.skipped_seen;
        self.failed += other.failed;
    }
}

/// Parse JSON Lines candidates. Blank lines are skipped; malformed lines
/// are logged and counted in the second return value.
pub fn parse_jsonl(content: &str) -> (Vec<SubmitRequest>, usize) {
    let mut items = Vec::new();
    let mut invalid = 0;
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SubmitRequest>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping malformed line");
                invalid += 1;
            }
        }
    }
    (items, invalid)
}

/// `recall submit`: push a JSON Lines file (or stdin with `-`) to the server.
pub async fn run_submit(
    config: &Config,
    input: &Path,
    server_url: Option<&str>,
    rescan: usize,
    analyze: bool,
) -> Result<CaptureSummary> {
    let content = if input == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };
    let (candidates, invalid) = parse_jsonl(&content);

    let server_url = server_url.unwrap_or(&config.capture.server_url);
    let client = ApiClient::new(server_url, CLIENT_TIMEOUT_SECS)?;
    let mut session = CaptureSession::new(config.capture.seen_capacity, analyze);

    let mut total = CaptureSummary {
        failed: invalid,
        ..CaptureSummary::default()
    };
    for pass in 0..=rescan {
        let summary = session.run_pass(&client, &candidates).await;
        info!(pass, ?summary, "capture pass finished");
        total.absorb(&summary);
    }

    println!("submitted: {}", total.submitted);
    println!("stored: {}", total.stored);
    println!("duplicates: {}", total.duplicates);
    println!("skipped_seen: {}", total.skipped_seen);
    println!("failed: {}", total.failed);
    println!("ok");
    Ok(total)
}

/// `recall ask`: post a question and print the JSON answer.
pub async fn run_ask(config: &Config, server_url: Option<&str>, req: &QueryRequest) -> Result<()> {
    let server_url = server_url.unwrap_or(&config.capture.server_url);
    let client = ApiClient::new(server_url, CLIENT_TIMEOUT_SECS)?;
    let response = client.query(req).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Accepts the first submission of each text and reports the rest as
    /// duplicates, counting calls.
    #[derive(Default)]
    struct CountingSubmitter {
        calls: AtomicUsize,
        stored: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl Submitter for CountingSubmitter {
        async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if req.text == "boom" {
                bail!("connection refused");
            }
            let identity = resolve_identity(req.external_id.as_deref(), &req.text);
            let stored = self.stored.lock().unwrap().insert(identity.clone());
            Ok(SubmitResponse {
                success: true,
                stored,
                identity: Some(identity),
                analysis: None,
                metadata: None,
                message: String::new(),
            })
        }
    }

    fn item(text: &str, id: Option<&str>) -> SubmitRequest {
        SubmitRequest {
            text: text.into(),
            external_id: id.map(str::to_string),
            ..SubmitRequest::default()
        }
    }

    #[tokio::test]
    async fn test_rescan_skips_seen() {
        let submitter = CountingSubmitter::default();
        let items = vec![item("one", Some("1")), item("two", Some("2"))];
        let mut session = CaptureSession::new(10, false);

        let first = session.run_pass(&submitter, &items).await;
        assert_eq!(first.submitted, 2);
        assert_eq!(first.stored, 2);

        let second = session.run_pass(&submitter, &items).await;
        assert_eq!(second.skipped_seen, 2);
        assert_eq!(second.submitted, 0);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evicted_identity_resolved_by_server() {
        let submitter = CountingSubmitter::default();
        let items = vec![item("a", None), item("b", None), item("c", None)];
        let mut session = CaptureSession::new(1, false);

        session.run_pass(&submitter, &items).await;
        let again = session.run_pass(&submitter, &items).await;
        // Each record evicts the previous identity, so every candidate
        // reaches the server again and comes back as a duplicate.
        assert_eq!(again.skipped_seen, 0);
        assert_eq!(again.duplicates, 3);
        assert_eq!(again.stored, 0);
    }

    #[tokio::test]
    async fn test_failures_are_not_recorded() {
        let submitter = CountingSubmitter::default();
        let items = vec![item("boom", Some("x"))];
        let mut session = CaptureSession::new(10, true);

        let summary = session.run_pass(&submitter, &items).await;
        assert_eq!(summary.failed, 1);
        assert!(session.seen().is_empty());
    }

    #[test]
    fn test_parse_jsonl() {
        let content = "{\"text\": \"a\"}\n\n not json \n{\"text\": \"b\", \"external_id\": 7}\n";
        let (items, invalid) = parse_jsonl(content);
        assert_eq!(items.len(), 2);
        assert_eq!(invalid, 1);
        assert_eq!(items[1].external_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_summary_absorb() {
        let mut total = CaptureSummary::default();
        total.absorb(&CaptureSummary {
            submitted: 2,
            stored: 1,
            duplicates: 1,
            skipped_seen: 0,
            failed: 0,
        });
        total.absorb(&CaptureSummary {
            skipped_seen: 2,
            ..CaptureSummary::default()
        });
        assert_eq!(total.submitted, 2);
        assert_eq!(total.skipped_seen, 2);
    }
}
