//! TOML configuration.
//!
//! Every section is optional and falls back to defaults, so an empty file
//! (or no file at all) yields a working offline setup: hash embeddings,
//! summarization disabled, server on `127.0.0.1:3001`.
//!
//! See `config/recall.example.toml` for every key.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;
use url::Url;

use recall_core::embedding::DEFAULT_HASH_DIMS;
use recall_core::seen::DEFAULT_SEEN_CAPACITY;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// Fixed vector length. When unset the first insert decides.
    #[serde(default)]
    pub dims: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `hash`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Output size of the hash provider.
    #[serde(default = "default_hash_dims")]
    pub dims: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_hash_dims(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `openai` or `disabled`.
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Temperature for question answering.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Temperature for insert-time analysis.
    #[serde(default = "default_analysis_temperature")]
    pub analysis_temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            analysis_temperature: default_analysis_temperature(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result count when a query does not ask for one.
    #[serde(default = "default_target")]
    pub default_target: usize,
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,
    /// Largest result count a query may ask for.
    #[serde(default = "default_max_target")]
    pub max_target: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            dedupe: default_dedupe(),
            max_target: default_max_target(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            seen_capacity: default_seen_capacity(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_hash_dims() -> usize {
    DEFAULT_HASH_DIMS
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_completion_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_analysis_temperature() -> f32 {
    0.3
}
fn default_target() -> usize {
    10
}
fn default_dedupe() -> bool {
    true
}
fn default_max_target() -> usize {
    100
}
fn default_server_url() -> String {
    "http://127.0.0.1:3001".to_string()
}
fn default_seen_capacity() -> usize {
    DEFAULT_SEEN_CAPACITY
}

/// Read and validate the config at `path`.
///
/// A missing file is not an error: defaults are used and a warning is
/// logged. A file that exists but does not parse or validate is.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "openai" | "hash" | "disabled" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, hash, or disabled.",
            other
        ),
    }
    match config.completion.provider.as_str() {
        "openai" | "disabled" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be openai or disabled.",
            other
        ),
    }

    if config.embedding.provider == "hash" && config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0 when provider is 'hash'");
    }
    if config.embedding.provider == "openai" && config.embedding.model.trim().is_empty() {
        bail!("embedding.model must be set when provider is 'openai'");
    }
    if config.completion.is_enabled() && config.completion.model.trim().is_empty() {
        bail!("completion.model must be set when provider is 'openai'");
    }
    if config.embedding.timeout_secs == 0 || config.completion.timeout_secs == 0 {
        bail!("timeout_secs must be > 0");
    }

    if config.store.dims == Some(0) {
        bail!("store.dims must be > 0 when set");
    }
    if let Some(dims) = config.store.dims {
        if config.embedding.provider == "hash" && dims != config.embedding.dims {
            bail!(
                "store.dims ({}) does not match embedding.dims ({}) for the hash provider",
                dims,
                config.embedding.dims
            );
        }
    }

    if config.retrieval.default_target < 1 {
        bail!("retrieval.default_target must be >= 1");
    }
    if config.retrieval.max_target < config.retrieval.default_target {
        bail!("retrieval.max_target must be >= retrieval.default_target");
    }
    if config.capture.seen_capacity < 1 {
        bail!("capture.seen_capacity must be >= 1");
    }

    Ok(())
}

/// Normalize a user-supplied OpenAI-compatible base URL.
///
/// Adds `https://` when no scheme is given, drops query and fragment,
/// strips a trailing completions endpoint path, and appends `/v1` when
/// missing. Empty input yields [`DEFAULT_BASE_URL`].
pub fn sanitize_base_url(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return DEFAULT_BASE_URL.to_string(),
    };

    let with_scheme = if has_http_scheme(raw) {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let base = match Url::parse(&with_scheme) {
        Ok(mut url) => {
            let path = trim_endpoint_suffix(url.path()).to_string();
            url.set_path(&path);
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trim_endpoint_suffix(&with_scheme).to_string(),
    };

    let base = base.trim_end_matches('/');
    if base.to_ascii_lowercase().ends_with("/v1") {
        base.to_string()
    } else {
        format!("{}/v1", base)
    }
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn trim_endpoint_suffix(path: &str) -> &str {
    const SUFFIXES: [&str; 4] = [
        "/v1/chat/completions",
        "/chat/completions",
        "/v1/completions",
        "/completions",
    ];
    let trimmed = path.trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    for suffix in SUFFIXES {
        if lower.ends_with(suffix) {
            return &trimmed[..trimmed.len() - suffix.len()];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.dims, 256);
        assert!(!config.completion.is_enabled());
        assert_eq!(config.retrieval.default_target, 10);
        assert!(config.retrieval.dedupe);
        assert_eq!(config.retrieval.max_target, 100);
        assert_eq!(config.capture.seen_capacity, 10_000);
        assert!(config.store.dims.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[store]
dims = 1536

[embedding]
provider = "openai"
model = "text-embedding-3-large"
api_key_env = "MY_KEY"

[completion]
provider = "openai"
model = "gpt-4o"
temperature = 0.2

[retrieval]
default_target = 5
dedupe = false
max_target = 50

[capture]
server_url = "http://localhost:9000"
seen_capacity = 500
"#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.store.dims, Some(1536));
        assert_eq!(config.embedding.api_key_env, "MY_KEY");
        assert_eq!(config.completion.model, "gpt-4o");
        assert!((config.completion.analysis_temperature - 0.3).abs() < f32::EPSILON);
        assert!(!config.retrieval.dedupe);
        assert_eq!(config.capture.seen_capacity, 500);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/recall.example.toml")).unwrap();
        assert_eq!(config.embedding.provider, "hash");
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse_config("[embedding]\nprovider = \"magic\"").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let err = parse_config("[completion]\nprovider = \"hash\"").unwrap_err();
        assert!(err.to_string().contains("Unknown completion provider"));
    }

    #[test]
    fn test_rejects_bad_limits() {
        assert!(parse_config("[retrieval]\ndefault_target = 0").is_err());
        assert!(parse_config("[retrieval]\ndefault_target = 20\nmax_target = 10").is_err());
        assert!(parse_config("[capture]\nseen_capacity = 0").is_err());
        assert!(parse_config("[store]\ndims = 0").is_err());
    }

    #[test]
    fn test_rejects_store_dims_mismatch_for_hash() {
        let err = parse_config("[store]\ndims = 64\n[embedding]\ndims = 128").unwrap_err();
        assert!(err.to_string().contains("store.dims"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/definitely/not/here/recall.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
    }

    #[test]
    fn test_sanitize_base_url_defaults() {
        assert_eq!(sanitize_base_url(None), DEFAULT_BASE_URL);
        assert_eq!(sanitize_base_url(Some("   ")), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_sanitize_base_url_cleans_paths() {
        assert_eq!(
            sanitize_base_url(Some("https://api.openai.com/v1/chat/completions")),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            sanitize_base_url(Some("api.example.com")),
            "https://api.example.com/v1"
        );
        assert_eq!(
            sanitize_base_url(Some("http://localhost:8080/v1/")),
            "http://localhost:8080/v1"
        );
        assert_eq!(
            sanitize_base_url(Some("https://proxy.example.com/openai/chat/completions?x=1#frag")),
            "https://proxy.example.com/openai/v1"
        );
        assert_eq!(
            sanitize_base_url(Some("https://host/completions")),
            "https://host/v1"
        );
    }
}
