use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::Error;
use crate::logging::LoggingConfig;
use crate::types::MAX_TOP_K;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self { figment: Self::figment_for(Path::new("."), &env_name), env_name })
    }

    /// Same layering as [`Config::load`], with config files read from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> Self {
        Self { figment: Self::figment_for(dir, env_name), env_name: env_name.to_string() }
    }

    fn figment_for(dir: &Path, env_name: &str) -> Figment {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view over every section, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings ({}): {}", self.env_name, e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub storage: StorageConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
    pub indexing: IndexingConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if self.embedding.backend == EmbeddingBackend::Http && self.embedding.endpoint.is_none() {
            return Err(Error::InvalidConfig("embedding.endpoint is required for the http backend".into()));
        }
        if self.events.sink == SinkKind::Jsonl && self.events.path.is_none() {
            return Err(Error::InvalidConfig("events.path is required for the jsonl sink".into()));
        }
        if self.indexing.concurrency == 0 {
            return Err(Error::InvalidConfig("indexing.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of the semantic score in hybrid fusion.
    pub alpha: f32,
    pub default_top_k: usize,
    /// Candidate pool is `top_k * candidate_multiplier` for lexical modes.
    pub candidate_multiplier: usize,
    pub request_timeout_ms: u64,
    /// JSONL journal of served queries.
    pub query_log: Option<String>,
    pub publish_events: bool,
    pub source: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            default_top_k: 5,
            candidate_multiplier: 5,
            request_timeout_ms: 10_000,
            query_log: None,
            publish_events: true,
            source: "retrieval-service".to_string(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig(format!("retrieval.alpha must be within [0, 1], got {}", self.alpha)));
        }
        if !(1..=MAX_TOP_K).contains(&self.default_top_k) {
            return Err(Error::InvalidConfig(format!("retrieval.default_top_k must be within 1..={MAX_TOP_K}")));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("retrieval.candidate_multiplier must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("retrieval.request_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing. Its vectors are placeholders, so
    /// everything served from it reports degraded.
    Hash,
    Http,
    #[default]
    Candle,
}

/// What to do when the embedding model cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPosture {
    /// Fail with a retryable error.
    #[default]
    FailClosed,
    /// Serve a flagged placeholder vector.
    Placeholder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dim: usize,
    /// Base URL of an OpenAI compatible embeddings API.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Directory with `config.json`, `tokenizer.json` and safetensors.
    pub model_dir: Option<String>,
    /// `tokenizer.json` used for chunk token budgets; word tokens when unset.
    pub tokenizer: Option<String>,
    pub posture: FallbackPosture,
    pub timeout_ms: u64,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Candle,
            model: "bge-m3".to_string(),
            dim: 1024,
            endpoint: None,
            api_key_env: None,
            model_dir: None,
            tokenizer: None,
            posture: FallbackPosture::FailClosed,
            timeout_ms: 10_000,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Lance,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub path: String,
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StoreBackend::Lance, path: "./data/index/lancedb".to_string(), table: "chunks".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Null,
    #[default]
    Tracing,
    Jsonl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub sink: SinkKind,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// JSONL journal, one line per indexed document.
    pub metadata_log: String,
    /// Extraction metadata consulted for missing titles and urls.
    pub text_metadata: Option<String>,
    /// Directory of extracted `<document_id>.txt` files used for re-indexing.
    pub text_dir: String,
    pub concurrency: usize,
    pub source: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            metadata_log: "./data/index_metadata.jsonl".to_string(),
            text_metadata: Some("./data/text_metadata.jsonl".to_string()),
            text_dir: "./data/text".to_string(),
            concurrency: 4,
            source: "indexing-service".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
