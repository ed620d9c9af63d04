//! TOML configuration for the `ksearch` binary and [`SearchEngine`](crate::engine::SearchEngine).
//!
//! ```toml
//! [db]
//! path = "./data/ksearch.sqlite"
//!
//! [retrieval]
//! default_limit = 10
//! timeout_ms = 10000
//!
//! [cache]
//! capacity = 10
//! ttl_secs = 1800
//!
//! [embedding]
//! provider = "hashing"
//! dims = 256
//! ```
//!
//! Every section except `[db]` is optional and every field has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use knowledge_search_core::aggregate::BudgetPolicy;
use knowledge_search_core::cache::IndexCacheConfig;
use knowledge_search_core::fusion::DEFAULT_RRF_K;
use knowledge_search_core::orchestrator::OrchestratorOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_topic_fetch_ceiling")]
    pub topic_fetch_ceiling: usize,
    #[serde(default = "default_topic_result_cap")]
    pub topic_result_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            timeout_ms: default_timeout_ms(),
            rrf_k: default_rrf_k(),
            fetch_batch_size: default_fetch_batch_size(),
            fetch_concurrency: default_fetch_concurrency(),
            topic_fetch_ceiling: default_topic_fetch_ceiling(),
            topic_result_cap: default_topic_result_cap(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_rrf_k() -> f64 {
    DEFAULT_RRF_K
}
fn default_fetch_batch_size() -> usize {
    20
}
fn default_fetch_concurrency() -> usize {
    5
}
fn default_topic_fetch_ceiling() -> usize {
    60
}
fn default_topic_result_cap() -> usize {
    40
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn budget(&self) -> BudgetPolicy {
        BudgetPolicy {
            topic_fetch_ceiling: self.topic_fetch_ceiling,
            topic_result_cap: self.topic_result_cap,
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            rrf_k: self.rrf_k,
            fetch_batch_size: self.fetch_batch_size,
            fetch_concurrency: self.fetch_concurrency,
            ..OrchestratorOptions::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval of the background sweep of expired indexes; `0` disables it.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_cache_capacity() -> usize {
    10
}
fn default_cache_ttl_secs() -> u64 {
    30 * 60
}
fn default_cleanup_interval_secs() -> u64 {
    30 * 60
}

impl CacheConfig {
    pub fn index_cache_config(&self) -> IndexCacheConfig {
        IndexCacheConfig {
            capacity: self.capacity,
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Config with an explicit database path and defaults everywhere else.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    if retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if retrieval.timeout_ms == 0 {
        anyhow::bail!("retrieval.timeout_ms must be > 0");
    }
    if !(retrieval.rrf_k.is_finite() && retrieval.rrf_k >= 0.0) {
        anyhow::bail!("retrieval.rrf_k must be a finite number >= 0");
    }
    if retrieval.fetch_batch_size == 0 || retrieval.fetch_concurrency == 0 {
        anyhow::bail!("retrieval.fetch_batch_size and retrieval.fetch_concurrency must be > 0");
    }

    if config.cache.capacity == 0 {
        anyhow::bail!("cache.capacity must be > 0");
    }
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hashing" => {}
        "openai" => {
            if embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashing, or openai.",
            other
        ),
    }
    if embedding.is_enabled() && embedding.dims == Some(0) {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            embedding.provider
        );
    }

    Ok(())
}
