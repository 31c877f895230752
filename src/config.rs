//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual values. Every field has a default except the
//! database URL and the router API key, which are only checked by the
//! commands that need them.
//!
//! | Env var | Setting |
//! |---------|---------|
//! | `WATCH_DIR` | `watch.dir` |
//! | `MAX_CONCURRENT_TASKS` | `watch.concurrency` |
//! | `VECTOR_DB_URL` | `db.url` |
//! | `ROUTER_URL` | `router.base_url` |
//! | `LLM_ROUTER_API_KEY` | `router.api_key` |
//! | `TOKEN_TIMEOUT` | `router.token_timeout_secs` |
//! | `EMBED_TIMEOUT` | `router.embed_timeout_secs` |
//! | `CHUNK_SIZE` | `chunking.max_tokens` |
//! | `CHUNK_OVERLAP` | `chunking.overlap_tokens` |
//! | `BIND_ADDR` | `server.bind` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: default_watch_dir(),
            debounce_ms: default_debounce_ms(),
            concurrency: default_concurrency(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("/data/incoming")
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    5
}
fn default_exclude_globs() -> Vec<String> {
    // Hidden/temp files and Office lock files.
    vec!["**/.*".to_string(), "**/~$*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: default_table(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_table() -> String {
    "rag_chunks".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_router_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_token_timeout")]
    pub token_timeout_secs: f64,
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: default_router_url(),
            api_key: None,
            token_timeout_secs: default_token_timeout(),
            embed_timeout_secs: default_embed_timeout(),
        }
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token_timeout_secs", &self.token_timeout_secs)
            .field("embed_timeout_secs", &self.embed_timeout_secs)
            .finish()
    }
}

impl RouterConfig {
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("router.api_key is not set (set LLM_ROUTER_API_KEY)"),
        }
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.token_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.embed_timeout_secs)
    }
}

fn default_router_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_token_timeout() -> f64 {
    10.0
}
fn default_embed_timeout() -> f64 {
    60.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_overlap() -> usize {
    50
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
    "0.0.0.0:8081".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn require_db_url(&self) -> Result<&str> {
        match self.db.url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url),
            _ => bail!("db.url is not set (set VECTOR_DB_URL)"),
        }
    }
}

/// Load configuration from an optional TOML file plus the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("WATCH_DIR") {
        config.watch.dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("MAX_CONCURRENT_TASKS") {
        config.watch.concurrency = parse_env("MAX_CONCURRENT_TASKS", &v)?;
    }
    if let Some(v) = lookup("VECTOR_DB_URL") {
        config.db.url = Some(v);
    }
    if let Some(v) = lookup("ROUTER_URL") {
        config.router.base_url = v;
    }
    if let Some(v) = lookup("LLM_ROUTER_API_KEY") {
        config.router.api_key = Some(v);
    }
    if let Some(v) = lookup("TOKEN_TIMEOUT") {
        config.router.token_timeout_secs = parse_env("TOKEN_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("EMBED_TIMEOUT") {
        config.router.embed_timeout_secs = parse_env("EMBED_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("CHUNK_SIZE") {
        config.chunking.max_tokens = parse_env("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = lookup("CHUNK_OVERLAP") {
        config.chunking.overlap_tokens = parse_env("CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = lookup("BIND_ADDR") {
        config.server.bind = v;
    }
    Ok(())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {:?} ({})", key, value, e))
}

/// Check cross-field constraints.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!(
            "chunking.overlap_tokens ({}) must be smaller than chunking.max_tokens ({})",
            config.chunking.overlap_tokens,
            config.chunking.max_tokens
        );
    }

    // Validate watcher
    if config.watch.concurrency == 0 {
        bail!("watch.concurrency must be >= 1");
    }

    // Validate router timeouts
    for (name, secs) in [
        ("router.token_timeout_secs", config.router.token_timeout_secs),
        ("router.embed_timeout_secs", config.router.embed_timeout_secs),
    ] {
        if !(secs.is_finite() && secs > 0.0) {
            bail!("{} must be a positive number of seconds", name);
        }
    }

    // Validate database pool
    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }
    crate::store::postgres::validate_table_name(&config.db.table)?;

    Ok(())
}
