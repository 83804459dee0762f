use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const VECTOR_URL_ENV: &str = "UPSTASH_VECTOR_REST_URL";
pub const VECTOR_TOKEN_ENV: &str = "UPSTASH_VECTOR_REST_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tarball_mb")]
    pub max_tarball_mb: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_user_agent() -> String {
    format!("rindex/{}", env!("CARGO_PKG_VERSION"))
}
fn default_github_timeout() -> u64 {
    120
}
fn default_max_tarball_mb() -> u64 {
    500
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            timeout_secs: default_github_timeout(),
            max_tarball_mb: default_max_tarball_mb(),
        }
    }
}

impl GitHubConfig {
    pub fn max_tarball_bytes(&self) -> u64 {
        self.max_tarball_mb * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `upstash` (REST index) or `memory` (process-local, for trials).
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_vector_provider() -> String {
    "upstash".to_string()
}
fn default_vector_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: None,
            token: None,
            timeout_secs: default_vector_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_run_timeout() -> u64 {
    300
}
fn default_stale_after() -> u64 {
    600
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout(),
            stale_after_secs: default_stale_after(),
            max_file_bytes: default_max_file_bytes(),
            exclude_globs: Vec::new(),
        }
    }
}

impl Config {
    /// Configuration with defaults everywhere and the process-local
    /// vector index.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            server: ServerConfig::default(),
            github: GitHubConfig::default(),
            vector: VectorConfig {
                provider: "memory".to_string(),
                ..VectorConfig::default()
            },
            indexing: IndexingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    resolve_env(&mut config);
    validate(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn resolve_env(config: &mut Config) {
    if config.vector.url.is_none() {
        config.vector.url = std::env::var(VECTOR_URL_ENV).ok();
    }
    if config.vector.token.is_none() {
        config.vector.token = std::env::var(VECTOR_TOKEN_ENV).ok();
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.github.timeout_secs == 0 {
        anyhow::bail!("github.timeout_secs must be > 0");
    }
    if config.github.max_tarball_mb == 0 {
        anyhow::bail!("github.max_tarball_mb must be > 0");
    }

    if config.indexing.run_timeout_secs == 0 {
        anyhow::bail!("indexing.run_timeout_secs must be > 0");
    }
    if config.indexing.stale_after_secs < config.indexing.run_timeout_secs {
        anyhow::bail!("indexing.stale_after_secs must be >= indexing.run_timeout_secs");
    }
    if config.indexing.max_file_bytes == 0 {
        anyhow::bail!("indexing.max_file_bytes must be > 0");
    }
    for pattern in &config.indexing.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid indexing.exclude_globs pattern: '{}'", pattern))?;
    }

    match config.vector.provider.as_str() {
        "memory" => {}
        "upstash" => {
            if config.vector.url.is_none() {
                anyhow::bail!(
                    "vector.url must be set (or {}) when provider is 'upstash'",
                    VECTOR_URL_ENV
                );
            }
            if config.vector.token.is_none() {
                anyhow::bail!(
                    "vector.token must be set (or {}) when provider is 'upstash'",
                    VECTOR_TOKEN_ENV
                );
            }
        }
        other => anyhow::bail!(
            "Unknown vector provider: '{}'. Must be upstash or memory.",
            other
        ),
    }

    Ok(())
}
