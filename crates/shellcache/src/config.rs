//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcache_core::config::{
    DEFAULT_DYNAMIC_NAMESPACE, DEFAULT_DYNAMIC_PATTERNS, DEFAULT_OFFLINE_FALLBACK,
    DEFAULT_SHELL_MANIFEST, DEFAULT_STATIC_NAMESPACE, resolve, resolve_manifest,
};
use shellcache_proxy::HttpFetcherConfig;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// App shell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Origin the shell is served from; origin-form requests resolve here
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Resources installed into the static namespace, relative to the origin
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,
    /// Manifest entry served when offline
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            manifest: default_manifest(),
            offline_fallback: default_offline_fallback(),
        }
    }
}

/// Cache namespaces and freshness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_static_namespace")]
    pub static_namespace: String,
    #[serde(default = "default_dynamic_namespace")]
    pub dynamic_namespace: String,
    #[serde(default = "default_dynamic_max_age_secs")]
    pub dynamic_max_age_secs: u64,
    #[serde(default = "default_dynamic_patterns")]
    pub dynamic_patterns: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_namespace: default_static_namespace(),
            dynamic_namespace: default_dynamic_namespace(),
            dynamic_max_age_secs: default_dynamic_max_age_secs(),
            dynamic_patterns: default_dynamic_patterns(),
        }
    }
}

/// Outbound network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            skip_tls_verify: false,
            user_agent: None,
        }
    }
}

/// Body storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            path: default_storage_path(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_manifest() -> Vec<String> {
    DEFAULT_SHELL_MANIFEST.iter().map(|s| s.to_string()).collect()
}

fn default_offline_fallback() -> String {
    DEFAULT_OFFLINE_FALLBACK.to_string()
}

fn default_static_namespace() -> String {
    DEFAULT_STATIC_NAMESPACE.to_string()
}

fn default_dynamic_namespace() -> String {
    DEFAULT_DYNAMIC_NAMESPACE.to_string()
}

fn default_dynamic_max_age_secs() -> u64 {
    600
}

fn default_dynamic_patterns() -> Vec<String> {
    DEFAULT_DYNAMIC_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_storage_path() -> String {
    "./data/blobs".to_string()
}

fn default_db_path() -> String {
    "./data/shellcache.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        // Check if config file exists
        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Build the validated core cache configuration
    pub fn cache_config(&self) -> Result<shellcache_core::CacheConfig> {
        let origin = Url::parse(&self.shell.origin)
            .with_context(|| format!("Invalid shell origin: {}", self.shell.origin))?;

        let config = shellcache_core::CacheConfig {
            shell_manifest: resolve_manifest(&origin, self.shell.manifest.as_slice())?,
            offline_fallback: resolve(&origin, &self.shell.offline_fallback)?,
            origin,
            static_namespace: self.cache.static_namespace.clone(),
            dynamic_namespace: self.cache.dynamic_namespace.clone(),
            dynamic_max_age: Duration::from_secs(self.cache.dynamic_max_age_secs),
            dynamic_patterns: self.cache.dynamic_patterns.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Outbound client settings
    pub fn fetcher_config(&self) -> HttpFetcherConfig {
        let mut fetcher = HttpFetcherConfig {
            timeout: Duration::from_secs(self.upstream.timeout_secs),
            skip_tls_verify: self.upstream.skip_tls_verify,
            ..HttpFetcherConfig::default()
        };
        if let Some(user_agent) = &self.upstream.user_agent {
            fetcher.user_agent = user_agent.clone();
        }
        fetcher
    }

    /// SQLite connection URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database.path)
    }
}
