use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::extraction::DEFAULT_PIVOT_CONCURRENCY;
use crate::model::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::orchestrator::DEFAULT_HEARTBEAT_SECS;
use crate::secrets::SecretSource;

pub const CONFIG_VERSION: &str = "1.0";
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Defaults to `~/.extracta/data/extracta.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Defaults to `~/.extracta/blobs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<String>,
    pub model: ModelConfig,
    #[serde(default = "default_pivot_concurrency")]
    pub pivot_concurrency: usize,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// How often a running job refreshes its `updated_at`. Keep it well
    /// below `stale_after_secs`.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_pivot_concurrency() -> usize {
    DEFAULT_PIVOT_CONCURRENCY
}

fn default_batch_concurrency() -> usize {
    num_cpus::get()
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: SecretSource,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

fn default_temperature() -> Option<f32> {
    Some(0.0)
}

impl Config {
    /// A config using every default, for the given model.
    pub fn for_model(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            database_path: None,
            storage_root: None,
            model: ModelConfig {
                endpoint: endpoint.into(),
                model: model.into(),
                api_key: SecretSource::default(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                max_retries: DEFAULT_MAX_RETRIES,
                backoff_ms: DEFAULT_BACKOFF_MS,
                temperature: default_temperature(),
            },
            pivot_concurrency: DEFAULT_PIVOT_CONCURRENCY,
            batch_concurrency: default_batch_concurrency(),
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(expand_home(path)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn storage_root(&self) -> Option<PathBuf> {
        match &self.storage_root {
            Some(path) => Some(expand_home(path)),
            None => dirs::home_dir().map(|h| h.join(".extracta").join("blobs")),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
