//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for pubbatch
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ncbi: NcbiConfig,
    pub http: HttpConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NcbiConfig {
    pub base_url: String,
    /// Sent as `tool=` on every request
    pub tool: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub email: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for NcbiConfig {
    fn default() -> Self {
        Self {
            base_url: pubbatch_pubmed::DEFAULT_BASE_URL.to_string(),
            tool: "pubbatch".to_string(),
            email: None,
            api_key: std::env::var("NCBI_API_KEY").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Calls per second; unset means 3 anonymous, 10 with an API key
    pub rate_limit: Option<f64>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            rate_limit: None,
            max_retries: 3,
            backoff_base_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    /// NCBI allows 3 requests/second without a key and 10 with one.
    pub fn effective_rate_limit(&self, has_api_key: bool) -> f64 {
        self.rate_limit
            .unwrap_or(if has_api_key { 10.0 } else { 3.0 })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub token_limit: usize,
    pub page_size: usize,
    pub max_results: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            token_limit: 8000,
            page_size: 200,
            max_results: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./pubmed_output"),
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Find the config file to use
    ///
    /// Search order:
    /// 1. `explicit` (from `--config`), which must exist
    /// 2. ./pubbatch.toml (current directory)
    /// 3. ~/.config/pubbatch/config.toml
    pub fn locate(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }

        let local_config = PathBuf::from("pubbatch.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        directories::ProjectDirs::from("", "", "pubbatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
