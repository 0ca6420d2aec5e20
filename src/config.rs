use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{JobAlertError, JobAlertResult};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const EMBEDDING_API_KEY_ENV: &str = "JOBALERT_EMBEDDING_API_KEY";
pub const PIPELINE_SECRET_ENV: &str = "JOBALERT_PIPELINE_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Optional key stored in config.toml (overridden by JOBALERT_EMBEDDING_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key: None,
            request_timeout_secs: default_embedding_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Rate-limit (429) wait is `2^attempt * rate_limit_base_ms`.
    #[serde(default = "default_rate_limit_base_ms")]
    pub rate_limit_base_ms: u64,
    /// Fixed wait after a 5xx response.
    #[serde(default = "default_server_error_delay_ms")]
    pub server_error_delay_ms: u64,
    /// Transport failure wait is `2^attempt * network_error_base_ms`.
    #[serde(default = "default_network_error_base_ms")]
    pub network_error_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_base_ms: default_rate_limit_base_ms(),
            server_error_delay_ms: default_server_error_delay_ms(),
            network_error_base_ms: default_network_error_base_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_url")]
    pub url: String,
    /// Shared secret sent as a bearer token (overridden by JOBALERT_PIPELINE_SECRET).
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_pipeline_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url: default_pipeline_url(),
            secret: None,
            request_timeout_secs: default_pipeline_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_preferences_path")]
    pub path: PathBuf,
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
            default_user: default_user(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "https://api.jina.ai/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "jina-embeddings-v3".to_string()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rate_limit_base_ms() -> u64 {
    5000
}

fn default_server_error_delay_ms() -> u64 {
    5000
}

fn default_network_error_base_ms() -> u64 {
    2000
}

fn default_pipeline_url() -> String {
    "http://localhost:3000/api/pipeline/run".to_string()
}

fn default_pipeline_timeout() -> u64 {
    300
}

fn default_preferences_path() -> PathBuf {
    PathBuf::from("preferences.toml")
}

fn default_user() -> String {
    "default".to_string()
}

impl AppConfig {
    /// Embedding API key: environment first, then config.toml. Blank values count as absent.
    pub fn embedding_api_key(&self) -> Option<String> {
        non_blank(std::env::var(EMBEDDING_API_KEY_ENV).ok())
            .or_else(|| non_blank(self.embedding.api_key.clone()))
    }

    pub fn pipeline_secret(&self) -> Option<String> {
        non_blank(std::env::var(PIPELINE_SECRET_ENV).ok())
            .or_else(|| non_blank(self.pipeline.secret.clone()))
    }

    /// Relative file paths are taken relative to the directory holding config.toml.
    pub fn anchor_paths(&mut self, config_dir: &Path) {
        if self.preferences.path.is_relative() {
            self.preferences.path = config_dir.join(&self.preferences.path);
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in working directory");
            return Some(candidate);
        }
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("jobalert").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Some(candidate);
        }
    }

    None
}

pub fn parse_config(content: &str) -> JobAlertResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

/// Load the config from an explicit path, or search the usual locations.
/// Only an explicit path is required to exist; otherwise defaults apply.
pub fn load_config(explicit: Option<&Path>) -> JobAlertResult<AppConfig> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(JobAlertError::Config(format!(
                "config file {} does not exist",
                p.display()
            )));
        }
        Some(p) => p.to_path_buf(),
        None => match resolve_config_path() {
            Some(p) => p,
            None => {
                tracing::warn!("config.toml not found; using built-in defaults");
                return Ok(AppConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let mut config = parse_config(&content)?;
    if let Some(dir) = path.parent() {
        config.anchor_paths(dir);
    }
    tracing::info!(
        path = %path.display(),
        endpoint = %config.embedding.endpoint,
        pipeline = %config.pipeline.url,
        "config loaded"
    );
    Ok(config)
}
