//! Configuration for vpgmd and vpgmctl.
//!
//! Loads settings from a TOML file or uses defaults. Lookup order: an
//! explicit path, `$VPGM_CONFIG`, /etc/vpgm/config.toml, ./vpgm.toml.
//! Relative file paths inside a config file are relative to that file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::oracle::{HttpOracle, OracleBackend, OracleError, OracleParams};
use crate::orchestrator::RetryPolicy;
use crate::template::DEFAULT_TEMPLATE_ID;
use crate::validate::DEFAULT_TOLERANCE;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "VPGM_CONFIG";

/// System-wide config file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/vpgm/config.toml";

/// Working-directory config file
pub const LOCAL_CONFIG_PATH: &str = "vpgm.toml";

/// Template document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Path to the template JSON document
    #[serde(default = "default_templates_path")]
    pub path: PathBuf,

    /// Template used for every inference unless overridden
    #[serde(default = "default_template_id")]
    pub default_id: String,
}

fn default_templates_path() -> PathBuf {
    PathBuf::from("prompt_template.json")
}

fn default_template_id() -> String {
    DEFAULT_TEMPLATE_ID.to_string()
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
            default_id: default_template_id(),
        }
    }
}

/// Question dataset settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON array or JSON Lines export of the validation split
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/scienceqa_validation.jsonl")
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
        }
    }
}

/// Oracle (language model) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub backend: OracleBackend,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// HTTP timeout per oracle call
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Inline API key. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_timeout() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl OracleConfig {
    pub fn params(&self) -> OracleParams {
        OracleParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn build(&self) -> Result<HttpOracle, OracleError> {
        HttpOracle::new(
            self.backend,
            &self.endpoint,
            self.api_key.clone(),
            &self.api_key_env,
            self.timeout_secs,
        )
    }
}

/// Retry loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Oracle calls per inference (values below 1 mean 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Allowed |sum - 1| for every probability mapping
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load config. An explicit path must load; the fallbacks may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }
        for path in [SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH] {
            if Path::new(path).exists() {
                return Self::load_from_path(Path::new(path));
            }
        }
        warn!("Config not found, using defaults");
        Ok(Config::default())
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.check()?;
        info!("Loaded config from {}", path.display());
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_relative_to(base))
    }

    /// Reject values no run could use
    fn check(&self) -> Result<(), ConfigError> {
        if !(self.validation.tolerance >= 0.0 && self.validation.tolerance < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "validation.tolerance must be in [0, 1), got {}",
                self.validation.tolerance
            )));
        }
        if self.templates.default_id.is_empty() {
            return Err(ConfigError::Invalid("templates.default_id is empty".to_string()));
        }
        Ok(())
    }

    /// Paths in the file are relative to the file's directory
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        for path in [&mut self.templates.path, &mut self.dataset.path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.templates.default_id, "scienceqa_vpgm_4latent_generic");
        assert_eq!(config.oracle.backend, OracleBackend::OpenAi);
        assert_eq!(config.oracle.model, "gpt-4.1");
        assert_eq!(config.oracle.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_ms, 1_000);
        assert_eq!(config.validation.tolerance, 1e-3);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [oracle]
            backend = "ollama"
            endpoint = "http://localhost:11434"
            model = "qwen2.5:7b-instruct"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.oracle.backend, OracleBackend::Ollama);
        assert_eq!(config.oracle.max_output_tokens, 2048);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 1_000);
        assert_eq!(config.oracle.params().model, "qwen2.5:7b-instruct");
    }

    #[test]
    fn test_retry_policy_clamps_attempts() {
        let retry = RetryConfig {
            max_attempts: 0,
            backoff_ms: 250,
        };
        let policy = retry.policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let err = Config::load(Some(Path::new("/nonexistent/vpgm.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_bad_tolerance_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[validation]\ntolerance = 2.0").unwrap();
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry\nmax_attempts = ").unwrap();
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_relative_paths_resolved() {
        let config = Config::default().resolve_relative_to(Path::new("/srv/vpgm"));
        assert_eq!(config.templates.path, PathBuf::from("/srv/vpgm/prompt_template.json"));
        assert_eq!(
            config.dataset.path,
            PathBuf::from("/srv/vpgm/data/scienceqa_validation.jsonl")
        );
    }
}
