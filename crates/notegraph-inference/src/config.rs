//! Runtime and provider configuration.
//!
//! Configuration is loaded from:
//! - a TOML file (`$NOTEGRAPH_CONFIG`, else `~/.config/notegraph/config.toml`)
//! - environment variables (`NOTEGRAPH_*`) when no file exists
//!
//! Provider credentials are never part of this file. The lane orchestrator
//! reads them from `OPENAI_API_KEY` / `GEMINI_API_KEY` directly.
//!
//! # Example
//!
//! ```toml
//! [local]
//! model_path = "${HOME}/models/gemma-2b-q5.gguf"
//! gpu = false
//!
//! [openai]
//! model = "gpt-4o-mini"
//!
//! [gemini]
//! timeout_secs = 120
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use notegraph_core::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for notegraph_core::Error {
    fn from(e: ConfigError) -> Self {
        notegraph_core::Error::Config(e.to_string())
    }
}

static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static placeholder pattern")
});

fn validate_url(section: &str, url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} base_url cannot be empty",
            section
        )));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{} base_url must start with http:// or https://, got: {}",
            section, url
        )));
    }
    Ok(())
}

fn positive(section: &str, field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{}.{} must be positive",
            section, field
        )));
    }
    Ok(())
}

// =============================================================================
// LOCAL
// =============================================================================

/// Local completion server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Server binary, resolved through `PATH` when not absolute.
    pub binary: String,
    /// GGUF model file. The local lane fails at startup when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    pub host: String,
    pub context_size: u32,
    pub n_predict: u32,
    pub temperature: f32,
    /// Try GPU offload first, falling back to CPU on backend failure.
    pub gpu: bool,
    pub gpu_layers: u32,
    /// Server threads; derived from available parallelism when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    pub startup_timeout_secs: u64,
    pub health_poll_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            binary: defaults::LOCAL_SERVER_BINARY.to_string(),
            model_path: None,
            host: defaults::LOCAL_HOST.to_string(),
            context_size: defaults::LOCAL_CONTEXT_SIZE,
            n_predict: defaults::LOCAL_N_PREDICT,
            temperature: defaults::LOCAL_TEMPERATURE,
            gpu: true,
            gpu_layers: defaults::LOCAL_GPU_LAYERS,
            threads: None,
            startup_timeout_secs: defaults::LOCAL_STARTUP_TIMEOUT_SECS,
            health_poll_ms: defaults::LOCAL_HEALTH_POLL_MS,
            request_timeout_secs: defaults::LOCAL_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl LocalConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Thread count for the server: configured, else cores minus the reserve, at least one.
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(defaults::LOCAL_THREAD_RESERVE)
                .max(1)
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "local.binary cannot be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "local.host cannot be empty".to_string(),
            ));
        }
        if matches!(self.model_path.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "local.model_path cannot be empty when set".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "local.temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Validation(
                "local.threads must be positive".to_string(),
            ));
        }
        positive("local", "context_size", self.context_size as u64)?;
        positive("local", "n_predict", self.n_predict as u64)?;
        positive("local", "startup_timeout_secs", self.startup_timeout_secs)?;
        positive("local", "health_poll_ms", self.health_poll_ms)?;
        positive("local", "request_timeout_secs", self.request_timeout_secs)?;
        if self.request_timeout_secs >= self.startup_timeout_secs {
            return Err(ConfigError::Validation(format!(
                "local.request_timeout_secs ({}) must be shorter than startup_timeout_secs ({})",
                self.request_timeout_secs, self.startup_timeout_secs
            )));
        }
        Ok(())
    }
}

// =============================================================================
// REMOTE
// =============================================================================

/// Remote provider configuration (shared shape for OpenAI and Gemini).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "RemoteConfig::default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "RemoteConfig::default_max_tokens")]
    pub max_tokens: u32,
}

impl RemoteConfig {
    fn default_timeout() -> u64 {
        defaults::REMOTE_TIMEOUT_SECS
    }

    fn default_max_tokens() -> u32 {
        defaults::REMOTE_MAX_TOKENS
    }

    pub fn openai_default() -> Self {
        Self {
            base_url: defaults::OPENAI_URL.to_string(),
            model: defaults::OPENAI_MODEL.to_string(),
            timeout_secs: Self::default_timeout(),
            max_tokens: Self::default_max_tokens(),
        }
    }

    pub fn gemini_default() -> Self {
        Self {
            base_url: defaults::GEMINI_URL.to_string(),
            model: defaults::GEMINI_MODEL.to_string(),
            timeout_secs: Self::default_timeout(),
            max_tokens: Self::default_max_tokens(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self, section: &str) -> ConfigResult<()> {
        validate_url(section, &self.base_url)?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} model cannot be empty",
                section
            )));
        }
        positive(section, "timeout_secs", self.timeout_secs)?;
        positive(section, "max_tokens", self.max_tokens as u64)?;
        Ok(())
    }
}

// =============================================================================
// ROOT
// =============================================================================

/// Complete notegraph configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotegraphConfig {
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default = "RemoteConfig::openai_default")]
    pub openai: RemoteConfig,
    #[serde(default = "RemoteConfig::gemini_default")]
    pub gemini: RemoteConfig,
}

impl Default for NotegraphConfig {
    fn default() -> Self {
        Self {
            local: LocalConfig::default(),
            openai: RemoteConfig::openai_default(),
            gemini: RemoteConfig::gemini_default(),
        }
    }
}

impl NotegraphConfig {
    /// Get the default config file path.
    ///
    /// Returns: ~/.config/notegraph/config.toml
    pub fn default_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        path.push("notegraph");
        path.push("config.toml");
        path
    }

    /// `$NOTEGRAPH_CONFIG` when set, else the default path.
    pub fn config_path() -> PathBuf {
        env::var("NOTEGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_config_path())
    }

    /// Load from the config file when present, falling back to environment variables.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::config_path();

        if path.exists() {
            info!("Loading notegraph config from: {}", path.display());
            Self::from_file(&path)
        } else {
            debug!(
                "Config file not found at {}, using environment variables",
                path.display()
            );
            let config = Self::from_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML after `${VAR}` substitution and validate.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let content = Self::substitute_env_vars(content);
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `NOTEGRAPH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset or unparsable values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let local = &mut config.local;
        if let Some(binary) = lookup("NOTEGRAPH_LOCAL_BINARY") {
            local.binary = binary;
        }
        local.model_path = lookup("NOTEGRAPH_LOCAL_MODEL").filter(|p| !p.trim().is_empty());
        if let Some(gpu) = lookup("NOTEGRAPH_LOCAL_GPU") {
            local.gpu = !matches!(gpu.to_lowercase().as_str(), "0" | "false" | "off" | "no");
        }
        if let Some(threads) = parsed("NOTEGRAPH_LOCAL_THREADS") {
            local.threads = Some(threads as usize);
        }
        if let Some(n) = parsed("NOTEGRAPH_LOCAL_N_PREDICT") {
            local.n_predict = n as u32;
        }
        if let Some(secs) = parsed("NOTEGRAPH_LOCAL_STARTUP_TIMEOUT") {
            local.startup_timeout_secs = secs;
        }
        if let Some(secs) = parsed("NOTEGRAPH_LOCAL_REQUEST_TIMEOUT") {
            local.request_timeout_secs = secs;
        }

        for (remote, prefix) in [
            (&mut config.openai, "NOTEGRAPH_OPENAI"),
            (&mut config.gemini, "NOTEGRAPH_GEMINI"),
        ] {
            if let Some(url) = lookup(&format!("{}_URL", prefix)) {
                remote.base_url = url;
            }
            if let Some(model) = lookup(&format!("{}_MODEL", prefix)) {
                remote.model = model;
            }
            if let Some(secs) = parsed("NOTEGRAPH_REMOTE_TIMEOUT") {
                remote.timeout_secs = secs;
            }
        }

        config
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.local.validate()?;
        self.openai.validate("openai")?;
        self.gemini.validate("gemini")?;
        Ok(())
    }

    /// Substitute `${VAR}` placeholders; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> String {
        ENV_PLACEHOLDER
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}
