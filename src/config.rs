//! Server and oracle configuration.

use crate::llm_client::{LlmConfig, LlmProvider};
use crate::oracle::DEFAULT_MAX_ANSWER_CHARS;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Oracle (language model) settings.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// LLM provider.
    provider: LlmProvider,
    /// Model name.
    model: String,
    /// Completion token cap; the answer is a single move.
    max_tokens: u32,
    /// Bound on one oracle call, in milliseconds.
    timeout_ms: u64,
    /// Characters of the answer kept before arbitration.
    max_answer_chars: usize,
    /// Endpoint override for the provider.
    endpoint: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 50,
            timeout_ms: 15_000,
            max_answer_chars: DEFAULT_MAX_ANSWER_CHARS,
            endpoint: None,
        }
    }
}

impl OracleConfig {
    /// Oracle call bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builds the LLM client configuration from the provider's API key
    /// environment variable.
    #[instrument(skip(self), fields(provider = %self.provider, model = %self.model))]
    pub fn llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let var = self.provider.api_key_var();
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::new(format!("{} environment variable not set", var)))?;

        let config = LlmConfig::new(
            self.provider,
            api_key,
            self.model.clone(),
            self.max_tokens,
            self.timeout(),
        );
        Ok(match &self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint.clone()),
            None => config,
        })
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    host: String,
    /// Bind port.
    port: u16,
    /// Directory of static assets served outside `/api`.
    static_dir: Option<PathBuf>,
    /// Oracle settings.
    oracle: OracleConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            static_dir: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        info!(host = %config.host, port = config.port, "Config loaded");
        Ok(config)
    }

    /// Loads `path` when it exists, defaults otherwise.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            info!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Applies the `PORT` environment variable, if it holds a port number.
    pub fn apply_env(mut self) -> Self {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            debug!(port, "Port taken from environment");
            self.port = port;
        }
        self
    }

    /// Overrides from the command line.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>, static_dir: Option<PathBuf>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if static_dir.is_some() {
            self.static_dir = static_dir;
        }
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port(), &3000);
        assert_eq!(config.oracle().provider(), &LlmProvider::Anthropic);
        assert_eq!(config.oracle().timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080

            [oracle]
            provider = "openai"
            model = "gpt-4o-mini"
            timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.port(), &8080);
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.oracle().provider(), &LlmProvider::OpenAI);
        assert_eq!(config.oracle().model(), "gpt-4o-mini");
        assert_eq!(config.oracle().timeout(), Duration::from_millis(2500));
        assert_eq!(config.oracle().max_answer_chars(), &DEFAULT_MAX_ANSWER_CHARS);
    }

    #[test]
    fn test_rejects_bad_toml() {
        assert!(ServerConfig::from_toml("port = \"not a number\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"0.0.0.0\"\nstatic_dir = \"public\"").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.static_dir(), &Some(PathBuf::from("public")));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load_or_default("/definitely/not/here.toml").unwrap();
        assert_eq!(config.port(), &3000);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::default().with_overrides(Some("0.0.0.0".into()), Some(9000), None);
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), &9000);
        assert!(config.static_dir().is_none());
    }
}
