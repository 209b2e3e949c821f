//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "TEXTGEN_GATEWAY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub backends: HashMap<String, BackendSettings>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    60001
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Backend selection, retry policy and simulated budget
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_active_backend")]
    pub active_backend: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

fn default_active_backend() -> String {
    "gemini".to_string()
}

/// Retry behaviour of the streaming orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Latency recorded for a call that exhausted every attempt
    #[serde(default = "default_failure_latency")]
    pub failure_latency_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    8000
}

fn default_failure_latency() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            failure_latency_ms: default_failure_latency(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Locally simulated token budget. Observability only, never enforced.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct BudgetConfig {
    #[serde(default = "default_total_tokens")]
    pub total_tokens: u64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: u64,
}

fn default_total_tokens() -> u64 {
    1_000_000
}

fn default_daily_limit() -> u64 {
    10_000
}

fn default_monthly_limit() -> u64 {
    200_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_tokens: default_total_tokens(),
            daily_limit: default_daily_limit(),
            monthly_limit: default_monthly_limit(),
        }
    }
}

/// Per-backend credential material and endpoint overrides
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSettings {
    /// Opaque secret; composite secrets are joined with ':'
    #[serde(default)]
    pub credentials: Option<String>,

    /// Name of an environment variable holding the secret
    #[serde(default)]
    pub credentials_env: Option<String>,

    #[serde(default)]
    pub api_base: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_timeout() -> u64 {
    60000
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            credentials_env: None,
            api_base: None,
            model: None,
            timeout_ms: default_timeout(),
        }
    }
}

impl BackendSettings {
    /// Resolve the credential material, preferring the environment variable
    pub fn resolve_credentials(&self) -> Option<String> {
        self.credentials_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.credentials.clone())
            .filter(|secret| !secret.trim().is_empty())
    }
}

impl Settings {
    /// Load settings from the default configuration file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let format = if path.extension().map_or(false, |ext| ext == "toml") {
            FileFormat::Toml
        } else {
            FileFormat::Yaml
        };

        let mut config_builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .set_default("gateway.active_backend", default_active_backend())?;

        if path.exists() {
            config_builder = config_builder.add_source(File::from(path).format(format));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("TEXTGEN_GATEWAY")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = config_builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Server port cannot be 0".to_string()));
        }

        let retry = &self.gateway.retry;
        if retry.max_attempts == 0 {
            return Err(AppError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(AppError::Configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }

        let active = &self.gateway.active_backend;
        if crate::backend::providers::find(active).is_none() {
            return Err(AppError::Configuration(format!(
                "Active backend '{}' is not a supported provider",
                active
            )));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            gateway: GatewayConfig::default(),
            backends: HashMap::new(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            active_backend: default_active_backend(),
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}
