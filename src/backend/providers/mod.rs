//! Built-in provider adapters and the compile-time factory table

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai_compatible;
pub mod wenxin;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::stats::CallStats;
use crate::backend::traits::{BackendInfo, Credentials, TextBackend};
use crate::config::{BackendSettings, BudgetConfig};
use crate::error::{AppError, Result};

pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use wenxin::WenxinBackend;

pub(crate) const TEMPERATURE: f32 = 0.7;
pub(crate) const TOP_P: f32 = 0.95;
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Wire family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAICompatible,
    Anthropic,
    Gemini,
    Ollama,
    Wenxin,
}

/// Static facts about one supported backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub model: &'static str,
    pub provider: &'static str,
    pub api_base: &'static str,
    pub kind: ProviderKind,
}

pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "gemini",
        display_name: "Google Gemini",
        model: "gemini-exp-1206",
        provider: "Google",
        api_base: "https://generativelanguage.googleapis.com",
        kind: ProviderKind::Gemini,
    },
    ProviderSpec {
        name: "chatgpt",
        display_name: "OpenAI ChatGPT",
        model: "gpt-4o",
        provider: "OpenAI",
        api_base: "https://api.openai.com/v1",
        kind: ProviderKind::OpenAICompatible,
    },
    ProviderSpec {
        name: "claude",
        display_name: "Anthropic Claude",
        model: "claude-3-5-sonnet-latest",
        provider: "Anthropic",
        api_base: "https://api.anthropic.com",
        kind: ProviderKind::Anthropic,
    },
    ProviderSpec {
        name: "doubao",
        display_name: "Doubao",
        model: "doubao-text-v1",
        provider: "ByteDance",
        api_base: "https://api.doubao.com/v1",
        kind: ProviderKind::OpenAICompatible,
    },
    ProviderSpec {
        name: "tongyiqianwen",
        display_name: "Tongyi Qianwen",
        model: "qwen-max",
        provider: "Alibaba Cloud",
        api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        kind: ProviderKind::OpenAICompatible,
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        model: "deepseek-chat",
        provider: "DeepSeek",
        api_base: "https://api.deepseek.com/v1",
        kind: ProviderKind::OpenAICompatible,
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama",
        model: "llama3",
        provider: "Local",
        api_base: "http://localhost:11434",
        kind: ProviderKind::Ollama,
    },
    ProviderSpec {
        name: "wenxinyiyang",
        display_name: "ERNIE Bot",
        model: "ERNIE-Bot-4",
        provider: "Baidu",
        api_base: "https://aip.baidubce.com",
        kind: ProviderKind::Wenxin,
    },
];

/// Look up a built-in provider by registry name
pub fn find(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Values every adapter is constructed from
#[derive(Debug)]
pub struct AdapterConfig {
    pub spec: &'static ProviderSpec,
    pub model: String,
    pub api_base: String,
    pub credentials: Option<Credentials>,
    pub client: Client,
    pub stats: CallStats,
}

impl AdapterConfig {
    pub fn new(spec: &'static ProviderSpec, settings: &BackendSettings, budget: BudgetConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            spec,
            model: settings.model.clone().unwrap_or_else(|| spec.model.to_string()),
            api_base: settings
                .api_base
                .as_deref()
                .unwrap_or(spec.api_base)
                .trim_end_matches('/')
                .to_string(),
            credentials: settings.resolve_credentials().map(Credentials::new),
            client,
            stats: CallStats::new(budget),
        })
    }

    /// Credential material, or a configuration error naming the backend
    pub fn require_credentials(&self) -> Result<Credentials> {
        self.credentials.clone().ok_or_else(|| {
            AppError::Configuration(format!("No credentials configured for '{}'", self.spec.name))
        })
    }

    /// Override credentials when given, otherwise the configured ones
    pub fn credentials_or(&self, credentials: Option<&Credentials>) -> Result<Credentials> {
        match credentials {
            Some(creds) => Ok(creds.clone()),
            None => self.require_credentials(),
        }
    }

    pub fn describe(&self) -> BackendInfo {
        BackendInfo {
            name: self.spec.display_name.to_string(),
            version: self.model.clone(),
            provider: self.spec.provider.to_string(),
            statistics: self.stats.snapshot(),
        }
    }
}

/// Construct the adapter for a built-in provider
pub fn build(spec: &'static ProviderSpec, settings: &BackendSettings, budget: BudgetConfig) -> Result<Arc<dyn TextBackend>> {
    let config = AdapterConfig::new(spec, settings, budget)?;
    let backend: Arc<dyn TextBackend> = match spec.kind {
        ProviderKind::OpenAICompatible => Arc::new(OpenAICompatibleBackend::new(config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(config)?),
        ProviderKind::Gemini => Arc::new(GeminiBackend::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaBackend::new(config)),
        ProviderKind::Wenxin => Arc::new(WenxinBackend::new(config)?),
    };
    Ok(backend)
}
