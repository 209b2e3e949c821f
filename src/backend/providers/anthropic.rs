//! Anthropic Messages API backend (Claude)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{AdapterConfig, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::backend::stats::CallStats;
use crate::backend::stream::{ensure_success, sse_fragments};
use crate::backend::traits::{
    models_message, timed_probe, BackendInfo, ConnectivityReport, Credentials, Generation, TextBackend,
};
use crate::error::{AppError, Result};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<TextDelta>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn parse_event(data: &str) -> Result<Option<String>> {
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| AppError::Generation(format!("Malformed stream event: {}", e)))?;

    match event.kind.as_str() {
        "content_block_delta" => Ok(event.delta.and_then(|d| d.text)),
        "error" => Err(AppError::Generation(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "Anthropic stream error".to_string()),
        )),
        _ => Ok(None),
    }
}

/// Anthropic-specific backend (Claude API)
pub struct AnthropicBackend {
    config: AdapterConfig,
    credentials: Credentials,
}

impl AnthropicBackend {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let credentials = config.require_credentials()?;
        Ok(Self { config, credentials })
    }

    fn get_headers(&self, credentials: &Credentials) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        if let Ok(value) = HeaderValue::from_str(credentials.expose()) {
            headers.insert(HeaderName::from_static("x-api-key"), value);
        }
        headers
    }
}

#[async_trait]
impl TextBackend for AnthropicBackend {
    fn name(&self) -> &str {
        self.config.spec.name
    }

    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport {
        let credentials = credentials.unwrap_or(&self.credentials);
        timed_probe(self.name(), async {
            let url = format!("{}/v1/models", self.config.api_base);
            let response = self
                .config
                .client
                .get(&url)
                .headers(self.get_headers(credentials))
                .send()
                .await
                .map_err(|e| AppError::Connectivity(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Connectivity(format!("Backend returned {}: {}", status, body)));
            }

            let models: ModelsResponse = response
                .json()
                .await
                .map_err(|e| AppError::Connectivity(format!("Failed to parse models response: {}", e)))?;
            let names: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
            Ok(models_message(&names))
        })
        .await
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "stream": streaming,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(backend = %self.name(), model = %self.config.model, streaming, "Sending messages request");

        let url = format!("{}/v1/messages", self.config.api_base);
        let response = self
            .config
            .client
            .post(&url)
            .headers(self.get_headers(&self.credentials))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        let response = ensure_success(response).await?;

        if streaming {
            return Ok(Generation::Streaming(sse_fragments(response, parse_event)));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse response: {}", e)))?;
        let text = message
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        Ok(Generation::Complete(text))
    }

    fn describe(&self) -> BackendInfo {
        self.config.describe()
    }

    fn stats(&self) -> &CallStats {
        &self.config.stats
    }
}
