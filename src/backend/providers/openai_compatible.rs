//! OpenAI API compatible chat completions (ChatGPT, DeepSeek, Doubao, Tongyi Qianwen)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{AdapterConfig, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::backend::stats::CallStats;
use crate::backend::stream::{ensure_success, sse_fragments};
use crate::backend::traits::{
    models_message, timed_probe, BackendInfo, ConnectivityReport, Credentials, Generation, TextBackend,
};
use crate::error::{AppError, Result};

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request (OpenAI compatible)
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
}

/// Parse one SSE payload of a streamed chat completion
fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| AppError::Generation(format!("Malformed stream chunk: {}", e)))?;

    if let Some(err) = chunk.error {
        return Err(AppError::Generation(err.message));
    }

    Ok(chunk.choices.into_iter().next().and_then(|choice| choice.delta.content))
}

/// OpenAI API compatible text backend
pub struct OpenAICompatibleBackend {
    config: AdapterConfig,
    credentials: Credentials,
}

impl OpenAICompatibleBackend {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let credentials = config.require_credentials()?;
        Ok(Self { config, credentials })
    }

    /// Get headers with bearer authentication
    fn get_headers(&self, credentials: &Credentials) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", credentials.expose())) {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }

    async fn list_models(&self, credentials: &Credentials) -> Result<Vec<String>> {
        let url = format!("{}/models", self.config.api_base);
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

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl TextBackend for OpenAICompatibleBackend {
    fn name(&self) -> &str {
        self.config.spec.name
    }

    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport {
        let credentials = credentials.unwrap_or(&self.credentials);
        timed_probe(self.name(), async {
            let models = self.list_models(credentials).await?;
            Ok(models_message(&models))
        })
        .await
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
            stream: streaming,
        };

        debug!(backend = %self.name(), model = %self.config.model, streaming, "Sending chat completion request");

        let url = format!("{}/chat/completions", self.config.api_base);
        let response = self
            .config
            .client
            .post(&url)
            .headers(self.get_headers(&self.credentials))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        let response = ensure_success(response).await?;

        if streaming {
            return Ok(Generation::Streaming(sse_fragments(response, parse_chunk)));
        }

        let result = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(backend = %self.name(), error = %e, "Failed to parse chat completion response");
            AppError::Generation(format!("Failed to parse response: {}", e))
        })?;

        let text = result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(Generation::Complete(text))
    }

    fn describe(&self) -> BackendInfo {
        self.config.describe()
    }

    fn stats(&self) -> &CallStats {
        &self.config.stats
    }
}
