//! Local Ollama backend

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AdapterConfig, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::backend::stats::CallStats;
use crate::backend::stream::{ensure_success, ndjson_fragments};
use crate::backend::traits::{
    models_message, timed_probe, BackendInfo, ConnectivityReport, Credentials, Generation, TextBackend,
};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

fn parse_line(line: &str) -> Result<Option<String>> {
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| AppError::Generation(format!("Malformed stream line: {}", e)))?;
    if let Some(err) = chunk.error {
        return Err(AppError::Generation(err));
    }
    Ok(chunk.response)
}

/// Ollama backend. Credentials are optional and sent as a bearer token when present.
pub struct OllamaBackend {
    config: AdapterConfig,
}

impl OllamaBackend {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    fn authorize(&self, request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
        match credentials.or(self.config.credentials.as_ref()) {
            Some(creds) => request.bearer_auth(creds.expose()),
            None => request,
        }
    }
}

#[async_trait]
impl TextBackend for OllamaBackend {
    fn name(&self) -> &str {
        self.config.spec.name
    }

    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport {
        timed_probe(self.name(), async {
            let url = format!("{}/api/tags", self.config.api_base);
            let response = self
                .authorize(self.config.client.get(&url), credentials)
                .send()
                .await
                .map_err(|e| AppError::Connectivity(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Connectivity(format!("Backend returned {}: {}", status, body)));
            }

            let tags: TagsResponse = response
                .json()
                .await
                .map_err(|e| AppError::Connectivity(format!("Failed to parse tags response: {}", e)))?;
            let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
            Ok(models_message(&names))
        })
        .await
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation> {
        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": streaming,
            "options": {
                "temperature": TEMPERATURE,
                "num_predict": MAX_OUTPUT_TOKENS,
            },
        });

        debug!(backend = %self.name(), model = %self.config.model, streaming, "Sending generate request");

        let url = format!("{}/api/generate", self.config.api_base);
        let response = self
            .authorize(self.config.client.post(&url), None)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        let response = ensure_success(response).await?;

        if streaming {
            return Ok(Generation::Streaming(ndjson_fragments(response, parse_line)));
        }

        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse response: {}", e)))?;
        if let Some(err) = chunk.error {
            return Err(AppError::Generation(err));
        }
        Ok(Generation::Complete(chunk.response.unwrap_or_default()))
    }

    fn describe(&self) -> BackendInfo {
        self.config.describe()
    }

    fn stats(&self) -> &CallStats {
        &self.config.stats
    }
}
