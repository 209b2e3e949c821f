//! Google Gemini backend

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AdapterConfig, MAX_OUTPUT_TOKENS, TEMPERATURE, TOP_P};
use crate::backend::stats::CallStats;
use crate::backend::stream::{ensure_success, sse_fragments};
use crate::backend::traits::{
    models_message, timed_probe, BackendInfo, ConnectivityReport, Credentials, Generation, TextBackend,
};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl GenerateResponse {
    fn into_text(self) -> Result<Option<String>> {
        if let Some(err) = self.error {
            return Err(AppError::Generation(err.message));
        }
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(Some(text))
    }
}

fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| AppError::Generation(format!("Malformed stream chunk: {}", e)))?;
    chunk.into_text()
}

/// Gemini backend; the API key travels as a query parameter
pub struct GeminiBackend {
    config: AdapterConfig,
    credentials: Credentials,
}

impl GeminiBackend {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let credentials = config.require_credentials()?;
        Ok(Self { config, credentials })
    }
}

#[async_trait]
impl TextBackend for GeminiBackend {
    fn name(&self) -> &str {
        self.config.spec.name
    }

    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport {
        let credentials = credentials.unwrap_or(&self.credentials);
        timed_probe(self.name(), async {
            let url = format!("{}/v1beta/models", self.config.api_base);
            let response = self
                .config
                .client
                .get(&url)
                .query(&[("key", credentials.expose())])
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
            let names: Vec<String> = models
                .models
                .into_iter()
                .map(|m| m.name.trim_start_matches("models/").to_string())
                .collect();
            Ok(models_message(&names))
        })
        .await
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "topP": TOP_P,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        let method = if streaming { "streamGenerateContent" } else { "generateContent" };
        let url = format!("{}/v1beta/models/{}:{}", self.config.api_base, self.config.model, method);

        debug!(backend = %self.name(), model = %self.config.model, streaming, "Sending generate request");

        let mut request = self
            .config
            .client
            .post(&url)
            .query(&[("key", self.credentials.expose())]);
        if streaming {
            request = request.query(&[("alt", "sse")]);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        let response = ensure_success(response).await?;

        if streaming {
            return Ok(Generation::Streaming(sse_fragments(response, parse_chunk)));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse response: {}", e)))?;
        Ok(Generation::Complete(result.into_text()?.unwrap_or_default()))
    }

    fn describe(&self) -> BackendInfo {
        self.config.describe()
    }

    fn stats(&self) -> &CallStats {
        &self.config.stats
    }
}
