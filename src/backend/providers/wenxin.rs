//! Baidu ERNIE Bot backend
//!
//! Credentials are composite (`api_key:secret_key`) and are exchanged for a
//! short-lived access token before every request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AdapterConfig, MAX_OUTPUT_TOKENS, TEMPERATURE, TOP_P};
use crate::backend::stats::CallStats;
use crate::backend::stream::{ensure_success, is_event_stream, sse_fragments};
use crate::backend::traits::{timed_probe, BackendInfo, ConnectivityReport, Credentials, Generation, TextBackend};
use crate::error::{AppError, Result};

const CHAT_PATH: &str = "/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_msg: Option<String>,
}

impl ChatResponse {
    fn into_result(self) -> Result<Option<String>> {
        if let Some(code) = self.error_code {
            return Err(AppError::Generation(format!(
                "ERNIE error {}: {}",
                code,
                self.error_msg.unwrap_or_default()
            )));
        }
        Ok(self.result)
    }
}

fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: ChatResponse = serde_json::from_str(data)
        .map_err(|e| AppError::Generation(format!("Malformed stream chunk: {}", e)))?;
    chunk.into_result()
}

/// Split `api_key:secret_key`
fn key_pair(credentials: &Credentials) -> Result<(String, String)> {
    match credentials.parts().as_slice() {
        [api_key, secret_key] if !api_key.is_empty() && !secret_key.is_empty() => {
            Ok((api_key.to_string(), secret_key.to_string()))
        }
        _ => Err(AppError::Configuration(
            "ERNIE credentials must have the form 'api_key:secret_key'".to_string(),
        )),
    }
}

pub struct WenxinBackend {
    config: AdapterConfig,
    credentials: Credentials,
}

impl WenxinBackend {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let credentials = config.require_credentials()?;
        key_pair(&credentials)?;
        Ok(Self { config, credentials })
    }

    async fn access_token(&self, credentials: &Credentials) -> Result<String> {
        let (api_key, secret_key) = key_pair(credentials)?;
        let url = format!("{}/oauth/2.0/token", self.config.api_base);

        let response = self
            .config
            .client
            .post(&url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", api_key.as_str()),
                ("client_secret", secret_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Connectivity(e.to_string()))?;

        let status = response.status();
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Connectivity(format!("Failed to parse token response ({}): {}", status, e)))?;

        token.access_token.ok_or_else(|| {
            AppError::Connectivity(format!(
                "Failed to obtain access token: {}",
                token.error_description.unwrap_or_else(|| status.to_string())
            ))
        })
    }
}

#[async_trait]
impl TextBackend for WenxinBackend {
    fn name(&self) -> &str {
        self.config.spec.name
    }

    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport {
        let credentials = credentials.unwrap_or(&self.credentials);
        timed_probe(self.name(), async {
            self.access_token(credentials).await?;
            Ok(format!("Connected. Model: {}", self.config.model))
        })
        .await
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation> {
        let token = self
            .access_token(&self.credentials)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let body = json!({
            "messages": [{ "role": "user", "content": prompt }],
            "stream": streaming,
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
            "max_output_tokens": MAX_OUTPUT_TOKENS,
        });

        debug!(backend = %self.name(), streaming, "Sending chat request");

        let url = format!("{}{}", self.config.api_base, CHAT_PATH);
        let response = self
            .config
            .client
            .post(&url)
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;
        let response = ensure_success(response).await?;

        // Errors come back as a plain JSON body with status 200, even for streamed requests
        if streaming && is_event_stream(&response) {
            return Ok(Generation::Streaming(sse_fragments(response, parse_chunk)));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse response: {}", e)))?;
        Ok(Generation::Complete(result.into_result()?.unwrap_or_default()))
    }

    fn describe(&self) -> BackendInfo {
        self.config.describe()
    }

    fn stats(&self) -> &CallStats {
        &self.config.stats
    }
}
