//! Contract every text-generation backend implements

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use utoipa::ToSchema;

use crate::backend::stats::{CallStats, StatsSnapshot};
use crate::error::Result;

/// Forward-only, non-restartable sequence of generated text fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Result of a generate call
pub enum Generation {
    /// Fragments arrive as the backend produces them
    Streaming(FragmentStream),
    /// Whole text at once
    Complete(String),
}

impl Generation {
    /// Drain the generation into a single string
    pub async fn into_text(self) -> Result<String> {
        match self {
            Generation::Complete(text) => Ok(text),
            Generation::Streaming(stream) => collect_fragments(stream).await,
        }
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Streaming(_) => f.write_str("Generation::Streaming(..)"),
            Generation::Complete(text) => f.debug_tuple("Generation::Complete").field(text).finish(),
        }
    }
}

pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Opaque credential material. A single token, or several secrets joined with ':'.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Split composite material such as `api_key:secret_key`
    pub fn parts(&self) -> Vec<&str> {
        self.0.split(':').collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Result of a connectivity probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ConnectivityReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl ConnectivityReport {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            latency_ms: None,
        }
    }
}

/// Static description of a backend plus its live statistics
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackendInfo {
    pub name: String,
    pub version: String,
    pub provider: String,
    pub statistics: StatsSnapshot,
}

/// Trait for text generation backends
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Registry key of this backend
    fn name(&self) -> &str;

    /// Lightweight probe with no effect on conversation state.
    ///
    /// Expected and unexpected failures are both reported as `success = false`.
    /// `credentials` overrides the handle's own material for this probe only.
    async fn test_connectivity(&self, credentials: Option<&Credentials>) -> ConnectivityReport;

    /// Start a generation for `prompt`
    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Generation>;

    fn describe(&self) -> BackendInfo;

    /// Tracker owned by this handle
    fn stats(&self) -> &CallStats;
}

/// Time a probe and fold any error into a failed report
pub async fn timed_probe<F>(backend: &str, probe: F) -> ConnectivityReport
where
    F: std::future::Future<Output = Result<String>>,
{
    let started = Instant::now();
    let outcome = probe.await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(message) => ConnectivityReport {
            success: true,
            message,
            latency_ms: Some(latency_ms),
        },
        Err(e) => {
            tracing::warn!(backend = %backend, error = %e, "Connectivity probe failed");
            ConnectivityReport {
                success: false,
                message: e.to_string(),
                latency_ms: Some(latency_ms),
            }
        }
    }
}

/// Success message listing up to three model names
pub fn models_message(models: &[String]) -> String {
    let shown: Vec<&str> = models.iter().take(3).map(String::as_str).collect();
    let more = if models.len() > 3 { "..." } else { "" };
    format!("Connected. Available models: {}{}", shown.join(", "), more)
}
