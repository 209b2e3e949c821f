//! Streaming retry orchestrator
//!
//! Drives one generation request against a pinned backend handle. Fragments
//! are forwarded as soon as they arrive; a failed attempt is followed by a
//! [`StreamEvent::Retry`] boundary, a backoff wait, and a fresh `generate` call
//! on the same handle. Exactly one [`StreamEvent::Finished`] closes the stream
//! unless the caller went away first.

use futures::stream::{self, Stream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::retry::RetryPolicy;
use crate::backend::registry::BackendRegistry;
use crate::backend::stats::CallRecord;
use crate::backend::traits::{FragmentStream, Generation, TextBackend};
use crate::error::AppError;

const CHANNEL_CAPACITY: usize = 64;

/// Attempt boundary: fragments sent before it belong to a failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetryNotice {
    /// Number of the attempt that failed
    pub attempt: u32,
    pub delay_ms: u64,
    pub reason: String,
}

/// Terminal status of a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    Completed {
        backend: String,
        attempts: u32,
        tokens: u64,
        latency_ms: f64,
    },
    Exhausted {
        backend: String,
        attempts: u32,
        message: String,
        remediation: String,
    },
    Unavailable {
        message: String,
    },
}

impl StreamOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Event delivered to the caller of a generation request
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Retry(RetryNotice),
    Finished(StreamOutcome),
}

/// Receiving end of a generation request. Dropping it cancels the request.
pub struct GenerationStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl Stream for GenerationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl GenerationStream {
    /// Consume the stream, keeping only the text of the final attempt
    pub async fn collect_text(mut self) -> (String, Option<StreamOutcome>) {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Fragment(fragment) => text.push_str(&fragment),
                StreamEvent::Retry(_) => text.clear(),
                StreamEvent::Finished(outcome) => {
                    if !outcome.is_success() {
                        text.clear();
                    }
                    return (text, Some(outcome));
                }
            }
        }
        (text, None)
    }
}

/// Word-count heuristic over generated text
pub fn count_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn remediation(backend: &str) -> String {
    format!(
        "Check the credentials and network access for backend '{}', or switch to another backend.",
        backend
    )
}

enum AttemptResult {
    Completed(String),
    Failed(AppError),
    Cancelled,
}

/// Runs generation requests with bounded retries
pub struct StreamOrchestrator {
    registry: Arc<BackendRegistry>,
    policy: RetryPolicy,
}

impl StreamOrchestrator {
    pub fn new(registry: Arc<BackendRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Start a generation request.
    ///
    /// The handle is resolved here, once, and pinned for every attempt of the
    /// request. `backend = None` uses the active selection at this moment.
    pub fn start(&self, backend: Option<&str>, prompt: impl Into<String>) -> GenerationStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let request_id = Uuid::new_v4();

        let resolved = match backend {
            Some(name) => self.registry.resolve(name),
            None => self.registry.resolve_active(),
        };

        match resolved {
            Ok(handle) => {
                let span = info_span!("generation", request_id = %request_id, backend = %handle.name());
                tokio::spawn(drive(handle, prompt.into(), self.policy, tx).instrument(span));
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Generation request rejected");
                let outcome = StreamOutcome::Unavailable { message: e.to_string() };
                let _ = tx.try_send(StreamEvent::Finished(outcome));
            }
        }

        GenerationStream { rx }
    }
}

async fn drive(
    handle: Arc<dyn TextBackend>,
    prompt: String,
    policy: RetryPolicy,
    tx: mpsc::Sender<StreamEvent>,
) {
    let started = Instant::now();
    let backend = handle.name().to_string();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(attempt, "Starting generation attempt");

        let result = tokio::select! {
            _ = tx.closed() => AttemptResult::Cancelled,
            result = run_attempt(handle.as_ref(), &prompt, &tx) => result,
        };

        match result {
            AttemptResult::Cancelled => {
                info!(attempt, "Caller disconnected, generation abandoned");
                return;
            }
            AttemptResult::Completed(text) => {
                let tokens = count_tokens(&text);
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                handle.stats().record(CallRecord::success(latency_ms, tokens));
                info!(attempts = attempt, tokens, latency_ms, "Generation completed");

                let outcome = StreamOutcome::Completed {
                    backend,
                    attempts: attempt,
                    tokens,
                    latency_ms,
                };
                let _ = tx.send(StreamEvent::Finished(outcome)).await;
                return;
            }
            AttemptResult::Failed(err) if attempt >= policy.max_attempts => {
                let err = AppError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                };
                handle.stats().record(CallRecord::failure(policy.failure_latency_ms()));
                error!(error = %err, "Generation exhausted all attempts");

                let outcome = StreamOutcome::Exhausted {
                    remediation: remediation(&backend),
                    backend,
                    attempts: attempt,
                    message: err.to_string(),
                };
                let _ = tx.send(StreamEvent::Finished(outcome)).await;
                return;
            }
            AttemptResult::Failed(err) => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Generation attempt failed, retrying");

                let notice = RetryNotice {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: err.to_string(),
                };
                if tx.send(StreamEvent::Retry(notice)).await.is_err() {
                    return;
                }

                tokio::select! {
                    _ = tx.closed() => {
                        info!(attempt, "Caller disconnected during backoff");
                        return;
                    }
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_attempt(backend: &dyn TextBackend, prompt: &str, tx: &mpsc::Sender<StreamEvent>) -> AttemptResult {
    let mut fragments: FragmentStream = match backend.generate(prompt, true).await {
        Ok(Generation::Streaming(fragments)) => fragments,
        Ok(Generation::Complete(text)) => stream::iter(vec![Ok(text)]).boxed(),
        Err(e) => return AttemptResult::Failed(e),
    };

    let mut text = String::new();
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) if fragment.is_empty() => {}
            Ok(fragment) => {
                text.push_str(&fragment);
                if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                    return AttemptResult::Cancelled;
                }
            }
            Err(e) => return AttemptResult::Failed(e),
        }
    }

    AttemptResult::Completed(text)
}
