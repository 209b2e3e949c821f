//! Line-oriented decoding of streamed HTTP bodies (SSE and NDJSON)

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use std::collections::VecDeque;

use crate::backend::traits::FragmentStream;
use crate::error::{AppError, Result};

/// Splits a byte stream into complete lines, tolerating UTF-8 sequences that
/// straddle chunk boundaries
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left after the body ended without a trailing newline
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

struct LineState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    done: bool,
}

/// Stream the response body as text lines
pub fn lines(response: Response) -> BoxStream<'static, Result<String>> {
    let state = LineState {
        body: response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
        buffer: LineBuffer::default(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.buffer.push(&chunk);
                    state.ready.extend(lines);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(AppError::Generation(format!("Stream interrupted: {}", e))), state));
                }
                None => {
                    state.done = true;
                    state.ready.extend(state.buffer.finish());
                }
            }
        }
    })
    .boxed()
}

/// Payload of an SSE `data:` line, or `None` for comments, event names and blanks
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Payload to hand to a chunk parser: an SSE `data:` value, or a bare JSON
/// object line from a body that was not framed as SSE (in-band error replies)
pub fn sse_payload(line: &str) -> Option<&str> {
    sse_data(line).or_else(|| {
        let trimmed = line.trim();
        trimmed.starts_with('{').then_some(trimmed)
    })
}

/// Whether the response body is framed as server-sent events
pub fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("text/event-stream"))
}

/// Decode an SSE body. `extract` turns one data payload into an optional fragment.
pub fn sse_fragments<F>(response: Response, extract: F) -> FragmentStream
where
    F: Fn(&str) -> Result<Option<String>> + Send + 'static,
{
    lines(response)
        .filter_map(move |line| {
            let item = match line {
                Ok(line) => match sse_payload(&line) {
                    Some("[DONE]") | None => None,
                    Some(data) => extract(data).transpose(),
                },
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(item)
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())))
        .boxed()
}

/// Decode a newline-delimited JSON body
pub fn ndjson_fragments<F>(response: Response, extract: F) -> FragmentStream
where
    F: Fn(&str) -> Result<Option<String>> + Send + 'static,
{
    lines(response)
        .filter_map(move |line| {
            let item = match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => extract(&line).transpose(),
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(item)
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())))
        .boxed()
}

/// Turn a non-2xx response into a generation error carrying the body
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Generation(format!("Backend returned {}: {}", status, body)))
}
