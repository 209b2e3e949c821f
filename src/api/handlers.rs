//! HTTP request handlers

use crate::api::models::{
    BackendListResponse, GenerateRequest, GenerateResponse, HealthResponse, SuccessResponse,
    SwitchBackendRequest, TestConnectionRequest, UpdateCredentialsRequest,
};
use crate::backend::{BackendInfo, ConnectivityReport, Credentials};
use crate::error::AppError;
use crate::gateway::StreamEvent;
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

/// Rewrite CRLF and lone CR as LF so a fragment can be framed as SSE data lines
fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Map an orchestrator event onto the SSE wire
fn to_sse_event(event: StreamEvent) -> Result<Event, axum::Error> {
    match event {
        StreamEvent::Fragment(text) => Ok(Event::default()
            .event("fragment")
            .data(normalize_line_breaks(&text))),
        StreamEvent::Retry(notice) => Event::default().event("retry").json_data(notice),
        StreamEvent::Finished(outcome) => Event::default().event("done").json_data(outcome),
    }
}

/// Generate text from a prompt
#[utoipa::path(
    post,
    path = "/v1/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Server-sent `fragment`, `retry` and `done` events, or a JSON body when `stream` is false. A fragment containing line breaks spans several `data:` lines, which clients rejoin with LF; CRLF and lone CR arrive as LF", body = GenerateResponse),
        (status = 400, description = "Empty prompt"),
    ),
    tag = "Generation"
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    if request.prompt.trim().is_empty() {
        return Err(AppError::InvalidRequest("Prompt cannot be empty".to_string()));
    }

    info!(
        backend = request.backend.as_deref().unwrap_or("<active>"),
        prompt_len = request.prompt.len(),
        stream = request.stream,
        "Received generation request"
    );

    let events = state
        .orchestrator
        .start(request.backend.as_deref(), request.prompt);

    if !request.stream {
        let (text, outcome) = events.collect_text().await;
        let outcome = outcome
            .ok_or_else(|| AppError::Internal("Generation ended without a status".to_string()))?;
        return Ok(Json(GenerateResponse { text, outcome }).into_response());
    }

    Ok(Sse::new(events.map(to_sse_event))
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// Probe a backend's connectivity
#[utoipa::path(
    post,
    path = "/v1/backends/{name}/test",
    params(("name" = String, Path, description = "Backend name")),
    request_body = TestConnectionRequest,
    responses((status = 200, description = "Probe result, successful or not", body = ConnectivityReport)),
    tag = "Backends"
)]
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<TestConnectionRequest>,
) -> Json<ConnectivityReport> {
    info!(backend = %name, with_override = request.credentials.is_some(), "Testing backend connectivity");

    let credentials = request
        .credentials
        .filter(|secret| !secret.trim().is_empty())
        .map(Credentials::new);
    Json(state.registry.test_connectivity(&name, credentials).await)
}

/// Describe a backend and its call statistics
#[utoipa::path(
    get,
    path = "/v1/backends/{name}",
    params(("name" = String, Path, description = "Backend name")),
    responses(
        (status = 200, description = "Backend description", body = BackendInfo),
        (status = 503, description = "Backend unknown or not constructible"),
    ),
    tag = "Backends"
)]
pub async fn backend_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<BackendInfo>, AppError> {
    Ok(Json(state.registry.info(&name)?))
}

/// List all known backends
#[utoipa::path(
    get,
    path = "/v1/backends",
    responses((status = 200, description = "Known backends", body = BackendListResponse)),
    tag = "Backends"
)]
pub async fn list_backends(State(state): State<Arc<AppState>>) -> Json<BackendListResponse> {
    Json(BackendListResponse {
        active: state.registry.active_name(),
        backends: state.registry.list(),
    })
}

/// Switch the active backend
#[utoipa::path(
    put,
    path = "/v1/active-backend",
    request_body = SwitchBackendRequest,
    responses(
        (status = 200, description = "Active backend switched", body = SuccessResponse),
        (status = 503, description = "Unknown backend"),
    ),
    tag = "Backends"
)]
pub async fn switch_backend(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SwitchBackendRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.registry.switch_active(&request.name)?;

    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Active backend is now '{}'", request.name),
    }))
}

/// Replace a backend's credentials and reload it
#[utoipa::path(
    put,
    path = "/v1/backends/{name}/credentials",
    params(("name" = String, Path, description = "Backend name")),
    request_body = UpdateCredentialsRequest,
    responses(
        (status = 200, description = "Credentials stored and backend reloaded", body = SuccessResponse),
        (status = 400, description = "Empty credentials"),
        (status = 503, description = "Backend could not be rebuilt"),
    ),
    tag = "Backends"
)]
pub async fn update_credentials(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<UpdateCredentialsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    if request.credentials.trim().is_empty() {
        return Err(AppError::InvalidRequest("Credentials cannot be empty".to_string()));
    }

    info!(backend = %name, "Updating backend credentials");
    state
        .registry
        .update_credentials(&name, Credentials::new(request.credentials))?;

    Ok(Json(SuccessResponse {
        success: true,
        message: format!("Credentials for '{}' updated", name),
    }))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Gateway is up", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_backend: state.registry.active_name(),
    })
}
