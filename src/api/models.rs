//! API request and response models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::backend::BackendListing;
use crate::gateway::StreamOutcome;

/// Text generation request
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GenerateRequest {
    /// The prompt to generate from
    pub prompt: String,

    /// Backend to use; the active backend when omitted
    #[serde(default)]
    pub backend: Option<String>,

    /// Stream fragments as server-sent events (default) or return one JSON body
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

/// Non-streaming generation response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GenerateResponse {
    /// Text of the successful attempt; empty when generation failed
    pub text: String,
    pub outcome: StreamOutcome,
}

/// Connectivity test request
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct TestConnectionRequest {
    /// Credential material to probe with instead of the configured one
    #[serde(default)]
    pub credentials: Option<String>,
}

/// Switch the active backend
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SwitchBackendRequest {
    pub name: String,
}

/// Replace the credentials of a backend
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateCredentialsRequest {
    pub credentials: String,
}

/// Backend list response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BackendListResponse {
    pub active: String,
    pub backends: Vec<BackendListing>,
}

/// Health check response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_backend: String,
}

/// Generic success response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}
