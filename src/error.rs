//! Error types for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid credentials, or an invalid backend selection
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No factory for the requested name, or the handle could not be built
    #[error("Backend '{name}' unavailable: {reason}")]
    BackendUnavailable { name: String, reason: String },

    /// Network failure or timeout while probing a backend
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Backend returned a non-success result or failed mid-stream
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::BackendUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable error type
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) | AppError::Config(_) => "configuration_error",
            AppError::BackendUnavailable { .. } => "backend_unavailable",
            AppError::Connectivity(_) => "connectivity_error",
            AppError::Generation(_) | AppError::HttpClient(_) => "generation_error",
            AppError::RetryExhausted { .. } => "retry_exhausted",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Connectivity(_)
            | AppError::Generation(_)
            | AppError::RetryExhausted { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
