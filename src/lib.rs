//! Text Generation Gateway
//!
//! A Rust-based gateway that puts several independently shaped text-generation
//! backends behind one runtime-switchable interface, with uniform streaming,
//! bounded retries and per-backend call statistics.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::BackendRegistry;
use gateway::{RetryPolicy, StreamOrchestrator};

/// Application state shared across all handlers
pub struct AppState {
    pub registry: Arc<BackendRegistry>,
    pub orchestrator: Arc<StreamOrchestrator>,
}

impl AppState {
    /// Wire the registry and orchestrator from settings
    pub fn from_settings(settings: config::Settings) -> Self {
        let registry = Arc::new(BackendRegistry::new(&settings));
        Self::with_registry(&settings, registry)
    }

    /// Build state around an existing registry
    pub fn with_registry(settings: &config::Settings, registry: Arc<BackendRegistry>) -> Self {
        let policy = RetryPolicy::from(&settings.gateway.retry);
        let orchestrator = Arc::new(StreamOrchestrator::new(registry.clone(), policy));

        Self {
            registry,
            orchestrator,
        }
    }
}
