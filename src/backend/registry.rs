//! Backend registry: resolves a backend name to a cached, live handle

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::backend::providers::{self, PROVIDERS};
use crate::backend::traits::{BackendInfo, ConnectivityReport, Credentials, TextBackend};
use crate::config::{BackendSettings, Settings};
use crate::error::{AppError, Result};

/// Constructor for one backend, keyed by name in the registry's factory table
pub type BackendFactory = Arc<dyn Fn(&BackendSettings) -> Result<Arc<dyn TextBackend>> + Send + Sync>;

/// One row of the backend listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BackendListing {
    pub name: String,
    pub active: bool,
    pub loaded: bool,
}

/// Registry for text generation backends
///
/// Handles are built lazily on first resolution and cached; later resolutions
/// of the same name return the same instance without taking the load lock.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    settings: RwLock<HashMap<String, BackendSettings>>,
    handles: DashMap<String, Arc<dyn TextBackend>>,
    active: RwLock<String>,
    load_lock: Mutex<()>,
}

impl BackendRegistry {
    /// Create a registry with the built-in provider table
    pub fn new(settings: &Settings) -> Self {
        let budget = settings.gateway.budget;
        let factories = PROVIDERS
            .iter()
            .map(|spec| {
                let factory: BackendFactory =
                    Arc::new(move |backend: &BackendSettings| providers::build(spec, backend, budget));
                (spec.name.to_string(), factory)
            })
            .collect();

        Self {
            factories,
            settings: RwLock::new(settings.backends.clone()),
            handles: DashMap::new(),
            active: RwLock::new(settings.gateway.active_backend.clone()),
            load_lock: Mutex::new(()),
        }
    }

    /// Create a registry with no factories at all
    pub fn empty(active: impl Into<String>) -> Self {
        Self {
            factories: HashMap::new(),
            settings: RwLock::new(HashMap::new()),
            handles: DashMap::new(),
            active: RwLock::new(active.into()),
            load_lock: Mutex::new(()),
        }
    }

    /// Register or replace the factory for `name`
    pub fn with_factory<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&BackendSettings) -> Result<Arc<dyn TextBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Resolve a backend by name, constructing it on first use
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn TextBackend>> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(handle.value().clone());
        }

        let _guard = self.load_lock.lock();
        if let Some(handle) = self.handles.get(name) {
            return Ok(handle.value().clone());
        }

        let handle = self.construct(name, None)?;
        self.handles.insert(name.to_string(), handle.clone());
        info!(backend = %name, "Text backend loaded");
        Ok(handle)
    }

    /// Resolve the currently active backend
    pub fn resolve_active(&self) -> Result<Arc<dyn TextBackend>> {
        let name = self.active_name();
        self.resolve(&name)
    }

    pub fn active_name(&self) -> String {
        self.active.read().clone()
    }

    /// Change the active backend. Handles already pinned by in-flight requests are untouched.
    pub fn switch_active(&self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(AppError::unavailable(name, "no registered factory"));
        }

        let _guard = self.load_lock.lock();
        let previous = std::mem::replace(&mut *self.active.write(), name.to_string());
        info!(from = %previous, to = %name, "Active backend switched");
        Ok(())
    }

    /// Rebuild and replace the cached handle for `name`
    pub fn reload(&self, name: &str) -> Result<Arc<dyn TextBackend>> {
        let _guard = self.load_lock.lock();
        let handle = self.construct(name, None)?;
        self.handles.insert(name.to_string(), handle.clone());
        info!(backend = %name, "Text backend reloaded");
        Ok(handle)
    }

    /// Store new credential material for `name` and reload its handle.
    ///
    /// The credentials are only stored once a handle has been built from them;
    /// on failure both the stored settings and the cached handle are unchanged.
    pub fn update_credentials(&self, name: &str, credentials: Credentials) -> Result<Arc<dyn TextBackend>> {
        let mut candidate = self.backend_settings(name);
        candidate.credentials = Some(credentials.expose().to_string());
        candidate.credentials_env = None;

        let _guard = self.load_lock.lock();
        let handle = self.build(name, &candidate)?;
        self.settings.write().insert(name.to_string(), candidate);
        self.handles.insert(name.to_string(), handle.clone());
        info!(backend = %name, "Text backend credentials updated");
        Ok(handle)
    }

    /// Probe a backend. Never fails; problems are reported in the result.
    ///
    /// If the handle cannot be built but override credentials are supplied, a
    /// transient handle built from the override is probed instead.
    pub async fn test_connectivity(&self, name: &str, credentials: Option<Credentials>) -> ConnectivityReport {
        let handle = match self.resolve(name) {
            Ok(handle) => handle,
            Err(e) => match &credentials {
                Some(creds) => match self.construct(name, Some(creds)) {
                    Ok(transient) => transient,
                    Err(e) => return ConnectivityReport::failed(e.to_string()),
                },
                None => {
                    warn!(backend = %name, error = %e, "Connectivity test without a usable backend");
                    return ConnectivityReport::failed(e.to_string());
                }
            },
        };

        let report = handle.test_connectivity(credentials.as_ref()).await;
        handle
            .stats()
            .record_call(report.success, report.latency_ms.unwrap_or(0.0), 0);
        report
    }

    /// Describe a backend, loading it if necessary
    pub fn info(&self, name: &str) -> Result<BackendInfo> {
        Ok(self.resolve(name)?.describe())
    }

    /// All known backends, sorted by name
    pub fn list(&self) -> Vec<BackendListing> {
        let active = self.active_name();
        let mut listing: Vec<BackendListing> = self
            .factories
            .keys()
            .map(|name| BackendListing {
                name: name.clone(),
                active: *name == active,
                loaded: self.handles.contains_key(name),
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        listing
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Whether a handle for `name` is cached
    pub fn is_loaded(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    fn backend_settings(&self, name: &str) -> BackendSettings {
        self.settings.read().get(name).cloned().unwrap_or_default()
    }

    fn construct(&self, name: &str, credentials: Option<&Credentials>) -> Result<Arc<dyn TextBackend>> {
        let mut settings = self.backend_settings(name);
        if let Some(creds) = credentials {
            settings.credentials = Some(creds.expose().to_string());
            settings.credentials_env = None;
        }
        self.build(name, &settings)
    }

    fn build(&self, name: &str, settings: &BackendSettings) -> Result<Arc<dyn TextBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AppError::unavailable(name, "no registered factory"))?;

        factory(settings).map_err(|e| {
            warn!(backend = %name, error = %e, "Failed to construct text backend");
            match e {
                AppError::BackendUnavailable { .. } => e,
                other => AppError::unavailable(name, other.to_string()),
            }
        })
    }
}
