//! Backend registry: the set of backends an orchestrator can dispatch to.
//!
//! Backends are keyed by [`BackendType`], so there is at most one of each
//! variant. Registration order is preserved and used as the tie-break
//! wherever backends are otherwise equally preferred.

use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::error::SearchError;
use crate::health::HealthSnapshot;
use crate::types::{BackendStatus, BackendType};

/// Registered backends in registration order.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn SearchBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.name()))
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DuplicateBackend`] if a backend of the same
    /// type is already registered. The existing backend is kept.
    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) -> Result<(), SearchError> {
        let backend_type = backend.backend_type();
        if self.get(backend_type).is_some() {
            return Err(SearchError::DuplicateBackend(backend_type.name().to_owned()));
        }
        tracing::debug!(backend = %backend_type, "backend registered");
        self.backends.push(backend);
        Ok(())
    }

    /// Builder-style [`BackendRegistry::register`].
    ///
    /// # Errors
    ///
    /// Same as [`BackendRegistry::register`].
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Result<Self, SearchError> {
        self.register(backend)?;
        Ok(self)
    }

    /// The backend of the given type, if registered.
    pub fn get(&self, backend_type: BackendType) -> Option<&Arc<dyn SearchBackend>> {
        self.backends.iter().find(|b| b.backend_type() == backend_type)
    }

    /// Case-insensitive lookup by identifier or alias (`graphql`, `es`, `s3`, ...).
    ///
    /// Returns `None` for unknown names and for known types that are not registered.
    pub fn backend_by_name(&self, name: &str) -> Option<&Arc<dyn SearchBackend>> {
        BackendType::from_name(name).and_then(|backend_type| self.get(backend_type))
    }

    /// Backends whose current status is [`BackendStatus::Available`], in
    /// registration order.
    pub fn available_backends(&self) -> Vec<Arc<dyn SearchBackend>> {
        self.backends
            .iter()
            .filter(|b| b.status() == BackendStatus::Available)
            .cloned()
            .collect()
    }

    /// Every registered backend, in registration order.
    pub fn all(&self) -> &[Arc<dyn SearchBackend>] {
        &self.backends
    }

    /// Registered backend types, in registration order.
    pub fn registered_types(&self) -> Vec<BackendType> {
        self.backends.iter().map(|b| b.backend_type()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Health snapshot of every backend, in registration order.
    pub fn health_report(&self) -> Vec<(BackendType, HealthSnapshot)> {
        self.backends
            .iter()
            .map(|b| (b.backend_type(), b.health().snapshot()))
            .collect()
    }
}
