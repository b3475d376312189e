//! Backend selection for one request.

use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::envelope::{BackendSelection, SelectionMode};
use crate::registry::BackendRegistry;
use crate::types::{BackendType, QueryAnalysis};

/// The backends chosen for one request and why.
pub(crate) struct Selection {
    pub mode: SelectionMode,
    pub rationale: String,
    /// Backends that were available when the choice was made.
    pub available: Vec<BackendType>,
    /// Backends to dispatch to, in dispatch order.
    pub backends: Vec<Arc<dyn SearchBackend>>,
    /// Explicit names that matched no registered backend.
    pub skipped_names: Vec<String>,
}

impl Selection {
    pub fn types(&self) -> Vec<BackendType> {
        self.backends.iter().map(|b| b.backend_type()).collect()
    }
}

/// Choose backends for a request.
///
/// Automatic selection takes the analyzer's suggestions that are available,
/// in suggested order; failing that every available backend; failing that
/// every registered backend, so each one reports its own status. Explicit
/// selection resolves names through the registry, skipping unknown names
/// and collapsing repeats.
pub(crate) fn select(
    registry: &BackendRegistry,
    requested: &BackendSelection,
    analysis: &QueryAnalysis,
) -> Selection {
    let available = registry.available_backends();
    let available_types: Vec<BackendType> = available.iter().map(|b| b.backend_type()).collect();

    match requested {
        BackendSelection::Named(names) => {
            let mut backends: Vec<Arc<dyn SearchBackend>> = Vec::new();
            let mut skipped_names = Vec::new();
            for name in names {
                match registry.backend_by_name(name) {
                    Some(backend) => {
                        if !backends.iter().any(|b| b.backend_type() == backend.backend_type()) {
                            backends.push(Arc::clone(backend));
                        }
                    }
                    None => {
                        tracing::debug!(name = %name, "skipping unknown backend name");
                        skipped_names.push(name.clone());
                    }
                }
            }
            Selection {
                mode: SelectionMode::Explicit,
                rationale: format!("caller requested {}", names.join(", ")),
                available: available_types,
                backends,
                skipped_names,
            }
        }
        BackendSelection::Auto => {
            let suggested: Vec<Arc<dyn SearchBackend>> = analysis
                .suggested_backends
                .iter()
                .filter_map(|wanted| {
                    available
                        .iter()
                        .find(|b| b.backend_type() == *wanted)
                        .cloned()
                })
                .collect();

            let (mode, rationale, backends) = if !suggested.is_empty() {
                (
                    SelectionMode::Suggested,
                    format!(
                        "available backends in the order suggested for a {} query (confidence {:.2})",
                        analysis.query_type, analysis.confidence
                    ),
                    suggested,
                )
            } else if !available.is_empty() {
                (
                    SelectionMode::AllAvailable,
                    "no suggested backend is available; using every available backend".to_owned(),
                    available,
                )
            } else {
                (
                    SelectionMode::AllRegistered,
                    "no backend is available; asking every registered backend for its status".to_owned(),
                    registry.all().to_vec(),
                )
            };
            tracing::debug!(?mode, selected = ?backends.iter().map(|b| b.name()).collect::<Vec<_>>(), "backends selected");
            Selection {
                mode,
                rationale,
                available: available_types,
                backends,
                skipped_names: Vec::new(),
            }
        }
    }
}
