//! Core search orchestrator: analyse, select, fan out, fuse.
//!
//! Every selected backend runs on its own task under an outer timeout, so a
//! slow, failing or panicking backend only ever costs its own entry in the
//! envelope. Results from the backends that answered are deduplicated,
//! ranked by score and truncated to the requested limit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;

use crate::analyzer::QueryAnalyzer;
use crate::backend::SearchBackend;
use crate::cache::{CacheKey, ResponseCache};
use crate::config::SearchConfig;
use crate::envelope::{
    BackendContribution, BackendStatusReport, SearchEnvelope, SearchExplanation, SearchRequest,
};
use crate::error::SearchError;
use crate::health::HealthSnapshot;
use crate::location::{package_scope_target, parse_bucket_target};
use crate::registry::BackendRegistry;
use crate::storage::ObjectStore;
use crate::types::{
    millis, BackendQuery, BackendResponse, BackendStatus, BackendType, Scope, SearchResult,
};

use super::dedup::deduplicate;
use super::preview::attach_previews;
use super::ranking::rank_and_truncate;
use super::select::{select, Selection};

/// Unified search over a fixed set of backends.
///
/// Construct one per process and share it by reference (or `Arc`); it holds
/// no global state of its own.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use unisearch::{
///     BackendRegistry, MemoryObjectStore, ObjectEntry, ObjectListingBackend, Orchestrator,
///     Scope, SearchConfig, SearchRequest,
/// };
///
/// # async fn example() -> unisearch::Result<()> {
/// let config = SearchConfig::default();
/// let store = Arc::new(MemoryObjectStore::new().with_objects(
///     "demo-bucket",
///     [ObjectEntry::new("data/report.csv", 2048)],
/// ));
/// let registry = BackendRegistry::new()
///     .with_backend(Arc::new(ObjectListingBackend::new(store, &config)))?;
/// let orchestrator = Orchestrator::new(registry, config)?;
///
/// let envelope = orchestrator
///     .search(
///         SearchRequest::new("report.csv")
///             .with_scope(Scope::Bucket)
///             .with_target("s3://demo-bucket"),
///     )
///     .await;
/// assert!(envelope.success);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    registry: BackendRegistry,
    analyzer: QueryAnalyzer,
    config: SearchConfig,
    preview_store: Option<Arc<dyn ObjectStore>>,
    cache: Option<ResponseCache>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("previews", &self.preview_store.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator over `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` fails validation.
    pub fn new(registry: BackendRegistry, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let analyzer = QueryAnalyzer::with_backend_order(registry.registered_types());
        let cache = ResponseCache::new(config.cache_ttl_seconds, config.cache_max_entries);
        Ok(Self {
            registry,
            analyzer,
            config,
            preview_store: None,
            cache,
        })
    }

    /// Read content previews through `store`.
    pub fn with_preview_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.preview_store = Some(store);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Probe every registered backend concurrently.
    ///
    /// Returns each backend's probe outcome in registration order.
    pub async fn initialize(&self) -> Vec<(BackendType, bool)> {
        let probes = self.registry.all().iter().map(|backend| async move {
            (backend.backend_type(), backend.health_check().await)
        });
        let outcomes = futures::future::join_all(probes).await;
        for (backend, available) in &outcomes {
            tracing::debug!(%backend, available, "initial health check");
        }
        outcomes
    }

    /// Health snapshot of every registered backend, in registration order.
    pub fn health_report(&self) -> Vec<(BackendType, HealthSnapshot)> {
        self.registry.health_report()
    }

    /// Run one search. Never fails: every problem is reported in the envelope.
    ///
    /// Backend failures leave `success = true` and show up in
    /// `backend_status`; invalid requests and internal failures (including
    /// panics) produce `success = false` with `error` set.
    pub async fn search(&self, request: SearchRequest) -> SearchEnvelope {
        let started = Instant::now();
        tracing::trace!(query = %request.query, scope = %request.scope, "search requested");

        match AssertUnwindSafe(self.run(&request, started)).catch_unwind().await {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "search failed");
                SearchEnvelope::failure(&request, err.to_string(), millis(started.elapsed()))
            }
            Err(panic) => {
                let err = SearchError::Orchestrator(panic_message(panic.as_ref()));
                tracing::warn!(error = %err, "search panicked");
                SearchEnvelope::failure(&request, err.to_string(), millis(started.elapsed()))
            }
        }
    }

    async fn run(&self, request: &SearchRequest, started: Instant) -> Result<SearchEnvelope, SearchError> {
        let limit = self.validate(request)?;

        let cache_key = self.cache.as_ref().map(|_| CacheKey::new(request, limit));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(mut cached) = cache.get(key).await {
                tracing::debug!("search served from cache");
                cached.query = request.query.clone();
                cached.target = request.target.clone();
                cached.query_time_ms = millis(started.elapsed());
                return Ok(cached);
            }
        }

        self.refresh_stale_health().await;

        let analysis = self
            .analyzer
            .parse(&request.query, request.scope, &request.target);
        let filters = analysis.filters.merge(&request.filters);
        let selection = select(&self.registry, &request.backends, &analysis);

        let query = BackendQuery {
            query: request.query.clone(),
            scope: request.scope,
            target: request.target.clone(),
            filters,
            limit,
        };
        let responses = self.dispatch(&selection.backends, &query).await;

        let merged: Vec<_> = responses
            .iter()
            .filter(|r| r.is_available())
            .flat_map(|r| r.results.iter().cloned())
            .collect();
        let deduped = deduplicate(merged);
        let unique_results = deduped.results.len();
        let mut results = rank_and_truncate(deduped.results, limit);

        if request.include_content_preview {
            match &self.preview_store {
                Some(store) => {
                    results = attach_previews(
                        results,
                        store.as_ref(),
                        self.config.preview_bytes,
                        self.config.preview_max_results,
                    )
                    .await;
                }
                None => tracing::debug!("content preview requested but no preview store configured"),
            }
        }

        let backends_used: Vec<BackendType> = responses
            .iter()
            .filter(|r| r.is_available())
            .map(|r| r.backend_type)
            .collect();
        tracing::debug!(
            selected = selection.backends.len(),
            used = backends_used.len(),
            unique = unique_results,
            returned = results.len(),
            "search complete"
        );

        let explanation = request.explain_query.then(|| {
            explain(
                &selection,
                &analysis.suggested_backends,
                &responses,
                &results,
                unique_results,
                deduped.duplicates_removed,
            )
        });

        let envelope = SearchEnvelope {
            success: true,
            query: request.query.clone(),
            scope: request.scope,
            target: request.target.clone(),
            total_results: results.len(),
            results,
            query_time_ms: millis(started.elapsed()),
            backends_used,
            analysis: request.include_metadata.then_some(analysis),
            explanation,
            backend_status: responses.iter().map(BackendStatusReport::from).collect(),
            error: None,
        };

        let fully_successful = !responses.is_empty() && responses.iter().all(BackendResponse::is_available);
        if let (Some(cache), Some(key), true) = (&self.cache, cache_key, fully_successful) {
            cache.insert(key, envelope.clone()).await;
        }
        Ok(envelope)
    }

    /// Check request fields and resolve the effective limit.
    fn validate(&self, request: &SearchRequest) -> Result<usize, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::InvalidRequest("query must not be empty".into()));
        }
        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Err(SearchError::InvalidRequest("limit must be at least 1".into()));
        }
        if limit > self.config.max_limit {
            return Err(SearchError::InvalidRequest(format!(
                "limit {limit} exceeds the maximum of {}",
                self.config.max_limit
            )));
        }
        if request.scope == Scope::Bucket && parse_bucket_target(&request.target).is_none() {
            return Err(SearchError::InvalidRequest(format!(
                "bucket scope needs an s3://bucket target, got '{}'",
                request.target
            )));
        }
        if request.scope == Scope::Package {
            package_scope_target(&request.target)?;
        }
        Ok(limit)
    }

    /// Re-probe backends that are not available and have not been checked
    /// recently. Probes run concurrently.
    async fn refresh_stale_health(&self) {
        let now = Utc::now();
        let max_age = self.config.health_recheck();
        let probes = self
            .registry
            .all()
            .iter()
            .filter(|backend| backend.health().snapshot().is_stale(max_age, now))
            .map(|backend| async move {
                let available = backend.health_check().await;
                tracing::debug!(backend = backend.name(), available, "stale backend re-probed");
            });
        futures::future::join_all(probes).await;
    }

    /// Run every backend on its own task under the search timeout.
    ///
    /// Responses come back in `backends` order whatever the completion
    /// order. A timeout or a panicking task becomes an ERROR response for
    /// that backend alone.
    async fn dispatch(&self, backends: &[Arc<dyn SearchBackend>], query: &BackendQuery) -> Vec<BackendResponse> {
        let timeout = self.config.search_timeout();
        let tasks = backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            let query = query.clone();
            let backend_type = backend.backend_type();
            let handle = tokio::spawn(async move { tokio::time::timeout(timeout, backend.search(&query)).await });
            async move { (backend_type, handle.await) }
        });

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|(backend_type, joined)| match joined {
                Ok(Ok(response)) => response,
                Ok(Err(_elapsed)) => {
                    tracing::warn!(backend = %backend_type, timeout_secs = timeout.as_secs(), "backend search timed out");
                    synthetic_error(
                        backend_type,
                        SearchError::Timeout(format!("search exceeded {}s", timeout.as_secs())),
                        timeout,
                    )
                }
                Err(join_err) => {
                    let cause = if join_err.is_panic() {
                        format!("backend panicked: {}", panic_message(join_err.into_panic().as_ref()))
                    } else {
                        "backend task was cancelled".to_owned()
                    };
                    tracing::warn!(backend = %backend_type, error = %cause, "backend task failed");
                    synthetic_error(backend_type, SearchError::Orchestrator(cause), Duration::ZERO)
                }
            })
            .collect()
    }
}

fn synthetic_error(backend_type: BackendType, err: SearchError, elapsed: Duration) -> BackendResponse {
    BackendResponse::failed(backend_type, BackendStatus::Error, err.to_string(), elapsed)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn explain(
    selection: &Selection,
    suggested: &[BackendType],
    responses: &[BackendResponse],
    results: &[SearchResult],
    unique_results: usize,
    duplicates_removed: usize,
) -> SearchExplanation {
    let contributions = responses
        .iter()
        .map(|response| BackendContribution {
            backend: response.backend_type,
            raw: response.total,
            filtered: response.results.len(),
            kept: results
                .iter()
                .filter(|r| r.backend == response.backend_type)
                .count(),
        })
        .collect();
    SearchExplanation {
        selection_mode: selection.mode,
        rationale: selection.rationale.clone(),
        suggested_backends: suggested.to_vec(),
        available_backends: selection.available.clone(),
        selected_backends: selection.types(),
        skipped_names: selection.skipped_names.clone(),
        contributions,
        unique_results,
        duplicates_removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn synthetic_errors_carry_cause() {
        let response = synthetic_error(
            BackendType::CatalogGraph,
            SearchError::Timeout("search exceeded 30s".into()),
            Duration::from_secs(30),
        );
        assert_eq!(response.status, BackendStatus::Error);
        assert!(response.results.is_empty());
        assert_eq!(response.error_message.as_deref(), Some("timed out: search exceeded 30s"));
        assert!((response.query_time_ms - 30_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_invalid_requests() {
        let orchestrator = Orchestrator::new(BackendRegistry::new(), SearchConfig::default()).expect("orchestrator");
        assert!(orchestrator.validate(&SearchRequest::new("  ")).is_err());
        assert!(orchestrator.validate(&SearchRequest::new("q").with_limit(0)).is_err());
        assert!(orchestrator.validate(&SearchRequest::new("q").with_limit(1001)).is_err());
        assert!(orchestrator
            .validate(&SearchRequest::new("q").with_scope(Scope::Bucket))
            .is_err());
        assert_eq!(orchestrator.validate(&SearchRequest::new("q")).expect("valid"), 10);
        assert_eq!(
            orchestrator
                .validate(&SearchRequest::new("q").with_scope(Scope::Bucket).with_target("demo"))
                .expect("valid"),
            10
        );
    }

    #[test]
    fn package_scope_needs_empty_or_named_target() {
        let orchestrator = Orchestrator::new(BackendRegistry::new(), SearchConfig::default()).expect("orchestrator");
        let package = |target: &str| SearchRequest::new("q").with_scope(Scope::Package).with_target(target);
        assert!(orchestrator.validate(&package("")).is_ok());
        assert!(orchestrator.validate(&package("quilt+s3://demo#package=team/reports")).is_ok());
        assert!(orchestrator.validate(&package("demo/team/reports")).is_ok());
        assert!(matches!(
            orchestrator.validate(&package("demo")),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let config = SearchConfig {
            max_limit: 0,
            ..SearchConfig::default()
        };
        assert!(Orchestrator::new(BackendRegistry::new(), config).is_err());
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_success() {
        let orchestrator = Orchestrator::new(BackendRegistry::new(), SearchConfig::default()).expect("orchestrator");
        let envelope = orchestrator.search(SearchRequest::new("anything")).await;
        assert!(envelope.success);
        assert!(envelope.results.is_empty());
        assert!(envelope.backend_status.is_empty());
    }
}
