//! Trait definition for pluggable search backends.
//!
//! Each backend (catalog GraphQL, search index, object listing) implements
//! [`SearchBackend`] to provide a uniform interface for querying and health
//! probing. The helpers at the bottom of this module implement the parts of
//! the contract every backend shares: lazy first probe, short-circuiting
//! while unhealthy, and folding errors into [`BackendResponse`] values.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::SearchError;
use crate::health::BackendHealth;
use crate::types::{BackendQuery, BackendResponse, BackendStatus, BackendType, SearchResult};

/// A pluggable search backend.
///
/// All implementations must be `Send + Sync`; the orchestrator holds them
/// as `Arc<dyn SearchBackend>` and calls them from concurrent tasks.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Which variant this implementation represents. Registry key.
    fn backend_type(&self) -> BackendType;

    /// The backend's own health record.
    fn health(&self) -> &BackendHealth;

    /// Probe the backend and update its health record.
    ///
    /// Returns `true` if the backend is now [`BackendStatus::Available`].
    /// Implementations bound their own latency.
    async fn health_check(&self) -> bool;

    /// Run one search.
    ///
    /// Must not fail: transport, decoding and storage errors are returned
    /// as a response with `status = ERROR` and an error message.
    async fn search(&self, query: &BackendQuery) -> BackendResponse;

    /// Stable identifier, delegating to [`BackendType::name()`].
    fn name(&self) -> &'static str {
        self.backend_type().name()
    }

    /// Current health status.
    fn status(&self) -> BackendStatus {
        self.health().status()
    }
}

/// Results plus the backend-reported total hit count.
pub(crate) type Hits = (Vec<SearchResult>, usize);

/// Decide whether a search may proceed.
///
/// A never-probed backend is probed first. A backend that is not available
/// afterwards yields a short-circuit response carrying its stored status and
/// last error; `None` means the search may run.
pub(crate) async fn admit<B>(backend: &B, started: Instant) -> Option<BackendResponse>
where
    B: SearchBackend + ?Sized,
{
    if backend.status() == BackendStatus::Uninitialized {
        backend.health_check().await;
    }
    let snapshot = backend.health().snapshot();
    if snapshot.status == BackendStatus::Available {
        return None;
    }
    let message = snapshot
        .last_error
        .unwrap_or_else(|| format!("{} backend is not available", backend.name()));
    tracing::debug!(backend = backend.name(), status = %snapshot.status, "search short-circuited");
    Some(BackendResponse::failed(
        backend.backend_type(),
        snapshot.status,
        message,
        started.elapsed(),
    ))
}

/// Fold a search outcome into a response, recording failures in `health`.
pub(crate) fn respond(
    backend_type: BackendType,
    health: &BackendHealth,
    started: Instant,
    outcome: Result<Hits, SearchError>,
) -> BackendResponse {
    match outcome {
        Ok((results, total)) => {
            tracing::debug!(backend = %backend_type, count = results.len(), total, "backend returned results");
            BackendResponse::available(backend_type, results, total, started.elapsed())
        }
        Err(err) => {
            tracing::warn!(backend = %backend_type, error = %err, "backend search failed");
            health.record_search_failure(&err);
            BackendResponse::failed(
                backend_type,
                BackendStatus::Error,
                err.to_string(),
                started.elapsed(),
            )
        }
    }
}

/// Run a probe under `timeout` and record its outcome in `health`.
pub(crate) async fn run_probe<F>(health: &BackendHealth, timeout: Duration, probe: F) -> bool
where
    F: Future<Output = Result<(), SearchError>>,
{
    let outcome = match tokio::time::timeout(timeout, probe).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SearchError::Timeout(format!(
            "health check exceeded {}s",
            timeout.as_secs()
        ))),
    };
    health.record_probe(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResultKind, Scope, SearchFilters};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A mock backend for exercising the shared contract helpers.
    struct MockBackend {
        health: BackendHealth,
        probe_ok: bool,
        fail_search: bool,
        probes: AtomicUsize,
    }

    impl MockBackend {
        fn new(probe_ok: bool, fail_search: bool) -> Self {
            Self {
                health: BackendHealth::new("elasticsearch"),
                probe_ok,
                fail_search,
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchBackend for MockBackend {
        fn backend_type(&self) -> BackendType {
            BackendType::ContentIndex
        }

        fn health(&self) -> &BackendHealth {
            &self.health
        }

        async fn health_check(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let outcome = if self.probe_ok {
                Ok(())
            } else {
                Err(SearchError::BackendUnavailable("no session".into()))
            };
            run_probe(&self.health, Duration::from_secs(1), async { outcome }).await
        }

        async fn search(&self, _query: &BackendQuery) -> BackendResponse {
            let started = Instant::now();
            if let Some(response) = admit(self, started).await {
                return response;
            }
            let outcome = if self.fail_search {
                Err(SearchError::Transport("connection reset".into()))
            } else {
                let hit = SearchResult::new("a", ResultKind::File, "a", BackendType::ContentIndex)
                    .with_score(0.5);
                Ok((vec![hit], 7))
            };
            respond(self.backend_type(), &self.health, started, outcome)
        }
    }

    fn query() -> BackendQuery {
        BackendQuery {
            query: "report".into(),
            scope: Scope::Global,
            target: String::new(),
            filters: SearchFilters::default(),
            limit: 10,
        }
    }

    #[test]
    fn mock_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockBackend>();
    }

    #[tokio::test]
    async fn first_search_probes_lazily() {
        let backend = MockBackend::new(true, false);
        let response = backend.search(&query()).await;
        assert_eq!(response.status, BackendStatus::Available);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.total, 7);
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);

        // Already available: no further probes.
        backend.search(&query()).await;
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_backend_short_circuits_with_stored_error() {
        let backend = MockBackend::new(false, false);
        let response = backend.search(&query()).await;
        assert_eq!(response.status, BackendStatus::Unavailable);
        assert!(response.results.is_empty());
        assert!(response.error_message.expect("message").contains("no session"));
    }

    #[tokio::test]
    async fn failed_search_becomes_error_response_and_sticks() {
        let backend = MockBackend::new(true, true);
        let response = backend.search(&query()).await;
        assert_eq!(response.status, BackendStatus::Error);
        assert!(response.error_message.expect("message").contains("connection reset"));
        assert_eq!(backend.status(), BackendStatus::Error);

        // The next call short-circuits on the stored error instead of retrying.
        let response = backend.search(&query()).await;
        assert_eq!(response.status, BackendStatus::Error);
        assert!(response.error_message.expect("message").contains("connection reset"));
    }

    #[tokio::test]
    async fn probe_timeout_records_error() {
        let health = BackendHealth::new("graphql");
        let passed = run_probe(&health, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(!passed);
        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, BackendStatus::Error);
        assert!(snapshot.last_error.expect("error").contains("timed out"));
    }

    #[test]
    fn default_name_delegates_to_backend_type() {
        let backend = MockBackend::new(true, false);
        assert_eq!(backend.name(), "elasticsearch");
    }
}
