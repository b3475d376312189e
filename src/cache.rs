//! In-memory response cache for search envelopes.
//!
//! Caches complete envelopes keyed by every request field that can change
//! the answer. Uses [`moka`] for async-friendly caching with a TTL and
//! bounded size. Each orchestrator owns its cache; there is no process-wide
//! instance.

use std::time::Duration;

use moka::future::Cache;

use crate::envelope::{BackendSelection, SearchEnvelope, SearchRequest};
use crate::types::{BackendType, Scope, SearchFilters};

/// Composite cache key: normalised query plus every option that shapes
/// the result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Trimmed query string. Case is kept: listing prefixes are case-sensitive.
    query: String,
    scope: Scope,
    target: String,
    explicit: bool,
    /// Resolved explicit backends, sorted.
    backends: Vec<BackendType>,
    limit: usize,
    include_metadata: bool,
    include_content_preview: bool,
    explain_query: bool,
    filters: SearchFilters,
}

impl CacheKey {
    /// Build a deterministic key for `request` with its effective `limit`.
    ///
    /// Backend names are resolved so that `["es", "s3"]` and
    /// `["S3", "elasticsearch"]` share an entry. An explicit selection that
    /// resolves to nothing still differs from automatic selection.
    pub fn new(request: &SearchRequest, limit: usize) -> Self {
        let backends = match &request.backends {
            BackendSelection::Auto => Vec::new(),
            BackendSelection::Named(names) => {
                let mut resolved: Vec<BackendType> =
                    names.iter().filter_map(|n| BackendType::from_name(n)).collect();
                resolved.sort();
                resolved.dedup();
                resolved
            }
        };
        Self {
            query: request.query.trim().to_owned(),
            scope: request.scope,
            target: request.target.trim().to_owned(),
            explicit: !request.backends.is_auto(),
            backends,
            limit,
            include_metadata: request.include_metadata,
            include_content_preview: request.include_content_preview,
            explain_query: request.explain_query,
            filters: request.filters.clone(),
        }
    }
}

/// Bounded, TTL-expiring envelope cache.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<CacheKey, SearchEnvelope>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache, or `None` when `ttl_seconds` is zero (caching disabled).
    pub fn new(ttl_seconds: u64, max_entries: u64) -> Option<Self> {
        if ttl_seconds == 0 {
            return None;
        }
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build();
        Some(Self { inner })
    }

    /// Look up a cached envelope. Returns `None` on a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<SearchEnvelope> {
        self.inner.get(key).await
    }

    /// Insert an envelope.
    pub async fn insert(&self, key: CacheKey, envelope: SearchEnvelope) {
        self.inner.insert(key, envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(query: &str) -> SearchEnvelope {
        let mut envelope = SearchEnvelope::failure(&SearchRequest::new(query), "unused", 0.0);
        envelope.success = true;
        envelope.error = None;
        envelope
    }

    #[test]
    fn key_trims_query_whitespace() {
        let a = CacheKey::new(&SearchRequest::new("  report.csv "), 10);
        let b = CacheKey::new(&SearchRequest::new("report.csv"), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn key_keeps_query_case() {
        let a = CacheKey::new(&SearchRequest::new("Raw/report"), 10);
        let b = CacheKey::new(&SearchRequest::new("raw/report"), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn key_differs_when_options_differ() {
        let base = SearchRequest::new("report");
        let key = CacheKey::new(&base, 10);
        assert_ne!(key, CacheKey::new(&base, 5));
        assert_ne!(key, CacheKey::new(&base.clone().with_scope(Scope::Bucket), 10));
        assert_ne!(key, CacheKey::new(&base.clone().with_metadata(true), 10));
        assert_ne!(
            key,
            CacheKey::new(&base.clone().with_filters(SearchFilters::default().with_extension("csv")), 10)
        );
    }

    #[test]
    fn key_same_for_reordered_and_aliased_backends() {
        let a = CacheKey::new(&SearchRequest::new("q").with_backend_names(["es", "s3"]), 10);
        let b = CacheKey::new(&SearchRequest::new("q").with_backend_names(["S3", "elasticsearch"]), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_selection_differs_from_auto() {
        let auto = CacheKey::new(&SearchRequest::new("q"), 10);
        let none = CacheKey::new(&SearchRequest::new("q").with_backend_names(["nope"]), 10);
        assert_ne!(auto, none);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        assert!(ResponseCache::new(0, 100).is_none());
        assert!(ResponseCache::new(60, 100).is_some());
    }

    #[tokio::test]
    async fn insert_and_retrieve() {
        let cache = ResponseCache::new(600, 10).expect("enabled");
        let key = CacheKey::new(&SearchRequest::new("cached"), 10);
        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), envelope("cached")).await;
        let cached = cache.get(&key).await.expect("should be cached");
        assert_eq!(cached.query, "cached");
    }

    #[tokio::test]
    async fn caches_are_independent() {
        let a = ResponseCache::new(600, 10).expect("enabled");
        let b = ResponseCache::new(600, 10).expect("enabled");
        let key = CacheKey::new(&SearchRequest::new("q"), 10);
        a.insert(key.clone(), envelope("q")).await;
        assert!(b.get(&key).await.is_none());
    }
}
