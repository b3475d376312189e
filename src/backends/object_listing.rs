//! Object-listing fallback: a direct listing of one bucket.
//!
//! Works without any index, so it is the backend of last resort. It only
//! answers bucket-scoped queries; enumerating unknown buckets is not
//! feasible, so every other scope gets an empty (but available) response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::analyzer::extract_keywords;
use crate::backend::{admit, respond, run_probe, Hits, SearchBackend};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::health::BackendHealth;
use crate::location::{parse_bucket_target, s3_uri, BucketTarget};
use crate::storage::{ListRequest, ObjectEntry, ObjectStore};
use crate::types::{
    BackendQuery, BackendResponse, BackendStatus, BackendType, ResultKind, Scope, SearchResult,
};

/// Weight of a term found in the file name.
const FILENAME_WEIGHT: f64 = 1.0;
/// Weight of a term found elsewhere in the key.
const KEY_WEIGHT: f64 = 0.5;
/// Multiplier for credit earned by a term's fragments instead of the whole term.
const FRAGMENT_FACTOR: f64 = 0.5;

/// Bucket listing backend over an [`ObjectStore`].
pub struct ObjectListingBackend {
    store: Arc<dyn ObjectStore>,
    health: BackendHealth,
    health_timeout: Duration,
    max_keys: usize,
    page_size: usize,
}

impl ObjectListingBackend {
    /// Create a backend listing through `store`, with limits from `config`.
    pub fn new(store: Arc<dyn ObjectStore>, config: &SearchConfig) -> Self {
        Self {
            store,
            health: BackendHealth::new(BackendType::ObjectListing.name()),
            health_timeout: config.health_timeout(),
            max_keys: config.listing_max_keys,
            page_size: config.listing_page_size,
        }
    }

    /// List up to `max_keys` entries under `bucket`/`prefix`, following
    /// continuation tokens.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, SearchError> {
        let mut entries = Vec::new();
        let mut continuation = None;
        loop {
            let remaining = self.max_keys.saturating_sub(entries.len());
            if remaining == 0 {
                tracing::debug!(bucket, limit = self.max_keys, "listing truncated at max keys");
                break;
            }
            let request = ListRequest {
                bucket: bucket.to_owned(),
                prefix: prefix.to_owned(),
                max_keys: remaining.min(self.page_size),
                continuation,
            };
            let page = self.store.list_objects(&request).await?;
            entries.extend(page.entries);
            match page.next_continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        entries.truncate(self.max_keys);
        Ok(entries)
    }

    async fn run(&self, query: &BackendQuery, target: &BucketTarget) -> Result<Hits, SearchError> {
        let plan = SearchPlan::new(&query.query, &target.prefix);
        tracing::trace!(bucket = %target.bucket, prefix = %plan.prefix, terms = ?plan.terms, "listing bucket");

        let entries = self.list(&target.bucket, &plan.prefix).await?;
        let listed = entries.len();
        let mut scored: Vec<SearchResult> = entries
            .into_iter()
            .filter(|entry| !entry.key.ends_with('/'))
            .filter(|entry| {
                query
                    .filters
                    .accepts(&entry.key, Some(entry.size), entry.last_modified)
            })
            .filter_map(|entry| {
                let score = score_key(&entry.key, &plan.terms);
                (score > 0.0).then(|| to_result(&target.bucket, entry, score))
            })
            .collect();

        // Stable sort keeps key order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let total = scored.len();
        scored.truncate(query.limit);
        tracing::debug!(listed, matched = total, kept = scored.len(), "bucket listing scored");
        Ok((scored, total))
    }
}

#[async_trait]
impl SearchBackend for ObjectListingBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::ObjectListing
    }

    fn health(&self) -> &BackendHealth {
        &self.health
    }

    async fn health_check(&self) -> bool {
        run_probe(&self.health, self.health_timeout, self.store.probe()).await
    }

    async fn search(&self, query: &BackendQuery) -> BackendResponse {
        let started = Instant::now();
        if let Some(response) = admit(self, started).await {
            return response;
        }
        if query.scope != Scope::Bucket {
            return BackendResponse::available(self.backend_type(), Vec::new(), 0, started.elapsed());
        }
        let Some(target) = parse_bucket_target(&query.target) else {
            // A caller mistake, not a backend fault: leave health alone.
            return BackendResponse::failed(
                self.backend_type(),
                BackendStatus::Error,
                format!("bucket scope needs an s3://bucket target, got '{}'", query.target),
                started.elapsed(),
            );
        };
        let outcome = self.run(query, &target).await;
        respond(self.backend_type(), &self.health, started, outcome)
    }
}

/// Listing prefix and match terms derived from a query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchPlan {
    prefix: String,
    terms: Vec<String>,
}

impl SearchPlan {
    /// Path-like queries (`data/raw/report`) narrow the listing prefix and
    /// match on their final segment; anything else matches on keywords.
    fn new(query: &str, target_prefix: &str) -> Self {
        let query = query.trim();
        match query.rsplit_once('/') {
            Some((dir, last)) if !query.contains(char::is_whitespace) => {
                let dir = dir.trim_start_matches('/');
                let mut prefix = target_prefix.to_owned();
                if !dir.is_empty() {
                    if !prefix.is_empty() && !prefix.ends_with('/') {
                        prefix.push('/');
                    }
                    prefix.push_str(dir);
                    prefix.push('/');
                }
                Self {
                    prefix,
                    terms: extract_keywords(last),
                }
            }
            _ => Self {
                prefix: target_prefix.to_owned(),
                terms: extract_keywords(query),
            },
        }
    }
}

/// Relevance of `key` to `terms`, in `[0, 1]`.
///
/// Per term: found in the file name → 1.0, elsewhere in the key → 0.5,
/// otherwise half the mean credit of its alphanumeric fragments. The sum is
/// divided by the term count and capped at 1.0. No terms matches everything.
pub(crate) fn score_key(key: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let key = key.to_lowercase();
    let filename = key.rsplit('/').next().unwrap_or(&key);
    let total: f64 = terms
        .iter()
        .map(|term| term_score(&key, filename, &term.to_lowercase()))
        .sum();
    (total / terms.len() as f64).min(1.0)
}

fn term_score(key: &str, filename: &str, term: &str) -> f64 {
    let whole = placement_weight(key, filename, term);
    if whole > 0.0 {
        return whole;
    }
    let fragments: Vec<&str> = term
        .split(|c: char| !c.is_alphanumeric())
        .filter(|f| !f.is_empty())
        .collect();
    if fragments.len() < 2 {
        return 0.0;
    }
    let credit: f64 = fragments
        .iter()
        .map(|fragment| placement_weight(key, filename, fragment))
        .sum();
    credit / fragments.len() as f64 * FRAGMENT_FACTOR
}

fn placement_weight(key: &str, filename: &str, needle: &str) -> f64 {
    if filename.contains(needle) {
        FILENAME_WEIGHT
    } else if key.contains(needle) {
        KEY_WEIGHT
    } else {
        0.0
    }
}

fn to_result(bucket: &str, entry: ObjectEntry, score: f64) -> SearchResult {
    let uri = s3_uri(bucket, &entry.key);
    let title = entry.key.rsplit('/').next().unwrap_or(&entry.key).to_owned();
    let mut result = SearchResult::new(uri.clone(), ResultKind::File, title, BackendType::ObjectListing)
        .with_description(format!("{} bytes in s3://{bucket}", entry.size))
        .with_location(uri)
        .with_logical_key(entry.key.clone())
        .with_size(entry.size)
        .with_metadata("bucket", serde_json::Value::from(bucket))
        .with_score(score);
    if let Some(modified) = entry.last_modified {
        result = result.with_last_modified(modified);
    }
    if let Some(class) = entry.storage_class {
        result = result.with_metadata("storage_class", serde_json::Value::from(class));
    }
    result
}
