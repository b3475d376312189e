//! Content-index backend: relevance-ranked search over the catalog's
//! Elasticsearch-style index.
//!
//! Object documents live in one index per bucket (`{bucket}`), package
//! documents in `{bucket}_packages`. Raw index scores are unbounded, so each
//! response is normalised by its `max_score` into `[0, 1]`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::analyzer::extract_keywords;
use crate::backend::{admit, respond, run_probe, Hits, SearchBackend};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::health::BackendHealth;
use crate::location::{package_scope_target, parse_bucket_target, s3_uri};
use crate::session::IndexSession;
use crate::types::{
    BackendQuery, BackendResponse, BackendType, ResultKind, Scope, SearchFilters, SearchResult,
};

const PACKAGES_SUFFIX: &str = "_packages";

/// Search-index backend.
pub struct ContentIndexBackend {
    session: Arc<dyn IndexSession>,
    health: BackendHealth,
    health_timeout: Duration,
}

impl ContentIndexBackend {
    pub fn new(session: Arc<dyn IndexSession>, config: &SearchConfig) -> Self {
        Self {
            session,
            health: BackendHealth::new(BackendType::ContentIndex.name()),
            health_timeout: config.health_timeout(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/search", self.session.base_url())
    }

    async fn post(&self, body: &serde_json::Value) -> Result<IndexReply, SearchError> {
        self.session
            .post_json(&self.endpoint(), body)
            .await?
            .check("search index")?
            .json("search index")
    }

    async fn run(&self, query: &BackendQuery) -> Result<Hits, SearchError> {
        let index = index_pattern(query)?;
        let package = match query.scope {
            Scope::Package => package_scope_target(&query.target)?.map(|t| t.name),
            _ => None,
        };
        let body = build_body(
            &index,
            &extract_keywords(&query.query),
            &query.filters,
            package.as_deref(),
            query.limit,
        );
        tracing::trace!(query = %query.query, %index, "search index query");
        let reply = self.post(&body).await?;
        Ok(parse_hits(reply, query.limit))
    }
}

#[async_trait]
impl SearchBackend for ContentIndexBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::ContentIndex
    }

    fn health(&self) -> &BackendHealth {
        &self.health
    }

    async fn health_check(&self) -> bool {
        let body = json!({ "index": "*", "size": 0, "query": { "match_all": {} } });
        let probe = async { self.post(&body).await.map(|_| ()) };
        run_probe(&self.health, self.health_timeout, probe).await
    }

    async fn search(&self, query: &BackendQuery) -> BackendResponse {
        let started = Instant::now();
        if let Some(response) = admit(self, started).await {
            return response;
        }
        let outcome = self.run(query).await;
        respond(self.backend_type(), &self.health, started, outcome)
    }
}

/// Indices to search for a query.
///
/// Package indices are left out when object-only filters are set, since
/// package documents have no size, extension or modification time to match.
pub(crate) fn index_pattern(query: &BackendQuery) -> Result<String, SearchError> {
    let base = match query.scope {
        Scope::Bucket => parse_bucket_target(&query.target)
            .map(|t| t.bucket)
            .ok_or_else(|| {
                SearchError::InvalidRequest(format!(
                    "bucket scope needs an s3://bucket target, got '{}'",
                    query.target
                ))
            })?,
        Scope::Package => package_scope_target(&query.target)?
            .map_or_else(|| "*".to_owned(), |t| t.bucket),
        _ => "*".to_owned(),
    };
    let packages = format!("{base}{PACKAGES_SUFFIX}");
    Ok(match query.scope {
        Scope::Package => packages,
        _ if !query.filters.is_empty() => base,
        _ => format!("{base},{packages}"),
    })
}

/// Elasticsearch-style request body. `package` pins package hits to one
/// handle.
pub(crate) fn build_body(
    index: &str,
    keywords: &[String],
    filters: &SearchFilters,
    package: Option<&str>,
    limit: usize,
) -> serde_json::Value {
    let must = if keywords.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "query_string": {
            "query": keywords.join(" "),
            "default_operator": "AND",
        }})
    };

    let mut clauses = Vec::new();
    let mut size = serde_json::Map::new();
    if let Some(min) = filters.size_gt {
        size.insert("gt".into(), json!(min));
    }
    if let Some(max) = filters.size_lt {
        size.insert("lt".into(), json!(max));
    }
    if !size.is_empty() {
        clauses.push(json!({ "range": { "size": size } }));
    }
    let mut modified = serde_json::Map::new();
    if let Some(after) = filters.created_after {
        modified.insert("gt".into(), json!(after.to_rfc3339()));
    }
    if let Some(before) = filters.created_before {
        modified.insert("lt".into(), json!(before.to_rfc3339()));
    }
    if !modified.is_empty() {
        clauses.push(json!({ "range": { "last_modified": modified } }));
    }
    if !filters.extension.is_empty() {
        clauses.push(json!({ "terms": { "ext": filters.extension } }));
    }
    if let Some(handle) = package {
        clauses.push(json!({ "term": { "handle": handle } }));
    }

    json!({
        "index": index,
        "size": limit,
        "query": { "bool": { "must": [must], "filter": clauses } },
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct IndexReply {
    hits: HitsBlock,
}

#[derive(Debug, Deserialize)]
struct HitsBlock {
    total: Option<Total>,
    max_score: Option<f64>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Total {
    Count(usize),
    Object { value: usize },
}

impl Total {
    fn value(&self) -> usize {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Source,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Source {
    key: Option<String>,
    size: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    version_id: Option<String>,
    handle: Option<String>,
    hash: Option<String>,
    comment: Option<String>,
}

/// Convert an index reply into results with normalised scores.
///
/// Extracted as a separate function for testability with canned JSON.
pub(crate) fn parse_hits(reply: IndexReply, limit: usize) -> Hits {
    let block = reply.hits;
    let max_score = block
        .max_score
        .filter(|m| m.is_finite() && *m > 0.0)
        .or_else(|| {
            block
                .hits
                .iter()
                .filter_map(|h| h.score)
                .filter(|s| s.is_finite())
                .reduce(f64::max)
                .filter(|m| *m > 0.0)
        });
    let reported = block.total.as_ref().map_or(0, Total::value);

    let results: Vec<SearchResult> = block
        .hits
        .into_iter()
        .take(limit)
        .filter_map(|hit| {
            let score = match (hit.score, max_score) {
                (Some(score), Some(max)) => score / max,
                // No relevance signal in this reply.
                _ => 1.0,
            };
            let id = hit.id.clone();
            let result = to_result(hit, score);
            if result.is_none() {
                tracing::debug!(id = %id, "skipping index hit without key or handle");
            }
            result
        })
        .collect();
    let total = reported.max(results.len());
    (results, total)
}

fn to_result(hit: Hit, score: f64) -> Option<SearchResult> {
    let Hit { index, source, .. } = hit;
    let (bucket, is_package) = match index.strip_suffix(PACKAGES_SUFFIX) {
        Some(bucket) => (bucket.to_owned(), true),
        None => (index, false),
    };

    let mut result = if is_package {
        let name = source.handle?;
        let location = format!("quilt+s3://{bucket}#package={name}");
        let description = source
            .comment
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("Package in s3://{bucket}"));
        let mut result = SearchResult::new(location.clone(), ResultKind::Package, name.clone(), BackendType::ContentIndex)
            .with_description(description)
            .with_location(location)
            .with_package_name(name);
        if let Some(hash) = source.hash {
            result = result.with_metadata("hash", serde_json::Value::from(hash));
        }
        result
    } else {
        let key = source.key?;
        let uri = s3_uri(&bucket, &key);
        let title = key.rsplit('/').next().unwrap_or(&key).to_owned();
        let mut result = SearchResult::new(uri.clone(), ResultKind::File, title, BackendType::ContentIndex)
            .with_description(format!("Object in s3://{bucket}"))
            .with_location(uri)
            .with_logical_key(key.clone());
        if let Some(version) = source.version_id {
            result = result.with_metadata("version_id", serde_json::Value::from(version));
        }
        result
    };

    result = result
        .with_metadata("bucket", serde_json::Value::from(bucket))
        .with_score(score);
    if let Some(size) = source.size {
        result = result.with_size(size);
    }
    if let Some(modified) = source.last_modified {
        result = result.with_last_modified(modified);
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HttpReply;
    use crate::types::BackendStatus;
    use std::sync::Mutex;

    struct FakeSession {
        status: u16,
        body: String,
        requests: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeSession {
        fn new(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                body: body.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IndexSession for FakeSession {
        fn base_url(&self) -> String {
            "https://catalog.test".into()
        }

        async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, SearchError> {
            assert_eq!(url, "https://catalog.test/api/search");
            self.requests.lock().expect("lock").push(body.clone());
            Ok(HttpReply::new(self.status, self.body.clone()))
        }
    }

    fn query(scope: Scope, target: &str, filters: SearchFilters) -> BackendQuery {
        BackendQuery {
            query: "quarterly report".into(),
            scope,
            target: target.into(),
            filters,
            limit: 10,
        }
    }

    fn reply() -> serde_json::Value {
        json!({ "hits": {
            "total": { "value": 57 },
            "max_score": 8.0,
            "hits": [
                { "_index": "demo", "_id": "1", "_score": 8.0,
                  "_source": { "key": "data/report.csv", "size": 100, "last_modified": "2024-01-02T03:04:05Z" } },
                { "_index": "demo_packages", "_id": "2", "_score": 4.0,
                  "_source": { "handle": "team/reports", "hash": "abc", "comment": "Quarterly" } },
                { "_index": "demo", "_id": "3", "_score": 2.0, "_source": {} }
            ]
        }})
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ContentIndexBackend>();
    }

    #[test]
    fn index_pattern_by_scope() {
        let none = SearchFilters::default();
        assert_eq!(
            index_pattern(&query(Scope::Bucket, "s3://demo/data", none.clone())).expect("pattern"),
            "demo,demo_packages"
        );
        assert_eq!(
            index_pattern(&query(Scope::Global, "", none.clone())).expect("pattern"),
            "*,*_packages"
        );
        assert_eq!(
            index_pattern(&query(Scope::Package, "", none.clone())).expect("pattern"),
            "*_packages"
        );
        let csv = SearchFilters::default().with_extension("csv");
        assert_eq!(
            index_pattern(&query(Scope::Bucket, "s3://demo", csv)).expect("pattern"),
            "demo"
        );
        assert!(index_pattern(&query(Scope::Bucket, "", none)).is_err());
    }

    #[test]
    fn body_carries_keywords_and_filters() {
        let filters = SearchFilters {
            size_gt: Some(1024),
            ..SearchFilters::default()
        }
        .with_extension("csv");
        let body = build_body("demo", &["report".into()], &filters, None, 5);
        assert_eq!(body["index"], "demo");
        assert_eq!(body["size"], 5);
        assert_eq!(body["query"]["bool"]["must"][0]["query_string"]["query"], "report");
        let clauses = body["query"]["bool"]["filter"].as_array().expect("filters");
        assert!(clauses.contains(&json!({ "range": { "size": { "gt": 1024 } } })));
        assert!(clauses.contains(&json!({ "terms": { "ext": ["csv"] } })));
    }

    #[test]
    fn empty_keywords_match_all() {
        let body = build_body("*", &[], &SearchFilters::default(), None, 5);
        assert_eq!(body["query"]["bool"]["must"][0], json!({ "match_all": {} }));
    }

    #[test]
    fn scores_normalised_by_max_score() {
        let reply: IndexReply = serde_json::from_value(reply()).expect("reply");
        let (results, total) = parse_hits(reply, 10);
        assert_eq!(total, 57);
        // The hit without a key is skipped.
        assert_eq!(results.len(), 2);
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
        assert!((results[1].score - 0.5).abs() < f64::EPSILON);

        assert_eq!(results[0].location.as_deref(), Some("s3://demo/data/report.csv"));
        assert_eq!(results[1].kind, ResultKind::Package);
        assert_eq!(results[1].description, "Quarterly");
        assert_eq!(results[1].location.as_deref(), Some("quilt+s3://demo#package=team/reports"));
    }

    #[test]
    fn missing_max_score_falls_back_to_best_hit() {
        let reply: IndexReply = serde_json::from_value(json!({ "hits": {
            "total": 2,
            "hits": [
                { "_index": "b", "_id": "1", "_score": 3.0, "_source": { "key": "x" } },
                { "_index": "b", "_id": "2", "_score": 6.0, "_source": { "key": "y" } }
            ]
        }}))
        .expect("reply");
        let (results, total) = parse_hits(reply, 10);
        assert_eq!(total, 2);
        assert!((results[0].score - 0.5).abs() < f64::EPSILON);
        assert!((results[1].score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn search_posts_to_search_endpoint() {
        let session = Arc::new(FakeSession::new(200, reply()));
        let backend = ContentIndexBackend::new(session.clone(), &SearchConfig::default());
        let response = backend.search(&query(Scope::Global, "", SearchFilters::default())).await;
        assert_eq!(response.status, BackendStatus::Available);
        assert_eq!(response.results.len(), 2);
        assert!(response.results.iter().all(|r| r.backend == BackendType::ContentIndex));

        let requests = session.requests.lock().expect("lock").clone();
        // Health probe, then the search itself.
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1]["index"], "*,*_packages");
    }

    #[test]
    fn package_target_pins_bucket_index() {
        let none = SearchFilters::default();
        assert_eq!(
            index_pattern(&query(Scope::Package, "quilt+s3://Demo#package=team/reports", none.clone()))
                .expect("pattern"),
            "demo_packages"
        );
        assert_eq!(
            index_pattern(&query(Scope::Package, "demo/team/reports", none.clone())).expect("pattern"),
            "demo_packages"
        );
        assert!(index_pattern(&query(Scope::Package, "demo", none)).is_err());
    }

    #[tokio::test]
    async fn package_target_filters_by_handle() {
        let session = Arc::new(FakeSession::new(200, reply()));
        let backend = ContentIndexBackend::new(session.clone(), &SearchConfig::default());
        let target = "quilt+s3://demo#package=team/reports@abc";
        let response = backend.search(&query(Scope::Package, target, SearchFilters::default())).await;
        assert_eq!(response.status, BackendStatus::Available);

        let requests = session.requests.lock().expect("lock").clone();
        let body = &requests[1];
        assert_eq!(body["index"], "demo_packages");
        let clauses = body["query"]["bool"]["filter"].as_array().expect("filters");
        assert!(clauses.contains(&json!({ "term": { "handle": "team/reports" } })));
    }

    #[tokio::test]
    async fn unparseable_package_target_is_an_error() {
        let session = Arc::new(FakeSession::new(200, reply()));
        let backend = ContentIndexBackend::new(session.clone(), &SearchConfig::default());
        let response = backend.search(&query(Scope::Package, "demo", SearchFilters::default())).await;
        assert_eq!(response.status, BackendStatus::Error);
        // Only the health probe reached the session.
        assert_eq!(session.requests.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn forbidden_marks_backend_unavailable() {
        let session = Arc::new(FakeSession::new(403, json!({})));
        let backend = ContentIndexBackend::new(session, &SearchConfig::default());
        let response = backend.search(&query(Scope::Global, "", SearchFilters::default())).await;
        assert_eq!(response.status, BackendStatus::Unavailable);
        assert_eq!(backend.status(), BackendStatus::Unavailable);
    }

    #[tokio::test]
    async fn server_error_marks_backend_error() {
        let session = Arc::new(FakeSession::new(500, json!({ "error": "shard failure" })));
        let backend = ContentIndexBackend::new(session, &SearchConfig::default());
        assert!(!backend.health_check().await);
        let response = backend.search(&query(Scope::Global, "", SearchFilters::default())).await;
        assert_eq!(response.status, BackendStatus::Error);
        assert!(response.error_message.expect("message").contains("500"));
    }
}
