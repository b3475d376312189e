//! Catalog GraphQL backend: structured object and package search.
//!
//! Sends `searchObjects` / `searchPackages` queries to `{base_url}/graphql`
//! through the index session. The catalog returns matches without a
//! relevance signal, so every result scores 1.0 and ranking falls to the
//! other backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
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

const OBJECTS_QUERY: &str = r#"query SearchObjects($buckets: [String!], $searchString: String, $filter: ObjectFilter, $size: Int!) {
  searchObjects(buckets: $buckets, searchString: $searchString, filter: $filter, size: $size) {
    __typename
    ... on ObjectsSearchResultSet { total hits { bucket key size modified } }
    ... on InvalidInput { errors { path message } }
  }
}"#;

const PACKAGES_QUERY: &str = r#"query SearchPackages($buckets: [String!], $searchString: String, $size: Int!) {
  searchPackages(buckets: $buckets, searchString: $searchString, size: $size) {
    __typename
    ... on PackagesSearchResultSet { total hits { bucket name hash comment size modified } }
    ... on InvalidInput { errors { path message } }
  }
}"#;

const PING_QUERY: &str = "query Ping { __typename }";

/// Structured object filter sent with `searchObjects`.
///
/// Size bounds are inclusive here, while [`SearchFilters`] bounds are strict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_contains: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_gte: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_lte: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_before: Option<DateTime<Utc>>,
}

impl ObjectFilter {
    /// Build from query keywords and filters.
    ///
    /// A single keyword becomes `key_contains`; several are left to the
    /// free-text search string.
    pub fn build(keywords: &[String], filters: &SearchFilters) -> Self {
        Self {
            key_contains: match keywords {
                [only] => Some(only.clone()),
                _ => None,
            },
            extension: filters.extension.clone(),
            size_gte: filters.size_gt.map(|n| n.saturating_add(1)),
            size_lte: filters.size_lt.map(|n| n.saturating_sub(1)),
            modified_after: filters.created_after,
            modified_before: filters.created_before,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-sub-search result budget.
///
/// Objects get the ceiling of half the limit, packages the floor.
pub(crate) fn split_limit(scope: Scope, limit: usize) -> (usize, usize) {
    match scope {
        Scope::Bucket => (limit, 0),
        Scope::Package => (0, limit),
        Scope::Global | Scope::Catalog => (limit.div_ceil(2), limit / 2),
    }
}

/// GraphQL search over the catalog.
pub struct CatalogGraphBackend {
    session: Arc<dyn IndexSession>,
    health: BackendHealth,
    health_timeout: Duration,
}

impl CatalogGraphBackend {
    pub fn new(session: Arc<dyn IndexSession>, config: &SearchConfig) -> Self {
        Self {
            session,
            health: BackendHealth::new(BackendType::CatalogGraph.name()),
            health_timeout: config.health_timeout(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/graphql", self.session.base_url())
    }

    async fn execute(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value, SearchError> {
        let body = json!({ "query": query, "variables": variables });
        let reply = self
            .session
            .post_json(&self.endpoint(), &body)
            .await?
            .check("catalog graphql")?;
        let envelope: GraphEnvelope = reply.json("catalog graphql")?;
        if !envelope.errors.is_empty() {
            let messages: Vec<&str> = envelope.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(SearchError::Transport(format!(
                "catalog graphql reported errors: {}",
                messages.join("; ")
            )));
        }
        envelope
            .data
            .ok_or_else(|| SearchError::Parse("catalog graphql response has no data".into()))
    }

    async fn search_objects(
        &self,
        buckets: &[String],
        keywords: &[String],
        filters: &SearchFilters,
        size: usize,
    ) -> Result<Hits, SearchError> {
        if size == 0 {
            return Ok((Vec::new(), 0));
        }
        let filter = ObjectFilter::build(keywords, filters);
        let filter = if filter.is_empty() {
            serde_json::Value::Null
        } else {
            json!(filter)
        };
        let variables = json!({
            "buckets": buckets,
            "searchString": search_string(keywords),
            "filter": filter,
            "size": size,
        });
        let data = self.execute(OBJECTS_QUERY, variables).await?;
        parse_objects(data, size)
    }

    async fn search_packages(
        &self,
        buckets: &[String],
        keywords: &[String],
        size: usize,
    ) -> Result<Hits, SearchError> {
        if size == 0 {
            return Ok((Vec::new(), 0));
        }
        let variables = json!({
            "buckets": buckets,
            "searchString": search_string(keywords),
            "size": size,
        });
        let data = self.execute(PACKAGES_QUERY, variables).await?;
        parse_packages(data, size)
    }

    async fn run(&self, query: &BackendQuery) -> Result<Hits, SearchError> {
        let keywords = extract_keywords(&query.query);
        let package = match query.scope {
            Scope::Package => package_scope_target(&query.target)?,
            _ => None,
        };
        let buckets: Vec<String> = match query.scope {
            Scope::Bucket => parse_bucket_target(&query.target)
                .map(|t| vec![t.bucket])
                .ok_or_else(|| {
                    SearchError::InvalidRequest(format!(
                        "bucket scope needs an s3://bucket target, got '{}'",
                        query.target
                    ))
                })?,
            Scope::Package => package.iter().map(|t| t.bucket.clone()).collect(),
            _ => Vec::new(),
        };
        let (object_quota, package_quota) = split_limit(query.scope, query.limit);
        tracing::trace!(query = %query.query, object_quota, package_quota, "catalog graphql search");

        let ((mut results, object_total), (mut packages, mut package_total)) =
            futures::future::try_join(
                self.search_objects(&buckets, &keywords, &query.filters, object_quota),
                self.search_packages(&buckets, &keywords, package_quota),
            )
            .await?;
        if let Some(target) = &package {
            packages.retain(|r| r.package_name.as_deref() == Some(target.name.as_str()));
            package_total = packages.len();
        }
        results.extend(packages);
        Ok((results, object_total + package_total))
    }
}

#[async_trait]
impl SearchBackend for CatalogGraphBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::CatalogGraph
    }

    fn health(&self) -> &BackendHealth {
        &self.health
    }

    async fn health_check(&self) -> bool {
        let probe = async {
            self.execute(PING_QUERY, json!({})).await.map(|_| ())
        };
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

fn search_string(keywords: &[String]) -> Option<String> {
    (!keywords.is_empty()).then(|| keywords.join(" "))
}

#[derive(Debug, Deserialize)]
struct GraphEnvelope {
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "H: Deserialize<'de>"))]
struct ResultSet<H> {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    hits: Vec<H>,
}

#[derive(Debug, Deserialize)]
struct InvalidInput {
    #[serde(default)]
    errors: Vec<InputError>,
}

#[derive(Debug, Deserialize)]
struct InputError {
    #[serde(default)]
    path: Option<String>,
    message: String,
}

impl InvalidInput {
    fn into_error(self) -> SearchError {
        let details: Vec<String> = self
            .errors
            .into_iter()
            .map(|e| match e.path {
                Some(path) => format!("{path}: {}", e.message),
                None => e.message,
            })
            .collect();
        SearchError::InvalidRequest(format!("catalog rejected query: {}", details.join("; ")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum ObjectsOutcome {
    ObjectsSearchResultSet(ResultSet<ObjectHit>),
    InvalidInput(InvalidInput),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum PackagesOutcome {
    PackagesSearchResultSet(ResultSet<PackageHit>),
    InvalidInput(InvalidInput),
}

#[derive(Debug, Deserialize)]
struct ObjectsData {
    #[serde(rename = "searchObjects")]
    search_objects: ObjectsOutcome,
}

#[derive(Debug, Deserialize)]
struct PackagesData {
    #[serde(rename = "searchPackages")]
    search_packages: PackagesOutcome,
}

#[derive(Debug, Deserialize)]
struct ObjectHit {
    bucket: String,
    key: String,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PackageHit {
    bucket: String,
    name: String,
    hash: Option<String>,
    comment: Option<String>,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
}

fn decode<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, SearchError> {
    serde_json::from_value(data)
        .map_err(|e| SearchError::Parse(format!("unexpected catalog graphql shape: {e}")))
}

/// Convert `searchObjects` data into results.
///
/// Extracted as a separate function for testability with canned JSON.
pub(crate) fn parse_objects(data: serde_json::Value, size: usize) -> Result<Hits, SearchError> {
    let set = match decode::<ObjectsData>(data)?.search_objects {
        ObjectsOutcome::ObjectsSearchResultSet(set) => set,
        ObjectsOutcome::InvalidInput(invalid) => return Err(invalid.into_error()),
    };
    let results: Vec<SearchResult> = set
        .hits
        .into_iter()
        .take(size)
        .map(|hit| {
            let uri = s3_uri(&hit.bucket, &hit.key);
            let title = hit.key.rsplit('/').next().unwrap_or(&hit.key).to_owned();
            let mut result = SearchResult::new(uri.clone(), ResultKind::File, title, BackendType::CatalogGraph)
                .with_description(format!("Object in s3://{}", hit.bucket))
                .with_location(uri)
                .with_logical_key(hit.key.clone())
                .with_metadata("bucket", serde_json::Value::from(hit.bucket))
                .with_score(1.0);
            if let Some(size) = hit.size {
                result = result.with_size(size);
            }
            if let Some(modified) = hit.modified {
                result = result.with_last_modified(modified);
            }
            result
        })
        .collect();
    let total = set.total.max(results.len());
    Ok((results, total))
}

/// Convert `searchPackages` data into results.
pub(crate) fn parse_packages(data: serde_json::Value, size: usize) -> Result<Hits, SearchError> {
    let set = match decode::<PackagesData>(data)?.search_packages {
        PackagesOutcome::PackagesSearchResultSet(set) => set,
        PackagesOutcome::InvalidInput(invalid) => return Err(invalid.into_error()),
    };
    let results: Vec<SearchResult> = set
        .hits
        .into_iter()
        .take(size)
        .map(|hit| {
            let location = format!("quilt+s3://{}#package={}", hit.bucket, hit.name);
            let description = hit
                .comment
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| format!("Package in s3://{}", hit.bucket));
            let mut result = SearchResult::new(location.clone(), ResultKind::Package, hit.name.clone(), BackendType::CatalogGraph)
                .with_description(description)
                .with_location(location)
                .with_package_name(hit.name)
                .with_metadata("bucket", serde_json::Value::from(hit.bucket))
                .with_score(1.0);
            if let Some(hash) = hit.hash {
                result = result.with_metadata("hash", serde_json::Value::from(hash));
            }
            if let Some(size) = hit.size {
                result = result.with_size(size);
            }
            if let Some(modified) = hit.modified {
                result = result.with_last_modified(modified);
            }
            result
        })
        .collect();
    let total = set.total.max(results.len());
    Ok((results, total))
}
