//! Core types: search results, scopes, backend identities, filters,
//! query analyses and per-backend responses.
//!
//! Everything here is plain data. Values are built once per call and never
//! shared across calls, so none of them need interior mutability.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// What a search result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// A single object in a bucket.
    File,
    /// A package (a named, versioned collection of objects).
    Package,
}

/// Breadth of a search request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Everything any backend can see.
    #[default]
    Global,
    /// Every bucket attached to the catalog.
    Catalog,
    /// A single package; the target names it.
    Package,
    /// A single bucket; the target names it (`s3://bucket` or `bucket`).
    Bucket,
}

impl Scope {
    /// Lowercase wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Catalog => "catalog",
            Self::Package => "package",
            Self::Bucket => "bucket",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "" => Ok(Self::Global),
            "catalog" => Ok(Self::Catalog),
            "package" => Ok(Self::Package),
            "bucket" => Ok(Self::Bucket),
            other => Err(SearchError::InvalidRequest(format!(
                "unknown scope '{other}' (expected global, catalog, package or bucket)"
            ))),
        }
    }
}

/// Coarse classification of what the caller is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Individual objects, usually with name or extension cues.
    File,
    /// Packages / datasets.
    Package,
    /// Metadata fields rather than names.
    Metadata,
    /// No strong cue either way.
    Global,
}

impl QueryType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Package => "package",
            Self::Metadata => "metadata",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The concrete backend variants a registry can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendType {
    /// Structured queries against the catalog's GraphQL API.
    #[serde(rename = "graphql")]
    CatalogGraph,
    /// Delegation to the catalog's authenticated search index.
    #[serde(rename = "elasticsearch")]
    ContentIndex,
    /// Direct bucket listing with heuristic scoring.
    #[serde(rename = "s3")]
    ObjectListing,
}

impl BackendType {
    /// Stable identifier used in envelopes and explicit backend lists.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CatalogGraph => "graphql",
            Self::ContentIndex => "elasticsearch",
            Self::ObjectListing => "s3",
        }
    }

    /// Resolve a caller-supplied backend name, case-insensitively.
    ///
    /// Accepts the stable identifiers plus a few descriptive aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "graphql" | "graph" | "catalog" => Some(Self::CatalogGraph),
            "elasticsearch" | "es" | "index" | "content" => Some(Self::ContentIndex),
            "s3" | "listing" | "bucket" => Some(Self::ObjectListing),
            _ => None,
        }
    }

    /// Returns all backend variants in canonical order.
    pub fn all() -> &'static [BackendType] {
        &[Self::CatalogGraph, Self::ContentIndex, Self::ObjectListing]
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Health / response status of a backend.
///
/// Responses only ever carry `Available`, `Unavailable` or `Error`;
/// `Uninitialized` exists for backends that have never been probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendStatus {
    /// Never probed.
    Uninitialized,
    /// Healthy and answering queries.
    Available,
    /// Reachable in principle but refusing us (not configured, not authenticated).
    Unavailable,
    /// The last probe or search failed.
    Error,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Available => "AVAILABLE",
            Self::Unavailable => "UNAVAILABLE",
            Self::Error => "ERROR",
        })
    }
}

/// Structured filters, detected from the query or supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Strict lower bound on object size, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_gt: Option<u64>,
    /// Strict upper bound on object size, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_lt: Option<u64>,
    /// Accepted file extensions, lowercase and without the leading dot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<String>,
    /// Only objects modified strictly after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Only objects modified strictly before this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchFilters {
    /// Returns `true` if no filter is set.
    pub fn is_empty(&self) -> bool {
        self.size_gt.is_none()
            && self.size_lt.is_none()
            && self.extension.is_empty()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    /// Number of filter keys that are set.
    pub fn len(&self) -> usize {
        [
            self.size_gt.is_some(),
            self.size_lt.is_some(),
            !self.extension.is_empty(),
            self.created_after.is_some(),
            self.created_before.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Add an extension, normalising `*.CSV` / `.csv` / `csv` to `csv`.
    pub fn with_extension(mut self, ext: &str) -> Self {
        let ext = normalize_extension(ext);
        if !ext.is_empty() && !self.extension.contains(&ext) {
            self.extension.push(ext);
        }
        self
    }

    /// Combine detected filters with caller overrides.
    ///
    /// Every key set in `overrides` replaces the corresponding key in `self`.
    pub fn merge(&self, overrides: &SearchFilters) -> SearchFilters {
        SearchFilters {
            size_gt: overrides.size_gt.or(self.size_gt),
            size_lt: overrides.size_lt.or(self.size_lt),
            extension: if overrides.extension.is_empty() {
                self.extension.clone()
            } else {
                overrides.extension.iter().map(|e| normalize_extension(e)).collect()
            },
            created_after: overrides.created_after.or(self.created_after),
            created_before: overrides.created_before.or(self.created_before),
        }
    }

    /// Whether an object with the given key, size and modification time passes.
    ///
    /// A missing size or timestamp passes the corresponding bound.
    pub fn accepts(&self, key: &str, size: Option<u64>, modified: Option<DateTime<Utc>>) -> bool {
        if let (Some(min), Some(size)) = (self.size_gt, size) {
            if size <= min {
                return false;
            }
        }
        if let (Some(max), Some(size)) = (self.size_lt, size) {
            if size >= max {
                return false;
            }
        }
        if !self.extension.is_empty() {
            let lower = key.to_lowercase();
            let matched = self
                .extension
                .iter()
                .any(|ext| lower.ends_with(&format!(".{ext}")));
            if !matched {
                return false;
            }
        }
        if let (Some(after), Some(modified)) = (self.created_after, modified) {
            if modified <= after {
                return false;
            }
        }
        if let (Some(before), Some(modified)) = (self.created_before, modified) {
            if modified >= before {
                return false;
            }
        }
        true
    }
}

/// Normalise an extension token to lowercase without `*.` or `.`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim()
        .trim_start_matches('*')
        .trim_start_matches('.')
        .to_lowercase()
}

/// A single search result produced by one backend.
///
/// Built with [`SearchResult::new`] and the `with_*` methods; never mutated
/// once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable identity within the originating backend.
    pub id: String,
    /// File or package.
    #[serde(rename = "type")]
    pub kind: ResultKind,
    /// Short display title (file name or package name).
    pub title: String,
    /// One-line description.
    pub description: String,
    /// URI into object storage, e.g. `s3://bucket/key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Package the result belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Path of the entry inside its package, or the package handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_key: Option<String>,
    /// Size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modification time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Backend-specific extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Relevance in `[0.0, 1.0]`.
    pub score: f64,
    /// Identifier of the backend that produced this result.
    pub backend: BackendType,
    /// Leading bytes of the object, when a preview was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

impl SearchResult {
    /// Start a result with the required fields and a score of 0.
    pub fn new(
        id: impl Into<String>,
        kind: ResultKind,
        title: impl Into<String>,
        backend: BackendType,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            description: String::new(),
            location: None,
            package_name: None,
            logical_key: None,
            size: None,
            last_modified: None,
            metadata: BTreeMap::new(),
            score: 0.0,
            backend,
            content_preview: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_package_name(mut self, name: impl Into<String>) -> Self {
        self.package_name = Some(name.into());
        self
    }

    pub fn with_logical_key(mut self, key: impl Into<String>) -> Self {
        self.logical_key = Some(key.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_last_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(modified);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the score, clamped into `[0.0, 1.0]`. NaN becomes 0.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = clamp_score(score);
        self
    }

    pub fn with_content_preview(mut self, preview: impl Into<String>) -> Self {
        self.content_preview = Some(preview.into());
        self
    }
}

/// Clamp a raw score into `[0.0, 1.0]`, mapping NaN to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// The analyzer's reading of a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    /// Grows with the number of recognised signals; never exceeds 1.0.
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub file_extensions: Vec<String>,
    pub filters: SearchFilters,
    pub suggested_backends: Vec<BackendType>,
}

/// The per-backend view of one search request.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendQuery {
    pub query: String,
    pub scope: Scope,
    pub target: String,
    pub filters: SearchFilters,
    pub limit: usize,
}

/// What one backend returned for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub backend_type: BackendType,
    pub status: BackendStatus,
    pub results: Vec<SearchResult>,
    /// Total hits the backend reported, which may exceed `results.len()`.
    pub total: usize,
    pub query_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BackendResponse {
    /// A successful response.
    pub fn available(
        backend_type: BackendType,
        results: Vec<SearchResult>,
        total: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            backend_type,
            status: BackendStatus::Available,
            total: total.max(results.len()),
            results,
            query_time_ms: millis(elapsed),
            error_message: None,
        }
    }

    /// A failed or short-circuited response with no results.
    pub fn failed(
        backend_type: BackendType,
        status: BackendStatus,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            backend_type,
            status,
            results: Vec::new(),
            total: 0,
            query_time_ms: millis(elapsed),
            error_message: Some(message.into()),
        }
    }

    /// Whether this response contributes results to aggregation.
    pub fn is_available(&self) -> bool {
        self.status == BackendStatus::Available
    }
}

/// Convert a duration into fractional milliseconds.
pub fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn search_result_builder_sets_fields() {
        let result = SearchResult::new("s3://b/k.csv", ResultKind::File, "k.csv", BackendType::ObjectListing)
            .with_location("s3://b/k.csv")
            .with_size(42)
            .with_score(0.7);
        assert_eq!(result.location.as_deref(), Some("s3://b/k.csv"));
        assert_eq!(result.size, Some(42));
        assert!((result.score - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn scores_are_clamped() {
        let high = SearchResult::new("a", ResultKind::File, "a", BackendType::ContentIndex).with_score(3.5);
        let low = SearchResult::new("b", ResultKind::File, "b", BackendType::ContentIndex).with_score(-1.0);
        let nan = SearchResult::new("c", ResultKind::File, "c", BackendType::ContentIndex).with_score(f64::NAN);
        assert!((high.score - 1.0).abs() < f64::EPSILON);
        assert!(low.score.abs() < f64::EPSILON);
        assert!(nan.score.abs() < f64::EPSILON);
    }

    #[test]
    fn search_result_serializes_kind_as_type() {
        let result = SearchResult::new("p", ResultKind::Package, "user/pkg", BackendType::CatalogGraph);
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["type"], "package");
        assert_eq!(json["backend"], "graphql");
        assert!(json.get("location").is_none());
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("BUCKET".parse::<Scope>().expect("parse"), Scope::Bucket);
        assert_eq!(" catalog ".parse::<Scope>().expect("parse"), Scope::Catalog);
        assert_eq!("".parse::<Scope>().expect("parse"), Scope::Global);
        assert!("planet".parse::<Scope>().is_err());
    }

    #[test]
    fn backend_type_names_and_aliases() {
        assert_eq!(BackendType::from_name("GraphQL"), Some(BackendType::CatalogGraph));
        assert_eq!(BackendType::from_name("ES"), Some(BackendType::ContentIndex));
        assert_eq!(BackendType::from_name("S3"), Some(BackendType::ObjectListing));
        assert_eq!(BackendType::from_name("athena"), None);
        assert_eq!(BackendType::ContentIndex.to_string(), "elasticsearch");
        assert_eq!(BackendType::all().len(), 3);
    }

    #[test]
    fn backend_status_serializes_upper_case() {
        let json = serde_json::to_string(&BackendStatus::Available).expect("serialize");
        assert_eq!(json, "\"AVAILABLE\"");
        assert_eq!(BackendStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn filters_merge_prefers_overrides() {
        let detected = SearchFilters {
            size_gt: Some(10),
            extension: vec!["csv".into()],
            ..Default::default()
        };
        let overrides = SearchFilters {
            size_gt: Some(100),
            extension: vec![".Parquet".into()],
            ..Default::default()
        };
        let merged = detected.merge(&overrides);
        assert_eq!(merged.size_gt, Some(100));
        assert_eq!(merged.extension, vec!["parquet".to_string()]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn filters_merge_keeps_detected_when_no_override() {
        let detected = SearchFilters::default().with_extension("*.CSV");
        let merged = detected.merge(&SearchFilters::default());
        assert_eq!(merged.extension, vec!["csv".to_string()]);
    }

    #[test]
    fn filters_accept_checks_bounds_strictly() {
        let filters = SearchFilters {
            size_gt: Some(100),
            size_lt: Some(1000),
            ..Default::default()
        }
        .with_extension("csv");
        assert!(filters.accepts("data/a.CSV", Some(500), None));
        assert!(!filters.accepts("data/a.csv", Some(100), None));
        assert!(!filters.accepts("data/a.csv", Some(1000), None));
        assert!(!filters.accepts("data/a.json", Some(500), None));
        assert!(filters.accepts("data/a.csv", None, None));
    }

    #[test]
    fn filters_accept_checks_dates() {
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("date");
        let filters = SearchFilters {
            created_after: Some(after),
            ..Default::default()
        };
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().expect("date");
        let older = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single().expect("date");
        assert!(filters.accepts("k", None, Some(newer)));
        assert!(!filters.accepts("k", None, Some(older)));
    }

    #[test]
    fn filters_serialize_with_wire_keys() {
        let filters = SearchFilters {
            size_lt: Some(5),
            ..Default::default()
        }
        .with_extension("csv");
        let json = serde_json::to_value(&filters).expect("serialize");
        assert_eq!(json["size_lt"], 5);
        assert_eq!(json["extension"][0], "csv");
        assert!(json.get("size_gt").is_none());
    }

    #[test]
    fn available_response_total_never_below_result_count() {
        let results = vec![SearchResult::new("a", ResultKind::File, "a", BackendType::ObjectListing)];
        let response = BackendResponse::available(BackendType::ObjectListing, results, 0, Duration::from_millis(5));
        assert_eq!(response.total, 1);
        assert!(response.is_available());
        assert!((response.query_time_ms - 5.0).abs() < 1e-9);
    }

    #[test]
    fn failed_response_has_no_results() {
        let response = BackendResponse::failed(
            BackendType::CatalogGraph,
            BackendStatus::Error,
            "boom",
            Duration::ZERO,
        );
        assert!(response.results.is_empty());
        assert!(!response.is_available());
        assert_eq!(response.error_message.as_deref(), Some("boom"));
    }
}
