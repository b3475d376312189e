//! Request and response shapes of the one exposed call.
//!
//! [`SearchRequest`] carries everything a caller can ask for;
//! [`SearchEnvelope`] is what comes back, whether the search worked,
//! partially worked, or failed outright. Both are `serde` types so protocol
//! adapters can pass them through unchanged.

use serde::{Deserialize, Serialize};

use crate::types::{
    BackendResponse, BackendStatus, BackendType, QueryAnalysis, Scope, SearchFilters, SearchResult,
};

/// Which backends a request should use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum BackendSelection {
    /// Let the analyzer pick.
    #[default]
    Auto,
    /// Use these backends, by identifier or alias. Unknown names are skipped.
    Named(Vec<String>),
}

impl BackendSelection {
    /// Build from caller-supplied names. An empty list or `["auto"]` means
    /// [`BackendSelection::Auto`].
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        match names.as_slice() {
            [] => Self::Auto,
            [only] if only.trim().eq_ignore_ascii_case("auto") => Self::Auto,
            _ => Self::Named(names),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl From<Vec<String>> for BackendSelection {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<BackendSelection> for Vec<String> {
    fn from(selection: BackendSelection) -> Self {
        match selection {
            BackendSelection::Auto => vec!["auto".to_owned()],
            BackendSelection::Named(names) => names,
        }
    }
}

/// Parameters of one search.
///
/// # Examples
///
/// ```
/// use unisearch::{Scope, SearchRequest};
///
/// let request = SearchRequest::new("report.csv")
///     .with_scope(Scope::Bucket)
///     .with_target("s3://demo-bucket")
///     .with_limit(5)
///     .with_explanation(true);
/// assert_eq!(request.limit, Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub scope: Scope,
    /// Bucket (`s3://bucket[/prefix]`) or package the scope refers to.
    pub target: String,
    pub backends: BackendSelection,
    /// Maximum results; the configured default when `None`.
    pub limit: Option<usize>,
    /// Attach the [`QueryAnalysis`] to the envelope.
    pub include_metadata: bool,
    /// Attach the first bytes of matched files to their results.
    pub include_content_preview: bool,
    /// Attach a [`SearchExplanation`] to the envelope.
    pub explain_query: bool,
    /// Explicit filters; each key overrides the one detected in the query.
    pub filters: SearchFilters,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_backends(mut self, backends: BackendSelection) -> Self {
        self.backends = backends;
        self
    }

    /// Shorthand for [`BackendSelection::from_names`].
    pub fn with_backend_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_backends(BackendSelection::from_names(names))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_content_preview(mut self, include: bool) -> Self {
        self.include_content_preview = include;
        self
    }

    pub fn with_explanation(mut self, explain: bool) -> Self {
        self.explain_query = explain;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Outcome of one dispatched backend, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatusReport {
    pub backend: BackendType,
    pub status: BackendStatus,
    /// Results the backend returned.
    pub result_count: usize,
    /// Total hits the backend reported.
    pub total: usize,
    pub query_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BackendResponse> for BackendStatusReport {
    fn from(response: &BackendResponse) -> Self {
        Self {
            backend: response.backend_type,
            status: response.status,
            result_count: response.results.len(),
            total: response.total,
            query_time_ms: response.query_time_ms,
            error: response.error_message.clone(),
        }
    }
}

/// How backends were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Suggested backends that are available.
    Suggested,
    /// No suggested backend was available; every available one was used.
    AllAvailable,
    /// Nothing was available; every registered backend was asked anyway.
    AllRegistered,
    /// The caller named the backends.
    Explicit,
}

/// Per-backend contribution to the final result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendContribution {
    pub backend: BackendType,
    /// Total hits the backend reported.
    pub raw: usize,
    /// Results it actually returned after its own filtering and truncation.
    pub filtered: usize,
    /// Results that made it into the envelope.
    pub kept: usize,
}

/// Why the envelope looks the way it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchExplanation {
    pub selection_mode: SelectionMode,
    pub rationale: String,
    pub suggested_backends: Vec<BackendType>,
    pub available_backends: Vec<BackendType>,
    pub selected_backends: Vec<BackendType>,
    /// Explicit names that matched no registered backend.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub skipped_names: Vec<String>,
    pub contributions: Vec<BackendContribution>,
    /// Results left after deduplication, before truncation.
    pub unique_results: usize,
    /// Results dropped as duplicates of a higher-scored entry.
    pub duplicates_removed: usize,
}

/// The response to one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub success: bool,
    pub query: String,
    pub scope: Scope,
    pub target: String,
    pub results: Vec<SearchResult>,
    /// Number of results in this envelope.
    pub total_results: usize,
    pub query_time_ms: f64,
    /// Backends that answered with [`BackendStatus::Available`].
    pub backends_used: Vec<BackendType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QueryAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<SearchExplanation>,
    /// One entry per dispatched backend, in dispatch order.
    pub backend_status: Vec<BackendStatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchEnvelope {
    /// A `success = false` envelope echoing the request.
    pub fn failure(request: &SearchRequest, error: impl Into<String>, query_time_ms: f64) -> Self {
        Self {
            success: false,
            query: request.query.clone(),
            scope: request.scope,
            target: request.target.clone(),
            results: Vec::new(),
            total_results: 0,
            query_time_ms,
            backends_used: Vec::new(),
            analysis: None,
            explanation: None,
            backend_status: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Status report for one backend, if it was dispatched.
    pub fn status_of(&self, backend: BackendType) -> Option<&BackendStatusReport> {
        self.backend_status.iter().find(|r| r.backend == backend)
    }
}
