//! # unisearch
//!
//! One search request, answered by several storage backends at once.
//!
//! A free-text query is analysed for intent and filter phrases, fanned out
//! concurrently to a data catalog (GraphQL), a full-text search index and a
//! plain object-store listing, and fused into a single ranked, deduplicated
//! result set with a per-backend status report.
//!
//! ## Design
//!
//! - Backends implement [`SearchBackend`] and live in a [`BackendRegistry`]
//! - Each backend tracks its own health; unavailable backends are skipped
//!   and re-probed once their record goes stale
//! - A failing, slow or panicking backend only affects its own status entry
//! - Scores are normalised to `[0, 1]`; ties keep dispatch order
//! - Optional in-memory response cache with configurable TTL
//!
//! ## Security
//!
//! - No network listeners; this is a library, not a server
//! - Search queries are logged only at trace level
//! - Content previews are sanitised before returning
//!
//! # Examples
//!
//! ```
//! use unisearch::{QueryAnalyzer, QueryType, Scope};
//!
//! let analysis = QueryAnalyzer::default().parse("csv files larger than 100MB", Scope::Global, "");
//! assert_eq!(analysis.query_type, QueryType::File);
//! assert!(analysis.filters.size_gt.is_some());
//! ```

pub mod analyzer;
pub mod backend;
pub mod backends;
pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod location;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod storage;
pub mod types;

pub use analyzer::QueryAnalyzer;
pub use backend::SearchBackend;
pub use backends::{CatalogGraphBackend, ContentIndexBackend, ObjectListingBackend};
pub use config::SearchConfig;
pub use envelope::{
    BackendSelection, BackendStatusReport, SearchEnvelope, SearchExplanation, SearchRequest,
    SelectionMode,
};
pub use error::{Result, SearchError};
pub use health::{BackendHealth, HealthSnapshot};
pub use orchestrator::Orchestrator;
pub use registry::BackendRegistry;
pub use session::{HttpIndexSession, HttpReply, IndexSession};
pub use storage::{ListPage, ListRequest, MemoryObjectStore, ObjectEntry, ObjectStore};
pub use types::{
    BackendQuery, BackendResponse, BackendStatus, BackendType, QueryAnalysis, QueryType,
    ResultKind, Scope, SearchFilters, SearchResult,
};
